use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::ListQuery;
use crate::models::{Product, ProductInput};
use crate::services::token;
use crate::state::AppState;

fn product_from_row(row: &SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        price: row.get("price"),
        created_at: row.get("created_at"),
    }
}

pub async fn list_products(
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let pool = &state.pool;

    let rows = if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        sqlx::query("SELECT * FROM products WHERE name LIKE ? ORDER BY created_at LIMIT ? OFFSET ?")
            .bind(&pattern)
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(pool)
            .await
    } else {
        sqlx::query("SELECT * FROM products ORDER BY created_at LIMIT ? OFFSET ?")
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(pool)
            .await
    };

    match rows {
        Ok(rows) => {
            let products: Vec<Product> = rows.iter().map(product_from_row).collect();
            HttpResponse::Ok().json(json!({
                "products": products,
                "page": query.page(),
                "limit": query.limit()
            }))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn get_product(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let id = path.into_inner();
    let row = sqlx::query("SELECT * FROM products WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.pool)
        .await;
    match row {
        Ok(Some(row)) => HttpResponse::Ok().json(product_from_row(&row)),
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": "Product not found" })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn create_product(
    req: HttpRequest,
    data: web::Json<ProductInput>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let input = data.into_inner();

    let price = match input.price {
        Some(price) => price,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "error": "Price is required"
            }))
        }
    };

    let product = Product {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        price,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    if let Err(e) =
        sqlx::query("INSERT INTO products (id, name, price, created_at) VALUES (?, ?, ?, ?)")
            .bind(&product.id)
            .bind(&product.name)
            .bind(product.price)
            .bind(&product.created_at)
            .execute(&state.pool)
            .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Created().json(product)
}

pub async fn update_product(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<ProductInput>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let input = data.into_inner();
    let pool = &state.pool;

    let row = sqlx::query("SELECT * FROM products WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await;
    let mut product = match row {
        Ok(Some(row)) => product_from_row(&row),
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "Product not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    if let Some(name) = input.name {
        product.name = Some(name);
    }
    if let Some(price) = input.price {
        product.price = price;
    }

    if let Err(e) = sqlx::query("UPDATE products SET name = ?, price = ? WHERE id = ?")
        .bind(&product.name)
        .bind(product.price)
        .bind(&id)
        .execute(pool)
        .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Ok().json(product)
}

pub async fn delete_product(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await;
    match result {
        Ok(r) if r.rows_affected() == 0 => {
            HttpResponse::NotFound().json(json!({ "error": "Product not found" }))
        }
        Ok(_) => HttpResponse::Ok().json(json!({ "deleted": true })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}
