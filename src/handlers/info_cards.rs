use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db;
use crate::models::{InfoCard, InfoCardDetail, InfoCardDetailInput, InfoCardInput};
use crate::services::token;
use crate::state::AppState;
use crate::validation;

const INFO_CARD_PATCH_ALLOWED: [&str; 3] = ["active", "image", "category_ids"];

fn detail_from_row(row: &SqliteRow) -> InfoCardDetail {
    InfoCardDetail {
        language_id: row.get("language_id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        active: row.get::<i64, _>("active") != 0,
    }
}

async fn load_details(
    pool: &SqlitePool,
    card_ref: &str,
) -> Result<Vec<InfoCardDetail>, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM info_card_details WHERE card_ref = ? ORDER BY language_id")
        .bind(card_ref)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(detail_from_row).collect())
}

async fn card_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<InfoCard, sqlx::Error> {
    let id: String = row.get("id");
    let category_ids: Vec<i64> =
        serde_json::from_str(&row.get::<String, _>("category_ids")).unwrap_or_default();
    let details = load_details(pool, &id).await?;
    Ok(InfoCard {
        id,
        info_card_id: row.get("info_card_id"),
        active: row.get::<i64, _>("active") != 0,
        image: row.get("image"),
        category_ids,
        details,
        created_at: row.get("created_at"),
    })
}

async fn insert_details(
    pool: &SqlitePool,
    card_ref: &str,
    details: &[InfoCardDetailInput],
) -> Result<(), sqlx::Error> {
    for entry in details {
        let language_id = entry
            .language_id
            .as_ref()
            .and_then(validation::coerce_language_id)
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO info_card_details (id, card_ref, language_id, title, subtitle, active) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(Uuid::new_v4().to_string())
        .bind(card_ref)
        .bind(language_id)
        .bind(entry.title.as_deref().unwrap_or("").trim())
        .bind(entry.subtitle.as_deref().map(|s| s.trim().to_string()))
        .bind(entry.active.unwrap_or(true) as i64)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn create_info_card(
    req: HttpRequest,
    data: web::Json<InfoCardInput>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let input = data.into_inner();
    let pool = &state.pool;

    let info_card_id = match input.info_card_id {
        Some(id) => id,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "error": "info_card_id is required"
            }))
        }
    };
    let details = input.details.unwrap_or_default();
    let errors = validation::validate_details(&details);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "errors": errors }));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    let category_ids = input.category_ids.unwrap_or_default();
    let category_ids_json =
        serde_json::to_string(&category_ids).unwrap_or_else(|_| "[]".to_string());

    if let Err(e) = sqlx::query(
        "INSERT INTO info_cards (id, info_card_id, active, image, category_ids, created_at) VALUES (?, ?, ?, ?, ?, ?)"
    )
    .bind(&id)
    .bind(info_card_id)
    .bind(input.active.unwrap_or(true) as i64)
    .bind(&input.image)
    .bind(&category_ids_json)
    .bind(&created_at)
    .execute(pool)
    .await
    {
        if db::is_unique_violation(&e) {
            return HttpResponse::Conflict().json(json!({
                "error": "An info card with this id already exists"
            }));
        }
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }
    if let Err(e) = insert_details(pool, &id, &details).await {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    let row = sqlx::query("SELECT * FROM info_cards WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await;
    match row {
        Ok(row) => match card_from_row(pool, &row).await {
            Ok(card) => HttpResponse::Created().json(card),
            Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
        },
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn update_info_card(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<Value>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let body = data.into_inner();
    let pool = &state.pool;

    let obj = match body.as_object() {
        Some(o) => o,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "error": "Request body must be a JSON object"
            }))
        }
    };

    let row = sqlx::query("SELECT * FROM info_cards WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await;
    let mut card = match row {
        Ok(Some(row)) => match card_from_row(pool, &row).await {
            Ok(card) => card,
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        },
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({ "error": "Info card not found" }))
        }
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    let filtered = validation::filter_allowed(obj, &INFO_CARD_PATCH_ALLOWED);
    if let Some(active) = filtered.get("active").and_then(|v| v.as_bool()) {
        card.active = active;
    }
    if let Some(image) = filtered.get("image") {
        card.image = image.as_str().map(|s| s.to_string());
    }
    if let Some(category_ids) = filtered.get("category_ids") {
        match serde_json::from_value::<Vec<i64>>(category_ids.clone()) {
            Ok(ids) => card.category_ids = ids,
            Err(_) => {
                return HttpResponse::BadRequest().json(json!({
                    "error": "category_ids must be a list of numbers"
                }))
            }
        }
    }

    // details bypass the allow-list: they live in their own table and get
    // validated and replaced as a set
    if let Some(raw_details) = obj.get("details") {
        let details: Vec<InfoCardDetailInput> =
            match serde_json::from_value(raw_details.clone()) {
                Ok(details) => details,
                Err(_) => {
                    return HttpResponse::BadRequest().json(json!({
                        "error": "details must be a list of detail records"
                    }))
                }
            };
        let errors = validation::validate_details(&details);
        if !errors.is_empty() {
            return HttpResponse::BadRequest().json(json!({ "errors": errors }));
        }
        if let Err(e) = sqlx::query("DELETE FROM info_card_details WHERE card_ref = ?")
            .bind(&id)
            .execute(pool)
            .await
        {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
        }
        if let Err(e) = insert_details(pool, &id, &details).await {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
        }
        card.details = match load_details(pool, &id).await {
            Ok(details) => details,
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        };
    }

    let category_ids_json =
        serde_json::to_string(&card.category_ids).unwrap_or_else(|_| "[]".to_string());
    if let Err(e) =
        sqlx::query("UPDATE info_cards SET active = ?, image = ?, category_ids = ? WHERE id = ?")
            .bind(card.active as i64)
            .bind(&card.image)
            .bind(&category_ids_json)
            .bind(&id)
            .execute(pool)
            .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Ok().json(card)
}
