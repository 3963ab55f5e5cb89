use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::flats;
use super::ListQuery;
use crate::db;
use crate::models::{AssignFlatRequest, User};
use crate::services::token;
use crate::state::AppState;
use crate::validation;

const USER_PATCH_ALLOWED: [&str; 7] = [
    "email",
    "first_name",
    "last_name",
    "age",
    "birth_date",
    "address",
    "password",
];

pub fn user_from_row(row: &SqliteRow) -> User {
    let flat_ids: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("flat_ids")).unwrap_or_default();
    User {
        id: row.get("id"),
        email: row.get("email"),
        password: row.get("password"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        age: row.get("age"),
        birth_date: row.get("birth_date"),
        address: row.get("address"),
        flat_ids,
        created_at: row.get("created_at"),
    }
}

async fn fetch_user(pool: &sqlx::SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| user_from_row(&r)))
}

pub async fn list_users(
    req: HttpRequest,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let pool = &state.pool;

    let rows = if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        sqlx::query(
            "SELECT * FROM users WHERE email LIKE ? OR first_name LIKE ? OR last_name LIKE ? ORDER BY created_at LIMIT ? OFFSET ?"
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await
    } else {
        sqlx::query("SELECT * FROM users ORDER BY created_at LIMIT ? OFFSET ?")
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(pool)
            .await
    };

    match rows {
        Ok(rows) => {
            let users: Vec<User> = rows.iter().map(user_from_row).collect();
            HttpResponse::Ok().json(json!({
                "users": users,
                "page": query.page(),
                "limit": query.limit()
            }))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn get_user(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let pool = &state.pool;

    let user = match fetch_user(pool, &id).await {
        Ok(Some(user)) => user,
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "User not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    // populate owned flats from the denormalized id list
    let mut owned_flats = Vec::new();
    for flat_id in &user.flat_ids {
        match flats::load_flat(pool, flat_id).await {
            Ok(Some(flat)) => owned_flats.push(flat),
            Ok(None) => {}
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        }
    }

    let mut body = match serde_json::to_value(&user) {
        Ok(Value::Object(map)) => map,
        _ => {
            return HttpResponse::InternalServerError().json(json!({
                "error": "Failed to serialize user"
            }))
        }
    };
    body.insert("flats".to_string(), json!(owned_flats));
    HttpResponse::Ok().json(Value::Object(body))
}

pub async fn update_user(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<Value>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let pool = &state.pool;
    let body = data.into_inner();

    let obj = match body.as_object() {
        Some(o) => o,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "error": "Request body must be a JSON object"
            }))
        }
    };
    let filtered = validation::filter_allowed(obj, &USER_PATCH_ALLOWED);

    let mut user = match fetch_user(pool, &id).await {
        Ok(Some(user)) => user,
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "User not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    if let Some(v) = filtered.get("email").and_then(|v| v.as_str()) {
        user.email = validation::normalize_email(v);
    }
    if let Some(v) = filtered.get("first_name").and_then(|v| v.as_str()) {
        user.first_name = v.trim().to_string();
    }
    if let Some(v) = filtered.get("last_name").and_then(|v| v.as_str()) {
        user.last_name = v.trim().to_string();
    }
    if let Some(v) = filtered.get("address").and_then(|v| v.as_str()) {
        user.address = v.trim().to_string();
    }
    if let Some(v) = filtered.get("birth_date").and_then(|v| v.as_str()) {
        user.birth_date = v.to_string();
    }
    if let Some(v) = filtered.get("age") {
        match validation::coerce_age(Some(v)) {
            Some(age) if (0.0..=150.0).contains(&age) => user.age = age.floor() as i64,
            _ => {
                return HttpResponse::BadRequest().json(json!({
                    "error": "Age must be a number between 0 and 150"
                }))
            }
        }
    }
    // re-hash only when a new password is actually present
    if let Some(v) = filtered.get("password").and_then(|v| v.as_str()) {
        if v.len() < 6 {
            return HttpResponse::BadRequest().json(json!({
                "error": "Password must be at least 6 characters"
            }));
        }
        user.password = match bcrypt::hash(v, bcrypt::DEFAULT_COST) {
            Ok(hash) => hash,
            Err(_) => {
                return HttpResponse::InternalServerError().json(json!({
                    "error": "Password hashing failed"
                }))
            }
        };
    }

    if let Err(e) = sqlx::query(
        "UPDATE users SET email = ?, password = ?, first_name = ?, last_name = ?, age = ?, birth_date = ?, address = ? WHERE id = ?"
    )
    .bind(&user.email)
    .bind(&user.password)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.age)
    .bind(&user.birth_date)
    .bind(&user.address)
    .bind(&id)
    .execute(pool)
    .await
    {
        if db::is_unique_violation(&e) {
            return HttpResponse::Conflict().json(json!({
                "error": "A user with this email already exists"
            }));
        }
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Ok().json(user)
}

pub async fn delete_user(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let pool = &state.pool;

    // join rows first, the users row still holds the FK target
    if let Err(e) = sqlx::query("DELETE FROM user_flats WHERE user_id = ?")
        .bind(&id)
        .execute(pool)
        .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(pool)
        .await;
    match result {
        Ok(r) if r.rows_affected() == 0 => {
            HttpResponse::NotFound().json(json!({ "error": "User not found" }))
        }
        Ok(_) => HttpResponse::Ok().json(json!({ "deleted": true })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn assign_flat(
    req: HttpRequest,
    data: web::Json<AssignFlatRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let assign = data.into_inner();
    let pool = &state.pool;

    let mut user = match fetch_user(pool, &assign.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "User not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    let flat_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM flats WHERE id = ?")
        .bind(&assign.flat_id)
        .fetch_one(pool)
        .await;
    match flat_exists {
        Ok(count) if count > 0 => {}
        Ok(_) => return HttpResponse::NotFound().json(json!({ "error": "Flat not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }

    if user.flat_ids.contains(&assign.flat_id) {
        return HttpResponse::BadRequest().json(json!({
            "error": "Flat is already assigned to this user"
        }));
    }

    // Two independent writes, no transaction: the join row goes first so
    // its UNIQUE(user_id, flat_id) constraint doubles as the duplicate
    // guard under concurrent requests.
    let join_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    if let Err(e) = sqlx::query(
        "INSERT INTO user_flats (id, user_id, flat_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&join_id)
    .bind(&assign.user_id)
    .bind(&assign.flat_id)
    .bind(&created_at)
    .execute(pool)
    .await
    {
        if db::is_unique_violation(&e) {
            return HttpResponse::BadRequest().json(json!({
                "error": "Flat is already assigned to this user"
            }));
        }
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    user.flat_ids.push(assign.flat_id.clone());
    let flat_ids_json = serde_json::to_string(&user.flat_ids).unwrap_or_else(|_| "[]".to_string());
    if let Err(e) = sqlx::query("UPDATE users SET flat_ids = ? WHERE id = ?")
        .bind(&flat_ids_json)
        .bind(&assign.user_id)
        .execute(pool)
        .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Ok().json(json!({
        "user_id": assign.user_id,
        "flat_id": assign.flat_id,
        "flat_ids": user.flat_ids
    }))
}
