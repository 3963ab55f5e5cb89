use actix_web::{web, HttpResponse};
use bcrypt;
use serde_json::{json, Value};
use sqlx::Row;
use uuid::Uuid;

use crate::db;
use crate::models::{LoginRequest, RefreshRequest};
use crate::services::token;
use crate::state::AppState;
use crate::validation;

pub async fn register(data: web::Json<Value>, state: web::Data<AppState>) -> HttpResponse {
    let body = data.into_inner();
    let pool = &state.pool;

    let errors = validation::validate_credentials(&body);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "errors": errors }));
    }
    let obj = match body.as_object() {
        Some(o) => o,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "error": "Request body must be a JSON object"
            }))
        }
    };

    let email = validation::normalize_email(obj.get("email").and_then(|v| v.as_str()).unwrap_or(""));
    let age_raw = validation::coerce_age(obj.get("age")).unwrap_or(0.0);
    let age = age_raw.floor() as i64;
    let first_name = obj
        .get("first_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let last_name = obj
        .get("last_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let address = obj
        .get("address")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let password = obj.get("password").and_then(|v| v.as_str()).unwrap_or("");
    let birth_date = obj
        .get("birth_date")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| validation::synthesize_birth_date(age_raw));

    let hashed_password = match bcrypt::hash(password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError().json(json!({
                "error": "Password hashing failed"
            }))
        }
    };

    let user_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    if let Err(e) = sqlx::query(
        "INSERT INTO users (id, email, password, first_name, last_name, age, birth_date, address, flat_ids, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', ?)"
    )
    .bind(&user_id)
    .bind(&email)
    .bind(&hashed_password)
    .bind(&first_name)
    .bind(&last_name)
    .bind(age)
    .bind(&birth_date)
    .bind(&address)
    .bind(&created_at)
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

    let tokens = match token::issue_pair(&state.config, &user_id, &email) {
        Ok(pair) => pair,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    HttpResponse::Created().json(json!({
        "user": {
            "id": user_id,
            "email": email,
            "first_name": first_name,
            "last_name": last_name,
            "age": age,
            "birth_date": birth_date,
            "address": address,
            "flat_ids": [],
            "created_at": created_at
        },
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token
    }))
}

pub async fn login(data: web::Json<LoginRequest>, state: web::Data<AppState>) -> HttpResponse {
    let auth_req = data.into_inner();
    let pool = &state.pool;
    let email = validation::normalize_email(&auth_req.email);

    let row = sqlx::query("SELECT id, email, password FROM users WHERE email = ? LIMIT 1")
        .bind(&email)
        .fetch_optional(pool)
        .await;

    let row = match row {
        Ok(Some(r)) => r,
        _ => {
            return HttpResponse::Unauthorized().json(json!({
                "error": "Invalid credentials"
            }));
        }
    };

    let user_id = row.get::<String, _>("id");
    let stored_hash = row.get::<String, _>("password");

    let is_valid = match bcrypt::verify(&auth_req.password, &stored_hash) {
        Ok(valid) => valid,
        Err(_) => false,
    };
    if !is_valid {
        return HttpResponse::Unauthorized().json(json!({
            "error": "Invalid credentials"
        }));
    }

    let tokens = match token::issue_pair(&state.config, &user_id, &email) {
        Ok(pair) => pair,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    HttpResponse::Ok().json(json!({
        "user": { "id": user_id, "email": email },
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token
    }))
}

pub async fn refresh(data: web::Json<RefreshRequest>, state: web::Data<AppState>) -> HttpResponse {
    let claims = match token::verify_refresh(&state.config, &data.refresh_token) {
        Ok(claims) => claims,
        Err(_) => {
            return HttpResponse::Unauthorized().json(json!({
                "error": "Invalid or expired refresh token"
            }));
        }
    };

    let tokens = match token::issue_pair(&state.config, &claims.sub, &claims.email) {
        Ok(pair) => pair,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    HttpResponse::Ok().json(json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token
    }))
}
