use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::future::try_join_all;
use futures_util::TryStreamExt;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::ListQuery;
use crate::models::{Flat, FlatImage, DEFAULT_CURRENCY};
use crate::services::{storage, token};
use crate::state::AppState;
use crate::validation;

struct UploadedFile {
    data: Vec<u8>,
    filename: String,
    content_type: String,
}

fn image_from_row(row: &SqliteRow) -> FlatImage {
    FlatImage {
        id: row.get("id"),
        url: row.get("url"),
        filename: row.get("filename"),
        size: row.get("size"),
        content_type: row.get("content_type"),
        backend: row.get("backend"),
        provider_id: row.get("provider_id"),
        delete_url: row.get("delete_url"),
        created_at: row.get("created_at"),
    }
}

async fn load_images(pool: &SqlitePool, flat_id: &str) -> Result<Vec<FlatImage>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM flat_images WHERE flat_id = ? ORDER BY created_at, id",
    )
    .bind(flat_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(image_from_row).collect())
}

async fn flat_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Flat, sqlx::Error> {
    let id: String = row.get("id");
    let mut street: Option<String> = row.get("street");

    // backfill rows that still carry the legacy free-text location
    if street.as_deref().map_or(true, |s| s.trim().is_empty()) {
        let location: Option<String> = row.try_get("location").unwrap_or(None);
        if let Some(loc) = location.as_deref().filter(|l| !l.trim().is_empty()) {
            let trimmed = loc.trim().to_string();
            sqlx::query("UPDATE flats SET street = ?, location = NULL WHERE id = ?")
                .bind(&trimmed)
                .bind(&id)
                .execute(pool)
                .await?;
            street = Some(trimmed);
        }
    }

    let images = load_images(pool, &id).await?;
    Ok(Flat {
        id,
        square: row.get("square"),
        price: row.get("price"),
        currency: row.get("currency"),
        street,
        city: row.get("city"),
        state: row.get("state"),
        zip: row.get("zip"),
        images,
        created_at: row.get("created_at"),
    })
}

pub async fn load_flat(pool: &SqlitePool, id: &str) -> Result<Option<Flat>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM flats WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(Some(flat_from_row(pool, &row).await?)),
        None => Ok(None),
    }
}

/// Splits a multipart request into its text fields (as an attribute bag)
/// and its file parts, capping each file at `max_bytes`.
async fn parse_multipart(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<(Map<String, Value>, Vec<UploadedFile>), HttpResponse> {
    let mut fields = Map::new();
    let mut files = Vec::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        let name = field.name().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(|f| f.to_string());
        let content_type = field
            .content_type()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = Vec::new();
        while let Ok(Some(chunk)) = field.try_next().await {
            data.extend_from_slice(&chunk);
            if data.len() > max_bytes {
                return Err(HttpResponse::BadRequest().json(json!({
                    "error": "Image exceeds the maximum upload size"
                })));
            }
        }

        match filename {
            Some(filename) => {
                if !data.is_empty() {
                    files.push(UploadedFile {
                        data,
                        filename,
                        content_type,
                    });
                }
            }
            None => {
                if let Ok(text) = String::from_utf8(data) {
                    fields.insert(name, Value::String(text));
                }
            }
        }
    }

    Ok((fields, files))
}

pub async fn list_flats(query: web::Query<ListQuery>, state: web::Data<AppState>) -> HttpResponse {
    let pool = &state.pool;

    let rows = if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        sqlx::query(
            "SELECT * FROM flats WHERE street LIKE ? OR city LIKE ? ORDER BY created_at LIMIT ? OFFSET ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await
    } else {
        sqlx::query("SELECT * FROM flats ORDER BY created_at LIMIT ? OFFSET ?")
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(pool)
            .await
    };

    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    let mut flats = Vec::with_capacity(rows.len());
    for row in &rows {
        match flat_from_row(pool, row).await {
            Ok(flat) => flats.push(flat),
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        }
    }

    HttpResponse::Ok().json(json!({
        "flats": flats,
        "page": query.page(),
        "limit": query.limit()
    }))
}

pub async fn get_flat(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let id = path.into_inner();
    match load_flat(&state.pool, &id).await {
        Ok(Some(flat)) => HttpResponse::Ok().json(flat),
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": "Flat not found" })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn create_flat(
    req: HttpRequest,
    mut payload: Multipart,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let pool = &state.pool;

    let (fields, files) = match parse_multipart(&mut payload, state.config.max_upload_bytes).await {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };

    let mut errors = Vec::new();
    let square = fields
        .get("square")
        .and_then(validation::coerce_number);
    if square.is_none() {
        errors.push("Square is required and must be a number".to_string());
    }
    let price = fields.get("price").and_then(validation::coerce_number);
    if price.is_none() {
        errors.push("Price is required and must be a number".to_string());
    }
    let currency = match validation::normalize_currency(
        fields.get("currency").and_then(|v| v.as_str()),
    ) {
        Ok(c) => c.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        Err(msg) => {
            errors.push(msg);
            DEFAULT_CURRENCY.to_string()
        }
    };
    let address = validation::normalize_address(&Value::Object(fields.clone()));
    let street_ok = address
        .as_ref()
        .and_then(|a| a.street.as_deref())
        .map_or(false, |s| !s.is_empty());
    if !street_ok {
        errors.push("A street address is required".to_string());
    }
    if files.len() != 1 {
        errors.push("Exactly one initial image is required".to_string());
    }
    for file in &files {
        if !storage::is_allowed_image(&file.filename, &file.content_type) {
            errors.push(format!("'{}' is not an accepted image", file.filename));
        }
    }
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "errors": errors }));
    }

    let address = match address {
        Some(a) => a,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "errors": ["A street address is required"]
            }))
        }
    };
    let file = &files[0];
    let stored = match storage::store_image(
        &state.config,
        file.data.clone(),
        &file.filename,
        &file.content_type,
    )
    .await
    {
        Ok(stored) => stored,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({
                "error": format!("Image upload failed: {}", e)
            }))
        }
    };

    let flat_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    if let Err(e) = sqlx::query(
        "INSERT INTO flats (id, square, price, currency, street, city, state, zip, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&flat_id)
    .bind(square)
    .bind(price)
    .bind(&currency)
    .bind(&address.street)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.zip)
    .bind(&created_at)
    .execute(pool)
    .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    if let Err(e) = insert_image(pool, &flat_id, &stored).await {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    match load_flat(pool, &flat_id).await {
        Ok(Some(flat)) => HttpResponse::Created().json(flat),
        Ok(None) => HttpResponse::InternalServerError().json(json!({
            "error": "Flat disappeared after creation"
        })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

async fn insert_image(
    pool: &SqlitePool,
    flat_id: &str,
    stored: &storage::StoredImage,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO flat_images (id, flat_id, url, filename, size, content_type, backend, provider_id, delete_url, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(Uuid::new_v4().to_string())
    .bind(flat_id)
    .bind(&stored.url)
    .bind(&stored.filename)
    .bind(stored.size)
    .bind(&stored.content_type)
    .bind(&stored.backend)
    .bind(&stored.provider_id)
    .bind(&stored.delete_url)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_flat(
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

    let mut flat = match load_flat(pool, &id).await {
        Ok(Some(flat)) => flat,
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "Flat not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    let obj = match body.as_object() {
        Some(o) => o,
        None => {
            return HttpResponse::BadRequest().json(json!({
                "error": "Request body must be a JSON object"
            }))
        }
    };

    let mut errors = Vec::new();
    if let Some(v) = obj.get("square") {
        match validation::coerce_number(v) {
            Some(square) => flat.square = square,
            None => errors.push("Square must be a number".to_string()),
        }
    }
    if let Some(v) = obj.get("price") {
        match validation::coerce_number(v) {
            Some(price) => flat.price = price,
            None => errors.push("Price must be a number".to_string()),
        }
    }
    match validation::normalize_currency(obj.get("currency").and_then(|v| v.as_str())) {
        Ok(Some(currency)) => flat.currency = currency,
        Ok(None) => {}
        Err(msg) => errors.push(msg),
    }
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "errors": errors }));
    }

    if let Some(address) = validation::normalize_address(&body) {
        if let Some(street) = address.street {
            flat.street = Some(street);
        }
        if let Some(city) = address.city {
            flat.city = Some(city);
        }
        if let Some(state_field) = address.state {
            flat.state = Some(state_field);
        }
        if let Some(zip) = address.zip {
            flat.zip = Some(zip);
        }
    }

    if let Err(e) = sqlx::query(
        "UPDATE flats SET square = ?, price = ?, currency = ?, street = ?, city = ?, state = ?, zip = ?, location = NULL WHERE id = ?"
    )
    .bind(flat.square)
    .bind(flat.price)
    .bind(&flat.currency)
    .bind(&flat.street)
    .bind(&flat.city)
    .bind(&flat.state)
    .bind(&flat.zip)
    .bind(&id)
    .execute(pool)
    .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Ok().json(flat)
}

pub async fn add_images(
    req: HttpRequest,
    path: web::Path<String>,
    mut payload: Multipart,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let flat_id = path.into_inner();
    let pool = &state.pool;

    match load_flat(pool, &flat_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "Flat not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }

    let (_, files) = match parse_multipart(&mut payload, state.config.max_upload_bytes).await {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };
    if files.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "At least one image file is required"
        }));
    }
    for file in &files {
        if !storage::is_allowed_image(&file.filename, &file.content_type) {
            return HttpResponse::BadRequest().json(json!({
                "error": format!("'{}' is not an accepted image", file.filename)
            }));
        }
    }

    // all uploads run concurrently; one failure aborts the whole batch
    // before any image row is written
    let uploads = files.iter().map(|file| {
        storage::store_image(
            &state.config,
            file.data.clone(),
            &file.filename,
            &file.content_type,
        )
    });
    let stored = match try_join_all(uploads).await {
        Ok(stored) => stored,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({
                "error": format!("Image upload failed: {}", e)
            }))
        }
    };

    for image in &stored {
        if let Err(e) = insert_image(pool, &flat_id, image).await {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
        }
    }

    match load_flat(pool, &flat_id).await {
        Ok(Some(flat)) => HttpResponse::Ok().json(flat),
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": "Flat not found" })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn remove_image(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let (flat_id, image_id) = path.into_inner();
    let pool = &state.pool;

    let row = sqlx::query("SELECT * FROM flat_images WHERE id = ? AND flat_id = ?")
        .bind(&image_id)
        .bind(&flat_id)
        .fetch_optional(pool)
        .await;
    let image = match row {
        Ok(Some(row)) => image_from_row(&row),
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "Image not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    // the record goes first; byte deletion afterwards is best-effort
    if let Err(e) = sqlx::query("DELETE FROM flat_images WHERE id = ?")
        .bind(&image_id)
        .execute(pool)
        .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }
    storage::delete_image(&state.config, &image).await;

    match load_images(pool, &flat_id).await {
        Ok(images) => HttpResponse::Ok().json(json!({ "flat_id": flat_id, "images": images })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}
