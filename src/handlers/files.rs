use actix_web::{web, HttpResponse};
use std::path::Path;

use crate::state::AppState;

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(|e| e.to_lowercase()).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub async fn serve_upload(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let name = path.into_inner();
    // only plain filenames, no traversal
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return HttpResponse::NotFound().finish();
    }

    let full = Path::new(&state.config.upload_dir).join(&name);
    match tokio::fs::read(&full).await {
        Ok(bytes) => HttpResponse::Ok()
            .append_header(("Content-Type", content_type_for(&name)))
            .body(bytes),
        Err(_) => HttpResponse::NotFound().finish(),
    }
}
