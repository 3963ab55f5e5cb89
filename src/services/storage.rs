use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

use crate::config::Config;
use crate::models::FlatImage;

pub const LOCAL_BACKEND: &str = "local";
pub const REMOTE_BACKEND: &str = "remote";

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Result of storing one uploaded image; `backend` is fixed here and
/// selects the deletion path for the lifetime of the record.
pub struct StoredImage {
    pub url: String,
    pub filename: String,
    pub size: i64,
    pub content_type: String,
    pub backend: String,
    pub provider_id: Option<String>,
    pub delete_url: Option<String>,
}

#[derive(Deserialize)]
struct RemoteUploadResponse {
    url: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    delete_url: Option<String>,
}

pub fn is_allowed_image(filename: &str, content_type: &str) -> bool {
    let ext_ok = filename
        .rsplit('.')
        .next()
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);
    ext_ok && content_type.starts_with("image/")
}

fn sanitize_filename(filename: &str) -> String {
    filename.replace(['/', '\\'], "_")
}

/// Stores the bytes on the configured backend: the remote image host when
/// one is configured, the local upload directory otherwise.
pub async fn store_image(
    config: &Config,
    data: Vec<u8>,
    filename: &str,
    content_type: &str,
) -> Result<StoredImage, Box<dyn std::error::Error>> {
    let size = data.len() as i64;

    if let Some(api_url) = &config.storage_api_url {
        let client = Client::new();
        let mut form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(data)
                .file_name(filename.to_string())
                .mime_str(content_type)?,
        );
        if let Some(key) = &config.storage_api_key {
            form = form.text("key", key.clone());
        }
        let response_text = client
            .post(api_url)
            .multipart(form)
            .send()
            .await?
            .text()
            .await?;
        let response: RemoteUploadResponse = serde_json::from_str(&response_text)
            .map_err(|e| format!("Failed to parse storage response: {}", e))?;
        return Ok(StoredImage {
            url: response.url,
            filename: filename.to_string(),
            size,
            content_type: content_type.to_string(),
            backend: REMOTE_BACKEND.to_string(),
            provider_id: response.id,
            delete_url: response.delete_url,
        });
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));
    let path = Path::new(&config.upload_dir).join(&stored_name);
    tokio::fs::write(&path, &data).await?;
    Ok(StoredImage {
        url: format!("/uploads/{}", stored_name),
        filename: filename.to_string(),
        size,
        content_type: content_type.to_string(),
        backend: LOCAL_BACKEND.to_string(),
        provider_id: None,
        delete_url: None,
    })
}

/// Best-effort deletion of the stored bytes, routed by the record's
/// backend tag. The image row is already gone by the time this runs, so
/// failures are logged and swallowed.
pub async fn delete_image(config: &Config, image: &FlatImage) {
    if image.backend == REMOTE_BACKEND {
        if let Some(delete_url) = &image.delete_url {
            let client = Client::new();
            if let Err(e) = client.delete(delete_url).send().await {
                eprintln!("Failed to delete remote image {}: {}", image.id, e);
            }
        }
        return;
    }
    if let Some(name) = image.url.strip_prefix("/uploads/") {
        let path = Path::new(&config.upload_dir).join(name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            eprintln!("Failed to delete local image {}: {}", image.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_allow_list() {
        assert!(is_allowed_image("flat.jpg", "image/jpeg"));
        assert!(is_allowed_image("FLAT.PNG", "image/png"));
        assert!(is_allowed_image("pic.webp", "image/webp"));
        assert!(!is_allowed_image("report.pdf", "application/pdf"));
        assert!(!is_allowed_image("flat.jpg", "application/octet-stream"));
        assert!(!is_allowed_image("noextension", "image/jpeg"));
    }

    #[test]
    fn filenames_lose_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("a\\b.png"), "a_b.png");
    }
}
