use std::env;

/// Process configuration, read from the environment exactly once at startup.
/// Handlers and services receive this through `AppState` and never touch
/// the environment themselves.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub storage_api_url: Option<String>,
    pub storage_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .unwrap_or(8080);
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://estate.db".to_string());
        let access_token_secret = env::var("ACCESS_TOKEN_SECRET")
            .unwrap_or_else(|_| "dev-access-secret".to_string());
        let refresh_token_secret = env::var("REFRESH_TOKEN_SECRET")
            .unwrap_or_else(|_| "dev-refresh-secret".to_string());
        let access_token_ttl_minutes = env::var("ACCESS_TOKEN_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);
        let refresh_token_ttl_days = env::var("REFRESH_TOKEN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10 * 1024 * 1024);
        let storage_api_url = env::var("STORAGE_API_URL").ok().filter(|v| !v.is_empty());
        let storage_api_key = env::var("STORAGE_API_KEY").ok().filter(|v| !v.is_empty());

        Config {
            port,
            database_url,
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_minutes,
            refresh_token_ttl_days,
            upload_dir,
            max_upload_bytes,
            storage_api_url,
            storage_api_key,
        }
    }
}
