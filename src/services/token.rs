use actix_web::{HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs a fresh access+refresh pair for the given user. The two tokens
/// carry the same identity claims but distinct secrets and lifetimes.
pub fn issue_pair(
    config: &Config,
    user_id: &str,
    email: &str,
) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let access_claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(config.access_token_ttl_minutes)).timestamp(),
    };
    let refresh_claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(config.refresh_token_ttl_days)).timestamp(),
    };
    let access_token = encode(
        &Header::default(),
        &access_claims,
        &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
    )?;
    let refresh_token = encode(
        &Header::default(),
        &refresh_claims,
        &EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
    )?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn verify(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

pub fn verify_access(config: &Config, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    verify(token, &config.access_token_secret)
}

pub fn verify_refresh(config: &Config, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    verify(token, &config.refresh_token_secret)
}

/// Extracts and verifies the bearer access token; the Err side is the
/// ready-made 401 response for the handler to return.
pub fn authorize(req: &HttpRequest, config: &Config) -> Result<Claims, HttpResponse> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    match token {
        Some(t) => verify_access(config, t).map_err(|_| {
            HttpResponse::Unauthorized().json(json!({
                "error": "Invalid or expired access token"
            }))
        }),
        None => Err(HttpResponse::Unauthorized().json(json!({
            "error": "Missing bearer token"
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            port: 0,
            database_url: String::new(),
            access_token_secret: "access-secret".to_string(),
            refresh_token_secret: "refresh-secret".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            upload_dir: String::new(),
            max_upload_bytes: 0,
            storage_api_url: None,
            storage_api_key: None,
        }
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let config = test_config();
        let pair = issue_pair(&config, "user-1", "a@b.ge").unwrap();
        let access = verify_access(&config, &pair.access_token).unwrap();
        assert_eq!(access.sub, "user-1");
        assert_eq!(access.email, "a@b.ge");
        let refresh = verify_refresh(&config, &pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, "user-1");
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let config = test_config();
        let pair = issue_pair(&config, "user-1", "a@b.ge").unwrap();
        assert!(verify_refresh(&config, &pair.access_token).is_err());
        assert!(verify_access(&config, &pair.refresh_token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = test_config();
        let now = Utc::now();
        let claims = Claims {
            sub: "user-1".to_string(),
            email: "a@b.ge".to_string(),
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
        )
        .unwrap();
        assert!(verify_access(&config, &token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let config = test_config();
        assert!(verify_access(&config, "not-a-jwt").is_err());
    }
}
