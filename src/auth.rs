//! Admin-surface authentication.
//!
//! The management endpoints share a single static API key presented in the
//! X-API-Key header. An empty configured key disables the check entirely
//! (open admin surface, logged loudly at each request); the ingestion
//! endpoint has the opposite fail-closed behavior, see `ingest`.

use crate::error::AppError;
use crate::server::Server;
use crate::utils::RequestIdExt;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Mask a secret for log output: first four and last two characters, with
/// everything in between elided. Short secrets are fully masked.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

pub async fn admin_auth_middleware(
    State(server): State<Server>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = server.config.auth.api_key.as_str();
    let request_id = request.extensions().request_id();

    if expected.is_empty() {
        warn!(
            path = %request.uri().path(),
            "admin API key is not configured, allowing unauthenticated access"
        );
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if key == expected => {
            debug!(key = %mask_secret(key), "admin request authenticated");
            Ok(next.run(request).await)
        }
        Some(key) => {
            warn!(key = %mask_secret(key), "admin request with invalid API key");
            Err(AppError::unauthorized("Invalid API key").with_request_id(request_id))
        }
        None => {
            Err(AppError::unauthorized("Missing X-API-Key header").with_request_id(request_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret_long() {
        assert_eq!(mask_secret("sk-abcdef123456"), "sk-a…56");
    }

    #[test]
    fn test_mask_secret_short() {
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret(""), "***");
        assert_eq!(mask_secret("12345678"), "***");
    }
}
