use crate::crypto::CryptoError;
use crate::database::DatabaseError;
use crate::utils::RequestId;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::error;

/// When false (production), 5xx responses carry only an opaque message; the
/// full error is still logged server-side. Set once at server startup.
static DEBUG_ERRORS: AtomicBool = AtomicBool::new(false);

pub fn set_debug_errors(enabled: bool) {
    DEBUG_ERRORS.store(enabled, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        limit: u32,
        remaining: f64,
    },
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application error carrying the taxonomy kind plus the correlation id of
/// the request it failed. Duplicate-event detection is deliberately NOT an
/// error; see `ingest::IngestOutcome`.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub request_id: Option<RequestId>,
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        ErrorKind::Config(message.into()).into()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ErrorKind::Unauthorized(message.into()).into()
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ErrorKind::Forbidden(message.into()).into()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ErrorKind::NotFound(message.into()).into()
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ErrorKind::Validation(message.into()).into()
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal(message.into()).into()
    }

    pub fn rate_limited(retry_after_secs: u64, limit: u32, remaining: f64) -> Self {
        ErrorKind::RateLimited {
            retry_after_secs,
            limit,
            remaining,
        }
        .into()
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            ErrorKind::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden(_) => StatusCode::FORBIDDEN,
            ErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Database(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            ErrorKind::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Crypto(CryptoError::MissingMasterKey) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        ErrorKind::Database(err).into()
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        ErrorKind::Crypto(err).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = self
            .request_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        if status.is_server_error() {
            error!(request_id = %request_id, error = %self.kind, "request failed");
        }

        let message = if status.is_server_error() && !DEBUG_ERRORS.load(Ordering::Relaxed) {
            "Internal server error".to_string()
        } else {
            self.kind.to_string()
        };

        let body = Json(json!({
            "status": status.as_u16(),
            "message": message,
            "requestId": request_id,
        }));

        let mut response = (status, body).into_response();

        if let ErrorKind::RateLimited {
            retry_after_secs,
            limit,
            remaining,
        } = self.kind
        {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert(RETRY_AFTER, value);
            }
            if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("X-RateLimit-Limit", value);
            }
            if let Ok(value) = HeaderValue::from_str(&format!("{remaining:.2}")) {
                headers.insert("X-RateLimit-Remaining", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::unauthorized("bad key").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::forbidden("inactive").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::not_found("unknown token").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::validation("bad field").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::rate_limited(3, 60, 0.5).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::config("missing secret").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let response = AppError::rate_limited(7, 60, 0.25).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "7");
        assert_eq!(response.headers().get("X-RateLimit-Limit").unwrap(), "60");
        assert_eq!(
            response.headers().get("X-RateLimit-Remaining").unwrap(),
            "0.25"
        );
    }

    #[test]
    fn test_database_not_found_maps_to_404() {
        let err: AppError = DatabaseError::NotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_with_request_id() {
        let id = RequestId::new();
        let err = AppError::validation("bad").with_request_id(id);
        assert_eq!(err.request_id.unwrap().0, id.0);
    }
}
