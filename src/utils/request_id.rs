use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::str::FromStr;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Correlation id attached to every request, echoed in the X-Request-ID
/// response header and in error bodies.
#[derive(Clone, Copy, Debug)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self(Uuid::nil())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Middleware that assigns a request id, honoring an X-Request-ID header
/// already set by a load balancer if it parses as a UUID.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::from_str(s).ok())
        .map(RequestId)
        .unwrap_or_else(RequestId::new);

    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), header_value);
    }

    response
}

/// Extension trait for pulling the request id out of request extensions.
pub trait RequestIdExt {
    fn request_id(&self) -> RequestId;
}

impl RequestIdExt for axum::http::Extensions {
    fn request_id(&self) -> RequestId {
        self.get::<RequestId>().copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        extract::Extension,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    async fn echo_handler(Extension(request_id): Extension<RequestId>) -> String {
        request_id.to_string()
    }

    #[tokio::test]
    async fn test_generates_request_id() {
        let app = Router::new()
            .route("/test", get(echo_handler))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let request = HttpRequest::builder()
            .uri("/test")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let header = response.headers().get("x-request-id").unwrap();
        assert!(Uuid::from_str(header.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_preserves_upstream_request_id() {
        let existing = Uuid::new_v4();
        let app = Router::new()
            .route("/test", get(echo_handler))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let request = HttpRequest::builder()
            .uri("/test")
            .header(REQUEST_ID_HEADER, existing.to_string())
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let header = response.headers().get("x-request-id").unwrap();
        assert_eq!(header.to_str().unwrap(), existing.to_string());
    }

    #[test]
    fn test_default_is_nil() {
        assert_eq!(RequestId::default().0, Uuid::nil());
    }
}
