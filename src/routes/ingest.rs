use crate::error::AppError;
use crate::ingest::{INGEST_KEY_HEADER, IngestOutcome};
use crate::server::Server;
use crate::utils::RequestId;
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /ingest. The body is taken raw so authentication happens before any
/// parsing; the pipeline owns the rest of the stage order.
pub async fn ingest_event(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let presented_key = headers
        .get(INGEST_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    let admission = server
        .ingest_pipeline()
        .admit(presented_key, &body)
        .await
        .map_err(|e| e.with_request_id(request_id))?;

    let mut response = match admission.outcome {
        IngestOutcome::Created { id } => (
            StatusCode::CREATED,
            Json(json!({ "ok": true, "id": id })),
        )
            .into_response(),
        IngestOutcome::Duplicate => {
            (StatusCode::OK, Json(json!({ "duplicate": true }))).into_response()
        }
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&admission.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}", admission.remaining)) {
        headers.insert("X-RateLimit-Remaining", value);
    }

    Ok(response)
}
