use crate::database::DatabaseError;
use crate::database::entities::tracking_tokens::{
    TrackingTokenInfo, generate_tracking_token, validate_label,
};
use crate::error::AppError;
use crate::server::Server;
use crate::utils::RequestId;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub label: String,
}

/// POST /tokens. The secret appears in this response and nowhere else.
pub async fn create_token(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !validate_label(&request.label) {
        return Err(
            AppError::validation("label must be 1-64 characters").with_request_id(request_id)
        );
    }

    let secret = generate_tracking_token(server.config.tracking_tokens.length);
    let token = server
        .database
        .tracking_tokens()
        .create(request.label.trim(), &secret)
        .await
        .map_err(|e| match e {
            DatabaseError::Constraint(_) => {
                AppError::validation("label already in use").with_request_id(request_id)
            }
            other => AppError::from(other).with_request_id(request_id),
        })?;

    info!(token_id = token.id, label = %token.label, "tracking token created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": token.id,
            "label": token.label,
            "token": secret,
            "active": token.active,
            "created_at": token.created_at,
        })),
    ))
}

/// GET /tokens: metadata only, never secrets.
pub async fn list_tokens(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Value>, AppError> {
    let tokens: Vec<TrackingTokenInfo> = server
        .database
        .tracking_tokens()
        .list()
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?
        .into_iter()
        .map(TrackingTokenInfo::from)
        .collect();

    Ok(Json(json!({ "tokens": tokens })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTokenRequest {
    pub active: bool,
}

/// PATCH /tokens/{id}: activation toggle.
pub async fn update_token(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateTokenRequest>,
) -> Result<Json<TrackingTokenInfo>, AppError> {
    let token = server
        .database
        .tracking_tokens()
        .set_active(id, request.active)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    info!(token_id = id, active = request.active, "tracking token updated");
    Ok(Json(TrackingTokenInfo::from(token)))
}

/// DELETE /tokens/{id}.
pub async fn delete_token(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    server
        .database
        .tracking_tokens()
        .delete(id)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    info!(token_id = id, "tracking token deleted");
    Ok(Json(json!({ "message": "Token deleted" })))
}
