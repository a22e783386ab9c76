use crate::error::AppError;
use crate::server::Server;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// Liveness probe; also verifies database connectivity.
pub async fn ping(State(server): State<Server>) -> Result<Json<Value>, AppError> {
    server.database.health_check().await?;
    Ok(Json(json!({ "message": "pong" })))
}
