use crate::database::UsageQuery;
use crate::database::entities::{UsageEvent, UsageSource};
use crate::error::AppError;
use crate::pricing;
use crate::server::Server;
use crate::utils::RequestId;
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UsageQueryParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub token_id: Option<i32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /data: usage events, most recent first.
pub async fn list_usage(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<UsageQueryParams>,
) -> Result<Json<Value>, AppError> {
    let query = UsageQuery {
        start_date: params.start,
        end_date: params.end,
        model: params.model,
        ingest_token_id: params.token_id,
        limit: params.limit,
        offset: params.offset,
    };

    let events = server
        .database
        .usage()
        .query(&query)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    Ok(Json(json!({ "data": events })))
}

/// Legacy direct-write payload. Predates tracking tokens; rows land with
/// source "legacy" and no attribution.
#[derive(Debug, Deserialize)]
pub struct LogRequest {
    pub model: Option<String>,
    #[serde(alias = "promptTokens")]
    pub prompt_tokens: Option<i64>,
    #[serde(alias = "completionTokens")]
    pub completion_tokens: Option<i64>,
    #[serde(alias = "totalTokens")]
    pub total_tokens: Option<i64>,
    #[serde(alias = "estimatedCostUSD", alias = "costUsd")]
    pub cost_usd: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub provider: Option<String>,
}

/// POST /log: admin-authenticated direct write.
pub async fn log_usage(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<LogRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let model = request
        .model
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("model is required").with_request_id(request_id))?;

    let prompt_tokens = crate::ingest::clamp_tokens(request.prompt_tokens, "prompt_tokens")
        .map_err(|e| e.with_request_id(request_id))?;
    let completion_tokens =
        crate::ingest::clamp_tokens(request.completion_tokens, "completion_tokens")
            .map_err(|e| e.with_request_id(request_id))?;
    let total_tokens = match request.total_tokens {
        Some(total) => crate::ingest::clamp_tokens(Some(total), "total_tokens")
            .map_err(|e| e.with_request_id(request_id))?,
        None => prompt_tokens + completion_tokens,
    };

    let estimated_cost_usd = match request.cost_usd {
        Some(cost) if cost > 0.0 => cost,
        _ if total_tokens > 0 => {
            pricing::estimate_cost(model, i64::from(prompt_tokens), i64::from(completion_tokens))
        }
        _ => 0.0,
    };

    let event = UsageEvent {
        id: 0,
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
        model: model.to_string(),
        prompt_tokens,
        completion_tokens,
        total_tokens,
        estimated_cost_usd,
        source: UsageSource::Legacy.as_str().to_string(),
        provider: request
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("openai")
            .to_string(),
        api_key_id: None,
        ingest_token_id: None,
        event_id: None,
    };

    let id = server
        .database
        .usage()
        .insert(&event)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    info!(event_db_id = id, model = %event.model, "legacy usage event logged");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Data logged successfully", "id": id })),
    ))
}

/// DELETE /reset: wipe all usage events.
pub async fn reset_usage(
    State(server): State<Server>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Value>, AppError> {
    let deleted = server
        .database
        .usage()
        .reset_all()
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id))?;

    info!(deleted, "usage events reset");
    Ok(Json(json!({ "message": "All data reset", "deleted": deleted })))
}
