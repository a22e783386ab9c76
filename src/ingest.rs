//! Usage-event admission pipeline.
//!
//! Every ingestion request passes through a fixed stage order: shared-key
//! authentication, body parsing, tracking-token resolution, per-token rate
//! limiting, payload normalization, then idempotent insertion. A stage only
//! runs once every earlier stage has passed, so an unauthenticated caller
//! never consumes rate-limit budget and never learns whether its payload
//! would have parsed.

use crate::auth::mask_secret;
use crate::config::Config;
use crate::database::entities::{UsageEvent, UsageSource};
use crate::database::{DatabaseError, DatabaseManager};
use crate::error::AppError;
use crate::pricing;
use crate::rate_limit::TokenBucketLimiter;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const INGEST_KEY_HEADER: &str = "x-ingest-key";

const DEFAULT_PROVIDER: &str = "openai";

/// Wire shape of an ingestion payload. Both snake_case and camelCase field
/// names are accepted for the token counts and cost.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(alias = "trackingToken")]
    pub tracking_token: Option<String>,
    pub model: Option<String>,
    #[serde(alias = "promptTokens")]
    pub prompt_tokens: Option<i64>,
    #[serde(alias = "completionTokens")]
    pub completion_tokens: Option<i64>,
    #[serde(alias = "totalTokens")]
    pub total_tokens: Option<i64>,
    #[serde(alias = "costUsd", alias = "estimatedCostUSD")]
    pub cost_usd: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "eventId")]
    pub event_id: Option<String>,
    pub provider: Option<String>,
}

/// Terminal outcome of a successful admission. A replayed event is a success
/// from the caller's point of view, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created { id: i32 },
    Duplicate,
}

/// Admission result: the outcome plus the rate-limit state to echo back in
/// response headers.
#[derive(Debug)]
pub struct Admission {
    pub outcome: IngestOutcome,
    pub limit: u32,
    pub remaining: f64,
}

pub struct IngestPipeline {
    config: Arc<Config>,
    database: Arc<dyn DatabaseManager>,
    limiter: Arc<TokenBucketLimiter>,
}

impl IngestPipeline {
    pub fn new(
        config: Arc<Config>,
        database: Arc<dyn DatabaseManager>,
        limiter: Arc<TokenBucketLimiter>,
    ) -> Self {
        Self {
            config,
            database,
            limiter,
        }
    }

    /// Run the full admission sequence for one request.
    pub async fn admit(&self, presented_key: Option<&str>, body: &[u8]) -> Result<Admission, AppError> {
        // Stage 1: endpoint must be configured. An empty ingest key rejects
        // everything rather than accepting everything.
        let expected_key = self.config.ingest.key.as_str();
        if expected_key.is_empty() {
            return Err(AppError::config("ingest key is not configured"));
        }

        // Stage 2: shared-key authentication, before the body is touched.
        match presented_key {
            Some(key) if key == expected_key => {}
            Some(key) => {
                warn!(key = %mask_secret(key), "ingest request with invalid key");
                return Err(AppError::unauthorized("Invalid ingest key"));
            }
            None => return Err(AppError::unauthorized("Missing X-Ingest-Key header")),
        }

        // Stage 3: parse.
        let request: IngestRequest = serde_json::from_slice(body)
            .map_err(|e| AppError::validation(format!("invalid JSON body: {e}")))?;

        // Stage 4: tracking token is mandatory and non-blank.
        let secret = request
            .tracking_token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation("tracking_token is required"))?;

        // Stage 5: resolve. Unknown secrets and deactivated tokens are
        // distinguishable on purpose so integrators can tell a typo from a
        // revocation.
        let token = self
            .database
            .tracking_tokens()
            .find_by_secret(secret)
            .await?
            .ok_or_else(|| AppError::not_found("Unknown tracking token"))?;

        if !token.active {
            warn!(token_id = token.id, label = %token.label, "ingest with deactivated token");
            return Err(AppError::forbidden("Tracking token is deactivated"));
        }

        // Stage 6: per-token rate limit. Keyed by row id, not by secret, so
        // bucket identity survives a secret appearing with surrounding
        // whitespace.
        let decision = self.limiter.check(&format!("ingest:{}", token.id));
        if !decision.allowed {
            warn!(token_id = token.id, "ingest rate limit exceeded");
            crate::metrics::record_rate_limit_rejection("ingest");
            return Err(AppError::rate_limited(
                decision.retry_after_secs,
                self.limiter.limit(),
                decision.remaining,
            ));
        }

        // Stage 7: normalize.
        let event = normalize(&request, token.id)?;

        // Stage 8: idempotent insert.
        let outcome = self.insert_idempotent(&event, token.id).await?;

        if let IngestOutcome::Created { id } = outcome {
            self.database
                .tracking_tokens()
                .touch(token.id, event.timestamp)
                .await?;
            info!(
                event_db_id = id,
                token_id = token.id,
                model = %event.model,
                total_tokens = event.total_tokens,
                "usage event ingested"
            );
        }
        crate::metrics::record_ingest_outcome(match outcome {
            IngestOutcome::Created { .. } => "created",
            IngestOutcome::Duplicate => "duplicate",
        });

        Ok(Admission {
            outcome,
            limit: self.limiter.limit(),
            remaining: decision.remaining,
        })
    }

    /// Pre-check then insert. The unique index on (ingest_token_id, event_id)
    /// catches the race where two retries pass the pre-check concurrently;
    /// the loser of that race is reported as a duplicate.
    async fn insert_idempotent(
        &self,
        event: &UsageEvent,
        token_id: i32,
    ) -> Result<IngestOutcome, AppError> {
        let usage = self.database.usage();

        if let Some(ref event_id) = event.event_id {
            if usage.duplicate_exists(token_id, event_id).await? {
                info!(token_id, event_id = %event_id, "duplicate event replayed");
                return Ok(IngestOutcome::Duplicate);
            }
        }

        match usage.insert(event).await {
            Ok(id) => Ok(IngestOutcome::Created { id }),
            Err(DatabaseError::Constraint(_)) if event.event_id.is_some() => {
                info!(token_id, "duplicate event lost insert race");
                Ok(IngestOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Turn a parsed payload into a storable usage event.
///
/// Token counts coerce negatives to zero, total defaults to prompt plus
/// completion, a missing or zero cost is estimated from the pricing table
/// when any tokens were counted, and a blank event_id means "no idempotency
/// key" rather than the empty-string key.
pub fn normalize(request: &IngestRequest, token_id: i32) -> Result<UsageEvent, AppError> {
    let model = request
        .model
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("model is required"))?;

    let prompt_tokens = clamp_tokens(request.prompt_tokens, "prompt_tokens")?;
    let completion_tokens = clamp_tokens(request.completion_tokens, "completion_tokens")?;
    let total_tokens = match request.total_tokens {
        Some(total) => clamp_tokens(Some(total), "total_tokens")?,
        None => prompt_tokens + completion_tokens,
    };

    let estimated_cost_usd = match request.cost_usd {
        Some(cost) if cost < 0.0 => {
            return Err(AppError::validation("cost_usd must not be negative"));
        }
        Some(cost) if cost > 0.0 => cost,
        _ if total_tokens > 0 => {
            pricing::estimate_cost(model, i64::from(prompt_tokens), i64::from(completion_tokens))
        }
        _ => 0.0,
    };

    let event_id = request
        .event_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let provider = request
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_PROVIDER)
        .to_string();

    Ok(UsageEvent {
        id: 0,
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
        model: model.to_string(),
        prompt_tokens,
        completion_tokens,
        total_tokens,
        estimated_cost_usd,
        source: UsageSource::Ingest.as_str().to_string(),
        provider,
        api_key_id: None,
        ingest_token_id: Some(token_id),
        event_id,
    })
}

/// Checked token-count conversion shared with the legacy /log path:
/// negatives coerce to zero, values beyond i32 are rejected outright.
pub(crate) fn clamp_tokens(value: Option<i64>, field: &str) -> Result<i32, AppError> {
    match value {
        None => Ok(0),
        Some(v) if v < 0 => Ok(0),
        Some(v) => i32::try_from(v)
            .map_err(|_| AppError::validation(format!("{field} is out of range"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_json(json: serde_json::Value) -> IngestRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_normalize_defaults_total_to_sum() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "prompt_tokens": 10,
            "completion_tokens": 5,
        }));
        let event = normalize(&request, 1).unwrap();
        assert_eq!(event.total_tokens, 15);
        assert_eq!(event.provider, "openai");
        assert_eq!(event.source, "ingest");
        assert_eq!(event.ingest_token_id, Some(1));
        assert_eq!(event.api_key_id, None);
    }

    #[test]
    fn test_normalize_requires_model() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "prompt_tokens": 10,
        }));
        assert!(normalize(&request, 1).is_err());

        let blank = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "   ",
        }));
        assert!(normalize(&blank, 1).is_err());
    }

    #[test]
    fn test_normalize_coerces_negative_counts_to_zero() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "prompt_tokens": -3,
            "completion_tokens": 5,
        }));
        let event = normalize(&request, 1).unwrap();
        assert_eq!(event.prompt_tokens, 0);
        assert_eq!(event.completion_tokens, 5);
        assert_eq!(event.total_tokens, 5);
    }

    #[test]
    fn test_normalize_rejects_out_of_range_counts() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "prompt_tokens": i64::from(i32::MAX) + 11,
        }));
        assert!(normalize(&request, 1).is_err());
    }

    #[test]
    fn test_normalize_estimates_missing_cost() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "prompt_tokens": 1000,
            "completion_tokens": 1000,
        }));
        let event = normalize(&request, 1).unwrap();
        assert!((event.estimated_cost_usd - 0.00075).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_preserves_explicit_cost() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "prompt_tokens": 1000,
            "cost_usd": 0.5,
        }));
        let event = normalize(&request, 1).unwrap();
        assert!((event.estimated_cost_usd - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_zero_cost_zero_tokens_stays_zero() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "cost_usd": 0.0,
        }));
        let event = normalize(&request, 1).unwrap();
        assert_eq!(event.estimated_cost_usd, 0.0);
    }

    #[test]
    fn test_normalize_rejects_negative_cost() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "cost_usd": -0.1,
        }));
        assert!(normalize(&request, 1).is_err());
    }

    #[test]
    fn test_normalize_blank_event_id_means_none() {
        let request = request_json(serde_json::json!({
            "tracking_token": "CGT_x",
            "model": "gpt-4o-mini",
            "event_id": "   ",
        }));
        let event = normalize(&request, 1).unwrap();
        assert_eq!(event.event_id, None);
    }

    #[test]
    fn test_camel_case_aliases() {
        let request = request_json(serde_json::json!({
            "trackingToken": "CGT_x",
            "model": "gpt-4o",
            "promptTokens": 7,
            "completionTokens": 3,
            "totalTokens": 10,
            "costUsd": 0.02,
            "eventId": "evt-1",
        }));
        assert_eq!(request.tracking_token.as_deref(), Some("CGT_x"));
        let event = normalize(&request, 9).unwrap();
        assert_eq!(event.prompt_tokens, 7);
        assert_eq!(event.completion_tokens, 3);
        assert_eq!(event.total_tokens, 10);
        assert_eq!(event.event_id.as_deref(), Some("evt-1"));
    }
}
