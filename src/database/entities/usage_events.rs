use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One observed unit of provider usage. Rows are append-only: created by the
/// admission pipeline (or the legacy /log endpoint), never mutated, deleted
/// only by the bulk reset operation.
///
/// At most one of `api_key_id` / `ingest_token_id` is set (attribution
/// exclusivity); `(ingest_token_id, event_id)` is unique when `event_id` is
/// present, which backs the idempotency contract.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usage_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
    pub estimated_cost_usd: f64,
    pub source: String,
    pub provider: String,
    pub api_key_id: Option<i32>,
    pub ingest_token_id: Option<i32>,
    pub event_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Origin of a usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    /// Direct admin-authenticated write via the legacy /log endpoint.
    Legacy,
    /// Tracking-token-attributed write via the admission pipeline.
    Ingest,
    /// Row produced by the credential validation prober.
    Probe,
}

impl UsageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageSource::Legacy => "legacy",
            UsageSource::Ingest => "ingest",
            UsageSource::Probe => "probe",
        }
    }
}

impl std::fmt::Display for UsageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
