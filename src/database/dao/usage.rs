use crate::database::entities::{UsageEvent, usage_events};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};

/// Usage event query filters.
#[derive(Debug, Default)]
pub struct UsageQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub ingest_token_id: Option<i32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Usage events DAO.
#[derive(Clone)]
pub struct UsageDao {
    db: DatabaseConnection,
}

impl UsageDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a usage event and return its assigned id.
    ///
    /// Attribution exclusivity is enforced here: an event may carry an
    /// api_key_id or an ingest_token_id, never both. A uniqueness violation
    /// on `(ingest_token_id, event_id)` surfaces as
    /// `DatabaseError::Constraint` so the pipeline can treat a lost insert
    /// race as a duplicate, not a hard failure.
    pub async fn insert(&self, event: &UsageEvent) -> DatabaseResult<i32> {
        if event.api_key_id.is_some() && event.ingest_token_id.is_some() {
            return Err(DatabaseError::Constraint(
                "usage event cannot be attributed to both an api key and an ingest token"
                    .to_string(),
            ));
        }

        let active_model = usage_events::ActiveModel {
            id: ActiveValue::NotSet,
            timestamp: Set(event.timestamp),
            model: Set(event.model.clone()),
            prompt_tokens: Set(event.prompt_tokens),
            completion_tokens: Set(event.completion_tokens),
            total_tokens: Set(event.total_tokens),
            estimated_cost_usd: Set(event.estimated_cost_usd),
            source: Set(event.source.clone()),
            provider: Set(event.provider.clone()),
            api_key_id: Set(event.api_key_id),
            ingest_token_id: Set(event.ingest_token_id),
            event_id: Set(event.event_id.clone()),
        };

        let inserted = active_model.insert(&self.db).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                DatabaseError::Constraint(e.to_string())
            } else {
                DatabaseError::Database(e.to_string())
            }
        })?;

        Ok(inserted.id)
    }

    /// Pre-check used by the idempotency stage before attempting an insert.
    pub async fn duplicate_exists(
        &self,
        ingest_token_id: i32,
        event_id: &str,
    ) -> DatabaseResult<bool> {
        let count = usage_events::Entity::find()
            .filter(usage_events::Column::IngestTokenId.eq(ingest_token_id))
            .filter(usage_events::Column::EventId.eq(event_id))
            .count(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    /// Fetch usage events with filtering, most recent first.
    pub async fn query(&self, query: &UsageQuery) -> DatabaseResult<Vec<UsageEvent>> {
        let mut select = usage_events::Entity::find();

        if let Some(start_date) = query.start_date {
            select = select.filter(usage_events::Column::Timestamp.gte(start_date));
        }
        if let Some(end_date) = query.end_date {
            select = select.filter(usage_events::Column::Timestamp.lte(end_date));
        }
        if let Some(ref model) = query.model {
            select = select.filter(usage_events::Column::Model.eq(model));
        }
        if let Some(token_id) = query.ingest_token_id {
            select = select.filter(usage_events::Column::IngestTokenId.eq(token_id));
        }

        select = select.order_by_desc(usage_events::Column::Timestamp);

        if let Some(limit) = query.limit {
            select = select.limit(Some(limit as u64));
        }
        if let Some(offset) = query.offset {
            select = select.offset(Some(offset as u64));
        }

        select
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    /// Bulk reset: delete every usage event. Returns the number of rows
    /// removed.
    pub async fn reset_all(&self) -> DatabaseResult<u64> {
        let result = usage_events::Entity::delete_many()
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
