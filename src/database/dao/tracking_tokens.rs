use crate::database::entities::{TrackingToken, tracking_tokens};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};

/// Tracking tokens DAO.
#[derive(Clone)]
pub struct TrackingTokensDao {
    db: DatabaseConnection,
}

impl TrackingTokensDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a token. A duplicate label or secret surfaces as
    /// `DatabaseError::Constraint`.
    pub async fn create(&self, label: &str, token: &str) -> DatabaseResult<TrackingToken> {
        let active_model = tracking_tokens::ActiveModel {
            id: ActiveValue::NotSet,
            label: Set(label.to_string()),
            token: Set(token.to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
            last_seen_at: Set(None),
        };

        active_model.insert(&self.db).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                DatabaseError::Constraint(e.to_string())
            } else {
                DatabaseError::Database(e.to_string())
            }
        })
    }

    /// Resolve a presented secret to its token row.
    pub async fn find_by_secret(&self, token: &str) -> DatabaseResult<Option<TrackingToken>> {
        tracking_tokens::Entity::find()
            .filter(tracking_tokens::Column::Token.eq(token))
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn find_by_id(&self, id: i32) -> DatabaseResult<Option<TrackingToken>> {
        tracking_tokens::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn list(&self) -> DatabaseResult<Vec<TrackingToken>> {
        tracking_tokens::Entity::find()
            .order_by_desc(tracking_tokens::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    /// Soft activation toggle.
    pub async fn set_active(&self, id: i32, active: bool) -> DatabaseResult<TrackingToken> {
        let active_model = tracking_tokens::ActiveModel {
            id: Set(id),
            active: Set(active),
            ..Default::default()
        };

        active_model.update(&self.db).await.map_err(|e| {
            if matches!(e, sea_orm::DbErr::RecordNotFound(_)) {
                DatabaseError::NotFound
            } else {
                DatabaseError::Database(e.to_string())
            }
        })
    }

    /// Hard delete.
    pub async fn delete(&self, id: i32) -> DatabaseResult<()> {
        let result = tracking_tokens::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Update last_seen_at; called once per accepted non-duplicate ingestion.
    pub async fn touch(&self, id: i32, seen_at: DateTime<Utc>) -> DatabaseResult<()> {
        let active_model = tracking_tokens::ActiveModel {
            id: Set(id),
            last_seen_at: Set(Some(seen_at)),
            ..Default::default()
        };

        active_model
            .update(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        Ok(())
    }
}
