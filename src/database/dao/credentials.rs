use crate::database::entities::{ProviderCredential, provider_credentials};
use crate::database::{DatabaseError, DatabaseResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, DatabaseConnection, EntityTrait, QueryOrder, Set, SqlErr,
};

/// Provider credentials DAO. Only ciphertext ever passes through here.
#[derive(Clone)]
pub struct CredentialsDao {
    db: DatabaseConnection,
}

impl CredentialsDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        label: &str,
        provider: &str,
        encrypted_key: Vec<u8>,
    ) -> DatabaseResult<ProviderCredential> {
        let active_model = provider_credentials::ActiveModel {
            id: ActiveValue::NotSet,
            label: Set(label.to_string()),
            provider: Set(provider.to_string()),
            encrypted_key: Set(encrypted_key),
            active: Set(true),
            last_ok: Set(None),
            created_at: Set(Utc::now()),
        };

        active_model.insert(&self.db).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                DatabaseError::Constraint(e.to_string())
            } else {
                DatabaseError::Database(e.to_string())
            }
        })
    }

    pub async fn find_by_id(&self, id: i32) -> DatabaseResult<Option<ProviderCredential>> {
        provider_credentials::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn list(&self) -> DatabaseResult<Vec<ProviderCredential>> {
        provider_credentials::Entity::find()
            .order_by_desc(provider_credentials::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    pub async fn set_active(&self, id: i32, active: bool) -> DatabaseResult<ProviderCredential> {
        let active_model = provider_credentials::ActiveModel {
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

    pub async fn delete(&self, id: i32) -> DatabaseResult<()> {
        let result = provider_credentials::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}
