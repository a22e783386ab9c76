use crate::config::DatabaseConfig;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

pub mod dao;
pub mod entities;
pub mod migration;

pub use dao::{CredentialsDao, TrackingTokensDao, UsageDao, UsageQuery};

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Storage access for the rest of the service. Handlers and the ingestion
/// pipeline only see this trait, never a raw connection.
#[async_trait]
pub trait DatabaseManager: Send + Sync {
    async fn migrate(&self) -> DatabaseResult<()>;
    async fn health_check(&self) -> DatabaseResult<()>;

    fn usage(&self) -> UsageDao;
    fn tracking_tokens(&self) -> TrackingTokensDao;
    fn credentials(&self) -> CredentialsDao;

    fn connection(&self) -> &DatabaseConnection;
}

pub struct DatabaseManagerImpl {
    connection: DatabaseConnection,
}

impl DatabaseManagerImpl {
    pub async fn new_from_config(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let mut options = ConnectOptions::new(config.url.clone());
        options
            .max_connections(20)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .sqlx_logging(false);

        let connection = Database::connect(options)
            .await
            .map_err(|e| DatabaseError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self { connection })
    }

    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DatabaseManager for DatabaseManagerImpl {
    async fn migrate(&self) -> DatabaseResult<()> {
        migration::Migrator::up(&self.connection, None)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        self.connection
            .ping()
            .await
            .map_err(|e| DatabaseError::Database(e.to_string()))
    }

    fn usage(&self) -> UsageDao {
        UsageDao::new(self.connection.clone())
    }

    fn tracking_tokens(&self) -> TrackingTokensDao {
        TrackingTokensDao::new(self.connection.clone())
    }

    fn credentials(&self) -> CredentialsDao {
        CredentialsDao::new(self.connection.clone())
    }

    fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}
