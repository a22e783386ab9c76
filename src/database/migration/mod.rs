use sea_orm_migration::prelude::*;

mod m20250301_000001_create_usage_events_table;
mod m20250301_000002_create_tracking_tokens_table;
mod m20250301_000003_create_provider_credentials_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_usage_events_table::Migration),
            Box::new(m20250301_000002_create_tracking_tokens_table::Migration),
            Box::new(m20250301_000003_create_provider_credentials_table::Migration),
        ]
    }
}

#[derive(DeriveIden)]
pub enum UsageEvents {
    Table,
    Id,
    Timestamp,
    Model,
    PromptTokens,
    CompletionTokens,
    TotalTokens,
    EstimatedCostUsd,
    Source,
    Provider,
    ApiKeyId,
    IngestTokenId,
    EventId,
}

#[derive(DeriveIden)]
pub enum TrackingTokens {
    Table,
    Id,
    Label,
    Token,
    Active,
    CreatedAt,
    LastSeenAt,
}

#[derive(DeriveIden)]
pub enum ProviderCredentials {
    Table,
    Id,
    Label,
    Provider,
    EncryptedKey,
    Active,
    LastOk,
    CreatedAt,
}
