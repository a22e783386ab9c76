use super::UsageEvents;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsageEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UsageEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UsageEvents::Model).string().not_null())
                    .col(
                        ColumnDef::new(UsageEvents::PromptTokens)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::CompletionTokens)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::TotalTokens)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsageEvents::EstimatedCostUsd)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UsageEvents::Source).string().not_null())
                    .col(ColumnDef::new(UsageEvents::Provider).string().not_null())
                    .col(ColumnDef::new(UsageEvents::ApiKeyId).integer().null())
                    .col(ColumnDef::new(UsageEvents::IngestTokenId).integer().null())
                    .col(ColumnDef::new(UsageEvents::EventId).string().null())
                    .to_owned(),
            )
            .await?;

        // Race-safe idempotency: two concurrent retries of the same event may
        // both pass the pre-check, but only one insert can satisfy this
        // unique index. NULL event_ids do not conflict.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_usage_events_token_event_unique")
                    .table(UsageEvents::Table)
                    .col(UsageEvents::IngestTokenId)
                    .col(UsageEvents::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_usage_events_timestamp")
                    .table(UsageEvents::Table)
                    .col(UsageEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_usage_events_model")
                    .table(UsageEvents::Table)
                    .col(UsageEvents::Model)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UsageEvents::Table).to_owned())
            .await
    }
}
