use super::TrackingTokens;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackingTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackingTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TrackingTokens::Label)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(TrackingTokens::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(TrackingTokens::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(TrackingTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingTokens::LastSeenAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Secret lookup happens on every ingestion request.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tracking_tokens_token")
                    .table(TrackingTokens::Table)
                    .col(TrackingTokens::Token)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TrackingTokens::Table).to_owned())
            .await
    }
}
