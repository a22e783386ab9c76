use super::ProviderCredentials;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderCredentials::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderCredentials::Label)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderCredentials::Provider)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderCredentials::EncryptedKey)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderCredentials::Active)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderCredentials::LastOk)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderCredentials::Table).to_owned())
            .await
    }
}
