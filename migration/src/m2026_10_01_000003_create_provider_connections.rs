//! Migration to create the provider_connections table.
//!
//! A connection binds an account to one provider with encrypted credentials
//! and non-secret provider settings.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::AccountId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::ProviderSlug)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::DisplayName)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::IncludeInCompleteSync)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::CredentialsCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::Settings)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provider_connections_provider_slug")
                            .from(
                                ProviderConnections::Table,
                                ProviderConnections::ProviderSlug,
                            )
                            .to(Providers::Table, Providers::Slug)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provider_connections_account_id")
                            .from(ProviderConnections::Table, ProviderConnections::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Complete sync walks connections in creation order per account.
        manager
            .create_index(
                Index::create()
                    .name("idx_provider_connections_account_created")
                    .table(ProviderConnections::Table)
                    .col(ProviderConnections::AccountId)
                    .col(ProviderConnections::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_provider_connections_account_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProviderConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderConnections {
    Table,
    Id,
    AccountId,
    ProviderSlug,
    DisplayName,
    Status,
    IncludeInCompleteSync,
    CredentialsCiphertext,
    Settings,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Slug,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}
