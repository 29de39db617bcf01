//! Migration to create the snapshots table.
//!
//! A snapshot records one synchronization attempt for one connection. Rows with
//! status `error` never carry resource states.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Snapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Snapshots::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Snapshots::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(Snapshots::AccountId).uuid().not_null())
                    .col(ColumnDef::new(Snapshots::ProviderSlug).text().not_null())
                    .col(ColumnDef::new(Snapshots::CompleteSyncRunId).uuid().null())
                    .col(
                        ColumnDef::new(Snapshots::Status)
                            .text()
                            .not_null()
                            .default("running"),
                    )
                    .col(
                        ColumnDef::new(Snapshots::Phase)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Snapshots::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Snapshots::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Snapshots::FoundCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::TotalDailyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::TotalMonthlyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::CreatedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::UpdatedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::UnchangedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Snapshots::RemovedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Snapshots::Discovery).json_binary().null())
                    .col(ColumnDef::new(Snapshots::Error).json_binary().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_snapshots_connection_id")
                            .from(Snapshots::Table, Snapshots::ConnectionId)
                            .to(ProviderConnections::Table, ProviderConnections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Latest completed snapshot per connection.
        manager
            .create_index(
                Index::create()
                    .name("idx_snapshots_connection_started")
                    .table(Snapshots::Table)
                    .col(Snapshots::ConnectionId)
                    .col(Snapshots::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_snapshots_connection_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Snapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Snapshots {
    Table,
    Id,
    ConnectionId,
    AccountId,
    ProviderSlug,
    CompleteSyncRunId,
    Status,
    Phase,
    StartedAt,
    CompletedAt,
    FoundCount,
    TotalDailyCost,
    TotalMonthlyCost,
    CreatedCount,
    UpdatedCount,
    UnchangedCount,
    RemovedCount,
    Discovery,
    Error,
}

#[derive(DeriveIden)]
enum ProviderConnections {
    Table,
    Id,
}
