//! Migration to create the bulk_sync_runs table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BulkSyncRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BulkSyncRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::Status)
                            .text()
                            .not_null()
                            .default("running"),
                    )
                    .col(ColumnDef::new(BulkSyncRuns::Trigger).text().not_null())
                    .col(
                        ColumnDef::new(BulkSyncRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::DurationMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::TotalAccounts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::SucceededCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::PartialCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::FailedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::SkippedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BulkSyncRuns::AccountResults)
                            .json_binary()
                            .null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BulkSyncRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BulkSyncRuns {
    Table,
    Id,
    Status,
    Trigger,
    StartedAt,
    CompletedAt,
    DurationMs,
    TotalAccounts,
    SucceededCount,
    PartialCount,
    FailedCount,
    SkippedCount,
    AccountResults,
}
