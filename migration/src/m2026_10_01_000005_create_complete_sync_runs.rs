//! Migration to create the complete_sync_runs table.
//!
//! One row per account-wide aggregation, holding the per-provider breakdown and
//! the list of per-connection errors.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CompleteSyncRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CompleteSyncRuns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CompleteSyncRuns::AccountId).uuid().not_null())
                    .col(
                        ColumnDef::new(CompleteSyncRuns::BulkSyncRunId)
                            .uuid()
                            .null(),
                    )
                    .col(ColumnDef::new(CompleteSyncRuns::Trigger).text().not_null())
                    .col(
                        ColumnDef::new(CompleteSyncRuns::Status)
                            .text()
                            .not_null()
                            .default("running"),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::TotalResources)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::TotalDailyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::TotalMonthlyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::CostByProvider)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::ResourcesByProvider)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CompleteSyncRuns::ConnectionResults)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(CompleteSyncRuns::Errors).json_binary().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_complete_sync_runs_account_id")
                            .from(CompleteSyncRuns::Table, CompleteSyncRuns::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_complete_sync_runs_bulk_sync_run_id")
                            .from(CompleteSyncRuns::Table, CompleteSyncRuns::BulkSyncRunId)
                            .to(BulkSyncRuns::Table, BulkSyncRuns::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_complete_sync_runs_account_started")
                    .table(CompleteSyncRuns::Table)
                    .col(CompleteSyncRuns::AccountId)
                    .col(CompleteSyncRuns::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_complete_sync_runs_account_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CompleteSyncRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CompleteSyncRuns {
    Table,
    Id,
    AccountId,
    BulkSyncRunId,
    Trigger,
    Status,
    StartedAt,
    CompletedAt,
    TotalResources,
    TotalDailyCost,
    TotalMonthlyCost,
    CostByProvider,
    ResourcesByProvider,
    ConnectionResults,
    Errors,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum BulkSyncRuns {
    Table,
    Id,
}
