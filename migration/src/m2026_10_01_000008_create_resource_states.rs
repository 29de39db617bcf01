//! Migration to create the resource_states table.
//!
//! Per-snapshot record of each resource's classification and priced cost.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ResourceStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResourceStates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ResourceStates::SnapshotId).uuid().not_null())
                    .col(ColumnDef::new(ResourceStates::ResourceId).uuid().not_null())
                    .col(ColumnDef::new(ResourceStates::Change).text().not_null())
                    .col(ColumnDef::new(ResourceStates::Status).text().not_null())
                    .col(
                        ColumnDef::new(ResourceStates::DailyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResourceStates::MonthlyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ResourceStates::CostSource).text().null())
                    .col(ColumnDef::new(ResourceStates::Fingerprint).text().not_null())
                    .col(
                        ColumnDef::new(ResourceStates::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resource_states_snapshot_id")
                            .from(ResourceStates::Table, ResourceStates::SnapshotId)
                            .to(Snapshots::Table, Snapshots::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resource_states_resource_id")
                            .from(ResourceStates::Table, ResourceStates::ResourceId)
                            .to(Resources::Table, Resources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_resource_states_snapshot_resource")
                    .table(ResourceStates::Table)
                    .col(ResourceStates::SnapshotId)
                    .col(ResourceStates::ResourceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_resource_states_snapshot_resource")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ResourceStates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ResourceStates {
    Table,
    Id,
    SnapshotId,
    ResourceId,
    Change,
    Status,
    DailyCost,
    MonthlyCost,
    CostSource,
    Fingerprint,
    RecordedAt,
}

#[derive(DeriveIden)]
enum Snapshots {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Resources {
    Table,
    Id,
}
