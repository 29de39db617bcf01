//! Migration to create the resources table.
//!
//! Resources are identified by `(connection_id, resource_type, native_id)`.
//! Rows are never deleted by synchronization; disappearance flips `is_active`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Resources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Resources::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Resources::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(Resources::AccountId).uuid().not_null())
                    .col(ColumnDef::new(Resources::ProviderSlug).text().not_null())
                    .col(ColumnDef::new(Resources::ResourceType).text().not_null())
                    .col(ColumnDef::new(Resources::NativeId).text().not_null())
                    .col(ColumnDef::new(Resources::Name).text().not_null())
                    .col(ColumnDef::new(Resources::Region).text().null())
                    .col(ColumnDef::new(Resources::Status).text().not_null())
                    .col(ColumnDef::new(Resources::Capacity).json_binary().null())
                    .col(ColumnDef::new(Resources::Tags).json_binary().null())
                    .col(ColumnDef::new(Resources::Extra).json_binary().null())
                    .col(
                        ColumnDef::new(Resources::AttachedVolumes)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(Resources::Fingerprint).text().not_null())
                    .col(
                        ColumnDef::new(Resources::DailyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Resources::MonthlyCost)
                            .decimal_len(16, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Resources::Currency).text().not_null())
                    .col(ColumnDef::new(Resources::CostSource).text().null())
                    .col(
                        ColumnDef::new(Resources::PricingUnresolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Resources::IsOrphan)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Resources::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Resources::FirstSeenAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Resources::LastSeenAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Resources::DeactivatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Resources::LastSnapshotId).uuid().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resources_connection_id")
                            .from(Resources::Table, Resources::ConnectionId)
                            .to(ProviderConnections::Table, ProviderConnections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_resources_connection_type_native")
                    .table(Resources::Table)
                    .col(Resources::ConnectionId)
                    .col(Resources::ResourceType)
                    .col(Resources::NativeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_resources_account_active")
                    .table(Resources::Table)
                    .col(Resources::AccountId)
                    .col(Resources::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_resources_connection_type_native")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_resources_account_active").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Resources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Resources {
    Table,
    Id,
    ConnectionId,
    AccountId,
    ProviderSlug,
    ResourceType,
    NativeId,
    Name,
    Region,
    Status,
    Capacity,
    Tags,
    Extra,
    AttachedVolumes,
    Fingerprint,
    DailyCost,
    MonthlyCost,
    Currency,
    CostSource,
    PricingUnresolved,
    IsOrphan,
    IsActive,
    FirstSeenAt,
    LastSeenAt,
    DeactivatedAt,
    LastSnapshotId,
}

#[derive(DeriveIden)]
enum ProviderConnections {
    Table,
    Id,
}
