//! Migration to create the price_catalog_entries table.
//!
//! Versioned SKU prices; the entry with the latest `effective_from` not after
//! the pricing instant wins.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PriceCatalogEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceCatalogEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PriceCatalogEntries::ProviderSlug)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PriceCatalogEntries::Sku).text().not_null())
                    .col(ColumnDef::new(PriceCatalogEntries::Unit).text().not_null())
                    .col(
                        ColumnDef::new(PriceCatalogEntries::UnitPrice)
                            .decimal_len(16, 6)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceCatalogEntries::Currency)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceCatalogEntries::EffectiveFrom)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceCatalogEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_price_catalog_provider_sku_effective")
                    .table(PriceCatalogEntries::Table)
                    .col(PriceCatalogEntries::ProviderSlug)
                    .col(PriceCatalogEntries::Sku)
                    .col(PriceCatalogEntries::EffectiveFrom)
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
                    .name("idx_price_catalog_provider_sku_effective")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PriceCatalogEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PriceCatalogEntries {
    Table,
    Id,
    ProviderSlug,
    Sku,
    Unit,
    UnitPrice,
    Currency,
    EffectiveFrom,
    CreatedAt,
}
