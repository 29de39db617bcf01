//! Database migrations for the cloudspend service.
//!
//! Schema for accounts, provider connections, snapshots, tracked resources and
//! the pricing catalog, expressed as SeaORM migrations.

pub use sea_orm_migration::prelude::*;

mod m2026_10_01_000001_create_accounts;
mod m2026_10_01_000002_create_providers;
mod m2026_10_01_000003_create_provider_connections;
mod m2026_10_01_000004_create_bulk_sync_runs;
mod m2026_10_01_000005_create_complete_sync_runs;
mod m2026_10_01_000006_create_snapshots;
mod m2026_10_01_000007_create_resources;
mod m2026_10_01_000008_create_resource_states;
mod m2026_10_01_000009_create_price_catalog_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_01_000001_create_accounts::Migration),
            Box::new(m2026_10_01_000002_create_providers::Migration),
            Box::new(m2026_10_01_000003_create_provider_connections::Migration),
            Box::new(m2026_10_01_000004_create_bulk_sync_runs::Migration),
            Box::new(m2026_10_01_000005_create_complete_sync_runs::Migration),
            Box::new(m2026_10_01_000006_create_snapshots::Migration),
            Box::new(m2026_10_01_000007_create_resources::Migration),
            Box::new(m2026_10_01_000008_create_resource_states::Migration),
            Box::new(m2026_10_01_000009_create_price_catalog_entries::Migration),
        ]
    }
}
