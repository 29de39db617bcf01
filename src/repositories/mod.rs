//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! account, connection, snapshot, resource, pricing and sync-run tables.

pub mod account;
pub mod connection;
pub mod price_catalog;
pub mod provider;
pub mod resource;
pub mod snapshot;
pub mod sync_run;

pub use account::{AccountRepository, CreateAccountRequest};
pub use connection::{ConnectionRepository, CreateConnectionRequest};
pub use price_catalog::{NewCatalogPrice, PriceCatalogRepository};
pub use provider::ProviderRepository;
pub use resource::{ResourceRepository, ResourceTotals};
pub use snapshot::{CompletedSnapshot, SnapshotRepository};
pub use sync_run::{BulkSyncRunRecord, CompleteSyncRunRecord, SyncRunRepository};
