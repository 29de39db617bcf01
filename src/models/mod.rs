//! # Data Models
//!
//! SeaORM entities for accounts, provider connections, snapshots, tracked
//! resources and pricing data.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod account;
pub mod bulk_sync_run;
pub mod complete_sync_run;
pub mod price_catalog_entry;
pub mod provider;
pub mod provider_connection;
pub mod resource;
pub mod resource_state;
pub mod snapshot;

pub use account::Entity as Account;
pub use bulk_sync_run::Entity as BulkSyncRun;
pub use complete_sync_run::Entity as CompleteSyncRun;
pub use price_catalog_entry::Entity as PriceCatalogEntry;
pub use provider::Entity as Provider;
pub use provider_connection::Entity as ProviderConnection;
pub use resource::Entity as Resource;
pub use resource_state::Entity as ResourceState;
pub use snapshot::Entity as Snapshot;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "cloudspend".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
