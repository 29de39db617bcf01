//! Provider catalog seeding
//!
//! Every adapter in the [`Registry`] gets a row in the `providers` table so
//! connections can reference it. Seeding runs on every startup and only
//! writes rows whose catalog fields changed.

use std::sync::Arc;

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;

use crate::providers::Registry;
use crate::repositories::ProviderRepository;

/// Seeds the providers table from the registered adapters
///
/// # Arguments
///
/// * `db` - Database connection
/// * `registry` - Registry whose metadata describes the built-in providers
///
/// # Returns
///
/// Returns the number of providers present after seeding
pub async fn seed_providers(db: &DatabaseConnection, registry: &Registry) -> Result<usize> {
    let repo = ProviderRepository::new(Arc::new(db.clone()));
    let metadata = registry.list_metadata();

    for provider in &metadata {
        let stored = repo
            .upsert(
                &provider.name,
                &provider.display_name,
                provider.auth_type.as_str(),
                provider.billing_api,
            )
            .await
            .with_context(|| format!("seeding provider '{}'", provider.name))?;
        log::debug!(
            "Provider '{}' seeded (auth_type={}, billing_api={})",
            stored.slug,
            stored.auth_type,
            stored.billing_api
        );
    }

    log::info!("Provider seeding completed: {} providers", metadata.len());
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::manual::register_manual_adapter;
    use sea_orm::Database;
    use migration::{Migrator, MigratorTrait};

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let mut registry = Registry::new();
        register_manual_adapter(&mut registry);

        assert_eq!(seed_providers(&db, &registry).await.unwrap(), 1);
        assert_eq!(seed_providers(&db, &registry).await.unwrap(), 1);

        let repo = ProviderRepository::new(Arc::new(db));
        let rows = repo.list_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slug, "manual");
        assert_eq!(rows[0].auth_type, "none");
    }
}
