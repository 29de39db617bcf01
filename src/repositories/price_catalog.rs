//! Price catalog repository
//!
//! The catalog is filled by an upstream feed; the sync path only reads it.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::price_catalog_entry::{self, Entity as PriceCatalogEntry};
use crate::pricing::{PriceCatalog, PriceUnit};

/// Request data for one catalog price
#[derive(Debug, Clone)]
pub struct NewCatalogPrice {
    pub provider_slug: String,
    pub sku: String,
    pub unit: PriceUnit,
    pub unit_price: Decimal,
    pub currency: String,
    pub effective_from: DateTime<Utc>,
}

/// Repository for price catalog entries
#[derive(Debug, Clone)]
pub struct PriceCatalogRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl PriceCatalogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a catalog price; prices are versioned by `effective_from`
    pub async fn insert(&self, price: NewCatalogPrice) -> Result<price_catalog_entry::Model> {
        if price.unit_price.is_sign_negative() {
            return Err(anyhow!("unit price for '{}' cannot be negative", price.sku));
        }

        let entry = price_catalog_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider_slug: Set(price.provider_slug),
            sku: Set(price.sku),
            unit: Set(price.unit.as_str().to_string()),
            unit_price: Set(price.unit_price),
            currency: Set(price.currency.to_uppercase()),
            effective_from: Set(price.effective_from.into()),
            created_at: Set(Utc::now().into()),
        };
        Ok(entry.insert(&*self.db).await?)
    }

    /// Entries of a provider ordered by SKU then effective date
    pub async fn list_for_provider(
        &self,
        provider_slug: &str,
    ) -> Result<Vec<price_catalog_entry::Model>> {
        Ok(PriceCatalogEntry::find()
            .filter(price_catalog_entry::Column::ProviderSlug.eq(provider_slug))
            .order_by_asc(price_catalog_entry::Column::Sku)
            .order_by_asc(price_catalog_entry::Column::EffectiveFrom)
            .all(&*self.db)
            .await?)
    }

    /// Loads the prices in effect at `as_of` for one provider
    pub async fn load_catalog(&self, provider_slug: &str, as_of: DateTime<Utc>) -> Result<PriceCatalog> {
        let entries = self.list_for_provider(provider_slug).await?;
        Ok(PriceCatalog::from_entries(&entries, as_of))
    }
}
