//! Price catalog snapshot used by the SKU tier.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

use super::sku::{PriceUnit, PricingComponent};
use super::{CostOverflow, add_product};
use crate::models::price_catalog_entry;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPrice {
    pub unit: PriceUnit,
    pub unit_price: Decimal,
    pub currency: String,
    pub effective_from: DateTime<FixedOffset>,
}

/// Prices in effect at one instant, keyed by `(provider, sku)`.
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    prices: HashMap<(String, String), CatalogPrice>,
}

impl PriceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep, per `(provider, sku)`, the latest entry effective at `as_of`.
    ///
    /// Entries with an unknown unit are ignored.
    pub fn from_entries<'a, I>(entries: I, as_of: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a price_catalog_entry::Model>,
    {
        let mut catalog = Self::new();
        for entry in entries {
            if entry.effective_from.with_timezone(&Utc) > as_of {
                continue;
            }
            let Some(unit) = PriceUnit::parse(&entry.unit) else {
                continue;
            };
            let key = (entry.provider_slug.clone(), entry.sku.clone());
            let newer = catalog
                .prices
                .get(&key)
                .is_none_or(|current| current.effective_from < entry.effective_from);
            if newer {
                catalog.prices.insert(
                    key,
                    CatalogPrice {
                        unit,
                        unit_price: entry.unit_price,
                        currency: entry.currency.clone(),
                        effective_from: entry.effective_from,
                    },
                );
            }
        }
        catalog
    }

    pub fn insert(
        &mut self,
        provider: &str,
        sku: &str,
        unit: PriceUnit,
        unit_price: Decimal,
        currency: &str,
    ) {
        self.prices.insert(
            (provider.to_string(), sku.to_string()),
            CatalogPrice {
                unit,
                unit_price,
                currency: currency.to_string(),
                effective_from: DateTime::<Utc>::UNIX_EPOCH.fixed_offset(),
            },
        );
    }

    pub fn get(&self, provider: &str, sku: &str) -> Option<&CatalogPrice> {
        self.prices.get(&(provider.to_string(), sku.to_string()))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Price every component, or `None` if any component has no matching
    /// entry in its unit or the matches disagree on currency.
    pub fn price(
        &self,
        provider: &str,
        components: &[PricingComponent],
    ) -> Result<Option<(Decimal, String)>, CostOverflow> {
        let mut total = Decimal::ZERO;
        let mut currency: Option<&str> = None;

        for component in components {
            let Some(price) = component
                .candidates()
                .filter_map(|sku| self.get(provider, sku))
                .find(|p| p.unit == component.kind.unit())
            else {
                return Ok(None);
            };
            match currency {
                Some(c) if c != price.currency => return Ok(None),
                _ => currency = Some(price.currency.as_str()),
            }
            total = add_product(total, price.unit_price, component.quantity)?;
        }

        Ok(currency.map(|c| (total, c.to_string())))
    }
}
