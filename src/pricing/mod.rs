//! Tiered cost resolution
//!
//! Tiers, first hit wins: authoritative billing, SKU catalog, derived unit
//! price, documented fallback. A resource no tier can price costs zero and
//! is flagged `pricing_unresolved`.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;

use crate::normalization::Resource;
use crate::providers::{BillingPeriod, BillingRecords, NativeBillingRecord};

pub mod catalog;
pub mod rates;
pub mod sku;

pub use catalog::{CatalogPrice, PriceCatalog};
pub use rates::{ANY_PROVIDER, RateTables, UnitRates, service_family};
pub use sku::{ComponentKind, PriceUnit, PricingComponent, components};

pub const DAYS_PER_MONTH: i64 = 30;
const HOURS_PER_DAY: i64 = 24;
/// Decimal places kept on persisted costs
pub const COST_SCALE: u32 = 4;

/// Pricing tier that produced a cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    AuthoritativeBilling,
    SkuCatalog,
    DerivedUnitPrice,
    DocumentedFallback,
}

impl CostSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            CostSource::AuthoritativeBilling => "authoritative_billing",
            CostSource::SkuCatalog => "sku_catalog",
            CostSource::DerivedUnitPrice => "derived_unit_price",
            CostSource::DocumentedFallback => "documented_fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authoritative_billing" => Some(CostSource::AuthoritativeBilling),
            "sku_catalog" => Some(CostSource::SkuCatalog),
            "derived_unit_price" => Some(CostSource::DerivedUnitPrice),
            "documented_fallback" => Some(CostSource::DocumentedFallback),
            _ => None,
        }
    }
}

impl fmt::Display for CostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved cost of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricedCost {
    pub daily_cost: Decimal,
    pub monthly_projection: Decimal,
    pub currency: String,
    /// `None` when no tier could price the resource
    pub cost_source: Option<CostSource>,
}

impl PricedCost {
    fn resolved(daily: Decimal, currency: String, source: CostSource) -> Result<Self, CostOverflow> {
        let daily_cost = round_cost(daily);
        Ok(Self {
            daily_cost,
            monthly_projection: monthly(daily_cost)?,
            currency,
            cost_source: Some(source),
        })
    }

    fn unresolved(currency: &str) -> Self {
        Self {
            daily_cost: Decimal::ZERO,
            monthly_projection: Decimal::ZERO,
            currency: currency.to_string(),
            cost_source: None,
        }
    }

    pub fn pricing_unresolved(&self) -> bool {
        self.cost_source.is_none()
    }
}

pub fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A cost left the range `Decimal` can represent. The resource is treated as
/// unpriced rather than given a wrapped or saturated figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cost arithmetic overflowed")]
pub struct CostOverflow;

/// `total + rate * quantity`
pub(crate) fn add_product(
    total: Decimal,
    rate: Decimal,
    quantity: Decimal,
) -> Result<Decimal, CostOverflow> {
    rate.checked_mul(quantity)
        .and_then(|line| total.checked_add(line))
        .ok_or(CostOverflow)
}

pub fn monthly(daily: Decimal) -> Result<Decimal, CostOverflow> {
    daily
        .checked_mul(Decimal::from(DAYS_PER_MONTH))
        .map(round_cost)
        .ok_or(CostOverflow)
}

fn per_day(record: &NativeBillingRecord) -> Result<Decimal, CostOverflow> {
    match record.period {
        BillingPeriod::Hour => record.amount.checked_mul(Decimal::from(HOURS_PER_DAY)),
        BillingPeriod::Day => Some(record.amount),
        BillingPeriod::Month => record.amount.checked_div(Decimal::from(DAYS_PER_MONTH)),
    }
    .ok_or(CostOverflow)
}

/// Billing records grouped by native id. Built only when the provider
/// supports billing, so "no records for this id" and "no billing source" stay
/// distinguishable.
#[derive(Debug, Clone, Default)]
pub struct BillingIndex {
    by_native_id: HashMap<String, Vec<NativeBillingRecord>>,
}

impl BillingIndex {
    pub fn from_records(billing: &BillingRecords) -> Option<Self> {
        match billing {
            BillingRecords::NotSupported => None,
            BillingRecords::Supported(records) => {
                let mut by_native_id: HashMap<String, Vec<NativeBillingRecord>> = HashMap::new();
                for record in records {
                    by_native_id
                        .entry(record.native_id.clone())
                        .or_default()
                        .push(record.clone());
                }
                Some(Self { by_native_id })
            }
        }
    }

    pub fn get(&self, native_id: &str) -> &[NativeBillingRecord] {
        self.by_native_id
            .get(native_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A normalized resource with its cost and attribute fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct PricedResource {
    pub resource: Resource,
    pub cost: PricedCost,
    pub fingerprint: String,
}

/// Deterministic tiered resolver. Holds only immutable inputs.
#[derive(Debug, Clone)]
pub struct PricingResolver {
    catalog: PriceCatalog,
    rates: RateTables,
    default_currency: String,
}

impl PricingResolver {
    pub fn new(catalog: PriceCatalog, rates: RateTables, default_currency: &str) -> Self {
        Self {
            catalog,
            rates,
            default_currency: default_currency.to_string(),
        }
    }

    /// Resolve the daily cost of one resource.
    pub fn resolve_cost(&self, resource: &Resource, billing: Option<&BillingIndex>) -> PricedCost {
        match self.resolve_tiers(resource, billing) {
            Ok(Some(cost)) => cost,
            Ok(None) => PricedCost::unresolved(&self.default_currency),
            Err(CostOverflow) => {
                warn!(
                    provider = %resource.provider_slug,
                    native_id = %resource.native_id,
                    "Cost out of range, leaving resource unpriced"
                );
                PricedCost::unresolved(&self.default_currency)
            }
        }
    }

    fn resolve_tiers(
        &self,
        resource: &Resource,
        billing: Option<&BillingIndex>,
    ) -> Result<Option<PricedCost>, CostOverflow> {
        if let Some(billing) = billing
            && let Some((daily, currency)) = self.authoritative(resource, billing)?
        {
            return PricedCost::resolved(daily, currency, CostSource::AuthoritativeBilling).map(Some);
        }

        let parts = components(resource);
        let provider = resource.provider_slug.as_str();

        if let Some((daily, currency)) = self.catalog.price(provider, &parts)? {
            return PricedCost::resolved(daily, currency, CostSource::SkuCatalog).map(Some);
        }

        if let Some(rates) = service_family(resource)
            .and_then(|family| self.rates.derived(provider, &family))
            && let Some(daily) = rates.price(&parts)?
        {
            return PricedCost::resolved(daily, rates.currency.clone(), CostSource::DerivedUnitPrice)
                .map(Some);
        }

        if let Some(rates) = self.rates.fallback(provider, resource.resource_type)
            && let Some(daily) = rates.price(&parts)?
        {
            return PricedCost::resolved(
                daily,
                rates.currency.clone(),
                CostSource::DocumentedFallback,
            )
            .map(Some);
        }

        Ok(None)
    }

    /// Records for the resource itself plus those of volumes folded into it.
    /// The currency is taken from the first record found, the resource's own
    /// before its volumes'. Records in any other currency are not summed.
    fn authoritative(
        &self,
        resource: &Resource,
        billing: &BillingIndex,
    ) -> Result<Option<(Decimal, String)>, CostOverflow> {
        let records: Vec<&NativeBillingRecord> = billing
            .get(&resource.native_id)
            .iter()
            .chain(
                resource
                    .attached_volumes
                    .iter()
                    .flat_map(|volume| billing.get(&volume.native_id)),
            )
            .collect();
        let Some(currency) = records.first().map(|record| record.currency.clone()) else {
            return Ok(None);
        };

        let mut total = Decimal::ZERO;
        for record in records.iter().filter(|record| record.currency == currency) {
            total = total.checked_add(per_day(record)?).ok_or(CostOverflow)?;
        }
        Ok(Some((total, currency)))
    }

    /// Price a batch in order.
    pub fn price_all(
        &self,
        resources: Vec<Resource>,
        billing: Option<&BillingIndex>,
    ) -> Vec<PricedResource> {
        resources
            .into_iter()
            .map(|resource| {
                let cost = self.resolve_cost(&resource, billing);
                let fingerprint = resource.fingerprint();
                PricedResource {
                    resource,
                    cost,
                    fingerprint,
                }
            })
            .collect()
    }
}
