//! Unit rate tables for the derived and documented-fallback tiers.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::sku::{ComponentKind, PricingComponent};
use super::{CostOverflow, add_product};
use crate::normalization::{Resource, ResourceType};

/// Wildcard provider for fallback rates
pub const ANY_PROVIDER: &str = "*";

/// Per-day rates for each priced dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRates {
    pub vcpu_day: Option<Decimal>,
    pub gb_ram_day: Option<Decimal>,
    pub gb_storage_day: Option<Decimal>,
    pub gpu_day: Option<Decimal>,
    /// Flat charge per object and day
    pub unit_day: Option<Decimal>,
    pub currency: String,
}

impl UnitRates {
    pub fn new(currency: &str) -> Self {
        Self {
            vcpu_day: None,
            gb_ram_day: None,
            gb_storage_day: None,
            gpu_day: None,
            unit_day: None,
            currency: currency.to_string(),
        }
    }

    /// Compute rates, given in hundredths (`vcpu`, `gb_ram`, `gb_storage`).
    pub fn compute(currency: &str, vcpu: i64, gb_ram: i64, gb_storage: i64) -> Self {
        Self {
            vcpu_day: Some(Decimal::new(vcpu, 2)),
            gb_ram_day: Some(Decimal::new(gb_ram, 2)),
            gb_storage_day: Some(Decimal::new(gb_storage, 2)),
            ..Self::new(currency)
        }
    }

    pub fn with_gpu(mut self, gpu_day: Decimal) -> Self {
        self.gpu_day = Some(gpu_day);
        self
    }

    pub fn with_unit(mut self, unit_day: Decimal) -> Self {
        self.unit_day = Some(unit_day);
        self
    }

    pub fn storage_only(currency: &str, gb_storage: Decimal) -> Self {
        Self {
            gb_storage_day: Some(gb_storage),
            ..Self::new(currency)
        }
    }

    pub fn flat(currency: &str, unit_day: Decimal) -> Self {
        Self {
            unit_day: Some(unit_day),
            ..Self::new(currency)
        }
    }

    fn rate(&self, kind: ComponentKind) -> Option<Decimal> {
        match kind {
            ComponentKind::Vcpu => self.vcpu_day,
            ComponentKind::Ram => self.gb_ram_day,
            ComponentKind::Storage => self.gb_storage_day,
            ComponentKind::Gpu => self.gpu_day,
            ComponentKind::Unit => self.unit_day,
        }
    }

    /// Price every component; a dimension without a rate misses the whole table.
    pub fn price(&self, components: &[PricingComponent]) -> Result<Option<Decimal>, CostOverflow> {
        let mut total = Decimal::ZERO;
        for component in components {
            let Some(rate) = self.rate(component.kind) else {
                return Ok(None);
            };
            total = add_product(total, rate, component.quantity)?;
        }
        Ok(Some(total))
    }
}

/// Service family a resource is priced under in the derived tier.
pub fn service_family(resource: &Resource) -> Option<String> {
    if let Some(family) = resource.extra_text("service_family") {
        return Some(family.to_string());
    }
    let family = match resource.resource_type {
        ResourceType::Server => "compute",
        ResourceType::Volume => "block_storage",
        ResourceType::ManagedDatabase => "managed_database",
        ResourceType::MessageQueue => "managed_queue",
        ResourceType::KubernetesCluster => "managed_kubernetes",
        ResourceType::LoadBalancer => "load_balancer",
        ResourceType::ObjectStorage => "object_storage",
        ResourceType::IpAddress => "ip_address",
        ResourceType::Network | ResourceType::DnsZone | ResourceType::Other => return None,
    };
    Some(family.to_string())
}

/// Derived per-family rates and documented fallback rates.
#[derive(Debug, Clone, Default)]
pub struct RateTables {
    derived: HashMap<(String, String), UnitRates>,
    fallback: HashMap<(String, ResourceType), UnitRates>,
}

impl RateTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_derived(mut self, provider: &str, family: &str, rates: UnitRates) -> Self {
        self.derived
            .insert((provider.to_string(), family.to_string()), rates);
        self
    }

    pub fn with_fallback(
        mut self,
        provider: &str,
        resource_type: ResourceType,
        rates: UnitRates,
    ) -> Self {
        self.fallback
            .insert((provider.to_string(), resource_type), rates);
        self
    }

    pub fn derived(&self, provider: &str, family: &str) -> Option<&UnitRates> {
        self.derived
            .get(&(provider.to_string(), family.to_string()))
    }

    /// Provider-specific fallback first, then the wildcard row.
    pub fn fallback(&self, provider: &str, resource_type: ResourceType) -> Option<&UnitRates> {
        self.fallback
            .get(&(provider.to_string(), resource_type))
            .or_else(|| {
                self.fallback
                    .get(&(ANY_PROVIDER.to_string(), resource_type))
            })
    }

    /// Built-in tables shipped with the service.
    ///
    /// Derived rates are per managed-service family; fallback rates are
    /// list-price approximations from public provider price pages, in RUB
    /// per day.
    pub fn builtin() -> Self {
        const RUB: &str = "RUB";
        Self::new()
            // Yandex Cloud
            .with_derived(
                "yandex",
                "compute",
                UnitRates::compute(RUB, 2592, 684, 40).with_gpu(Decimal::new(482400, 2)),
            )
            .with_derived(
                "yandex",
                "block_storage",
                UnitRates::storage_only(RUB, Decimal::new(40, 2)),
            )
            .with_derived(
                "yandex",
                "managed_postgresql",
                UnitRates::compute(RUB, 4032, 1080, 43),
            )
            .with_derived(
                "yandex",
                "managed_kafka",
                UnitRates::compute(RUB, 4320, 1152, 43),
            )
            .with_derived(
                "yandex",
                "managed_kubernetes",
                UnitRates::flat(RUB, Decimal::new(21600, 2)),
            )
            // Selectel
            .with_derived(
                "selectel",
                "compute",
                UnitRates::compute(RUB, 1728, 504, 27).with_gpu(Decimal::new(360000, 2)),
            )
            .with_derived(
                "selectel",
                "block_storage",
                UnitRates::storage_only(RUB, Decimal::new(27, 2)),
            )
            .with_derived(
                "selectel",
                "managed_postgresql",
                UnitRates::compute(RUB, 3456, 864, 36),
            )
            // Any provider
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::Server,
                UnitRates::compute(RUB, 2400, 600, 30),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::Volume,
                UnitRates::storage_only(RUB, Decimal::new(30, 2)),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::ManagedDatabase,
                UnitRates::compute(RUB, 3600, 900, 40),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::MessageQueue,
                UnitRates::compute(RUB, 3600, 900, 40),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::KubernetesCluster,
                UnitRates::flat(RUB, Decimal::new(21600, 2)),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::LoadBalancer,
                UnitRates::flat(RUB, Decimal::new(4800, 2)),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::IpAddress,
                UnitRates::flat(RUB, Decimal::new(432, 2)),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::DnsZone,
                UnitRates::flat(RUB, Decimal::new(150, 2)),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::Network,
                UnitRates::flat(RUB, Decimal::ZERO),
            )
            .with_fallback(
                ANY_PROVIDER,
                ResourceType::ObjectStorage,
                UnitRates::storage_only(RUB, Decimal::new(7, 2)).with_unit(Decimal::ZERO),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dimension_misses_table() {
        let rates = UnitRates::storage_only("RUB", Decimal::ONE);
        let vcpu = PricingComponent {
            kind: ComponentKind::Vcpu,
            quantity: Decimal::from(2),
            sku: "x:server:vcpu".into(),
            generic_sku: "x:server:vcpu".into(),
        };
        assert_eq!(rates.price(&[vcpu.clone()]), Ok(None));
        assert_eq!(rates.price(&[]), Ok(Some(Decimal::ZERO)));

        let huge = UnitRates::flat("RUB", Decimal::MAX);
        let unit = PricingComponent {
            kind: ComponentKind::Unit,
            quantity: Decimal::from(2),
            ..vcpu
        };
        assert_eq!(huge.price(&[unit]), Err(CostOverflow));
    }

    #[test]
    fn provider_fallback_precedes_wildcard() {
        let tables = RateTables::new()
            .with_fallback(ANY_PROVIDER, ResourceType::Volume, UnitRates::storage_only("RUB", Decimal::ONE))
            .with_fallback("selectel", ResourceType::Volume, UnitRates::storage_only("RUB", Decimal::TWO));
        assert_eq!(
            tables.fallback("selectel", ResourceType::Volume).unwrap().gb_storage_day,
            Some(Decimal::TWO)
        );
        assert_eq!(
            tables.fallback("yandex", ResourceType::Volume).unwrap().gb_storage_day,
            Some(Decimal::ONE)
        );
        assert!(tables.fallback("yandex", ResourceType::Other).is_none());
    }

    #[test]
    fn builtin_covers_every_priced_type() {
        let tables = RateTables::builtin();
        for t in [
            ResourceType::Server,
            ResourceType::Volume,
            ResourceType::ManagedDatabase,
            ResourceType::LoadBalancer,
            ResourceType::IpAddress,
            ResourceType::Network,
        ] {
            assert!(tables.fallback("manual", t).is_some(), "no fallback for {t}");
        }
        assert!(tables.fallback("manual", ResourceType::Other).is_none());
        assert!(tables.derived("yandex", "managed_postgresql").is_some());
    }
}
