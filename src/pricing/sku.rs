//! SKU signatures.
//!
//! A resource is broken into priced components (vCPU, RAM, GPU, storage or a
//! flat unit). Each component has a signature
//! `<provider>:<resource_type>:<component>[:<class>]` and the same signature
//! without class, tried in that order against the catalog.
//!
//! Classes:
//! * server compute (`vcpu`, `ram`, `gpu`): `platform_id`, suffixed with
//!   `.cf<N>` when `core_fraction` is below 100; otherwise the flavor family
//!   (the part of `flavor` before the first `.`)
//! * managed services: the `service_family` extra
//! * storage: the `disk_type` extra
//! * `other`: the `native_type` tag

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::normalization::{
    AttachedVolume, GPU, MEMORY_BYTES, Resource, ResourceType, STORAGE_BYTES, TAG_NATIVE_TYPE,
    VCPU,
};
use crate::providers::AttributeValue;

const BYTES_PER_GB: u64 = 1 << 30;

/// Billing unit of a catalog price or unit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    VcpuDay,
    GbRamDay,
    GbStorageDay,
    /// GPUs and flat per-object charges
    UnitDay,
}

impl PriceUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            PriceUnit::VcpuDay => "vcpu_day",
            PriceUnit::GbRamDay => "gb_ram_day",
            PriceUnit::GbStorageDay => "gb_storage_day",
            PriceUnit::UnitDay => "unit_day",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "vcpu_day" => Some(PriceUnit::VcpuDay),
            "gb_ram_day" => Some(PriceUnit::GbRamDay),
            "gb_storage_day" => Some(PriceUnit::GbStorageDay),
            "unit_day" => Some(PriceUnit::UnitDay),
            _ => None,
        }
    }
}

impl fmt::Display for PriceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Vcpu,
    Ram,
    Gpu,
    Storage,
    Unit,
}

impl ComponentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Vcpu => "vcpu",
            ComponentKind::Ram => "ram",
            ComponentKind::Gpu => "gpu",
            ComponentKind::Storage => "storage",
            ComponentKind::Unit => "unit",
        }
    }

    pub const fn unit(self) -> PriceUnit {
        match self {
            ComponentKind::Vcpu => PriceUnit::VcpuDay,
            ComponentKind::Ram => PriceUnit::GbRamDay,
            ComponentKind::Storage => PriceUnit::GbStorageDay,
            ComponentKind::Gpu | ComponentKind::Unit => PriceUnit::UnitDay,
        }
    }
}

/// One priced dimension of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingComponent {
    pub kind: ComponentKind,
    pub quantity: Decimal,
    /// Signature including the class, when the resource has one
    pub sku: String,
    /// Signature without class
    pub generic_sku: String,
}

impl PricingComponent {
    fn new(
        provider: &str,
        resource_type: ResourceType,
        kind: ComponentKind,
        class: Option<&str>,
        quantity: Decimal,
    ) -> Self {
        let generic_sku = format!("{provider}:{resource_type}:{}", kind.as_str());
        let sku = match class.map(str::trim).filter(|c| !c.is_empty()) {
            Some(class) => format!("{generic_sku}:{}", class.to_lowercase()),
            None => generic_sku.clone(),
        };
        Self {
            kind,
            quantity,
            sku,
            generic_sku,
        }
    }

    /// Candidate signatures, most specific first.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        let generic = (self.generic_sku != self.sku).then_some(self.generic_sku.as_str());
        std::iter::once(self.sku.as_str()).chain(generic)
    }
}

fn gigabytes(bytes: u64) -> Decimal {
    Decimal::from(bytes) / Decimal::from(BYTES_PER_GB)
}

fn compute_class(resource: &Resource) -> Option<String> {
    if resource.resource_type != ResourceType::Server {
        return resource.extra_text("service_family").map(str::to_string);
    }
    if let Some(platform) = resource.extra_text("platform_id") {
        return Some(match resource.extra.get("core_fraction") {
            Some(AttributeValue::Integer(fraction)) if *fraction < 100 => {
                format!("{platform}.cf{fraction}")
            }
            _ => platform.to_string(),
        });
    }
    resource
        .extra_text("flavor")
        .and_then(|flavor| flavor.split('.').next())
        .map(str::to_string)
}

fn volume_component(provider: &str, volume: &AttachedVolume) -> PricingComponent {
    PricingComponent::new(
        provider,
        ResourceType::Volume,
        ComponentKind::Storage,
        volume.disk_type.as_deref(),
        gigabytes(volume.storage_bytes),
    )
}

/// Break a resource into priced components, folded volumes included.
pub fn components(resource: &Resource) -> Vec<PricingComponent> {
    let provider = resource.provider_slug.as_str();
    let resource_type = resource.resource_type;
    let mut parts = Vec::new();

    match resource_type {
        ResourceType::Server
        | ResourceType::ManagedDatabase
        | ResourceType::MessageQueue
        | ResourceType::KubernetesCluster => {
            let class = compute_class(resource);
            let class = class.as_deref();
            let vcpu = resource.capacity_of(VCPU);
            if vcpu > 0 {
                parts.push(PricingComponent::new(
                    provider,
                    resource_type,
                    ComponentKind::Vcpu,
                    class,
                    Decimal::from(vcpu),
                ));
            }
            let memory = resource.capacity_of(MEMORY_BYTES);
            if memory > 0 {
                parts.push(PricingComponent::new(
                    provider,
                    resource_type,
                    ComponentKind::Ram,
                    class,
                    gigabytes(memory),
                ));
            }
            let gpu = resource.capacity_of(GPU);
            if gpu > 0 {
                parts.push(PricingComponent::new(
                    provider,
                    resource_type,
                    ComponentKind::Gpu,
                    class,
                    Decimal::from(gpu),
                ));
            }
            let storage = resource.capacity_of(STORAGE_BYTES);
            if storage > 0 {
                parts.push(PricingComponent::new(
                    provider,
                    resource_type,
                    ComponentKind::Storage,
                    resource.extra_text("disk_type"),
                    gigabytes(storage),
                ));
            }
        }
        ResourceType::Volume | ResourceType::ObjectStorage => {
            let storage = resource.capacity_of(STORAGE_BYTES);
            if storage > 0 {
                parts.push(PricingComponent::new(
                    provider,
                    resource_type,
                    ComponentKind::Storage,
                    resource.extra_text("disk_type"),
                    gigabytes(storage),
                ));
            }
        }
        _ => {}
    }

    parts.extend(
        resource
            .attached_volumes
            .iter()
            .map(|volume| volume_component(provider, volume)),
    );

    if parts.is_empty() {
        let class = match resource_type {
            ResourceType::Other => resource.tags.get(TAG_NATIVE_TYPE).map(String::as_str),
            _ => None,
        };
        parts.push(PricingComponent::new(
            provider,
            resource_type,
            ComponentKind::Unit,
            class,
            Decimal::ONE,
        ));
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::normalize_batch;
    use crate::providers::{NativeQuantity, NativeRecord};

    fn yandex_server() -> NativeRecord {
        let mut record = NativeRecord::new("compute.instance", "i-1");
        record.capacity = vec![
            NativeQuantity::number("cores", 2.0, "count"),
            NativeQuantity::number("memory", 4.0, "GiB"),
        ];
        record
            .extra
            .insert("platform_id".into(), AttributeValue::from("standard-v3"));
        record
            .extra
            .insert("core_fraction".into(), AttributeValue::from(20i64));
        record
    }

    #[test]
    fn server_signatures_carry_platform_class() {
        let mut disk = NativeRecord::new("compute.disk", "d-1");
        disk.attached_to = Some("i-1".into());
        disk.capacity = vec![NativeQuantity::number("size", 20.0, "GB")];
        disk.extra
            .insert("disk_type".into(), AttributeValue::from("network-ssd"));

        let batch = normalize_batch("yandex", &[yandex_server(), disk]);
        let parts = components(&batch.resources[0]);

        let skus: Vec<&str> = parts.iter().map(|p| p.sku.as_str()).collect();
        assert_eq!(
            skus,
            vec![
                "yandex:server:vcpu:standard-v3.cf20",
                "yandex:server:ram:standard-v3.cf20",
                "yandex:volume:storage:network-ssd",
            ]
        );
        assert_eq!(parts[1].quantity, Decimal::from(4));
        assert_eq!(parts[2].quantity, Decimal::from(20));
        assert_eq!(
            parts[0].candidates().collect::<Vec<_>>(),
            vec!["yandex:server:vcpu:standard-v3.cf20", "yandex:server:vcpu"]
        );
    }

    #[test]
    fn flavor_family_is_class_without_platform() {
        let mut record = NativeRecord::new("server", "s-1");
        record.capacity = vec![NativeQuantity::number("vcpus", 1.0, "count")];
        record
            .extra
            .insert("flavor".into(), AttributeValue::from("SL1.1-2048"));
        let batch = normalize_batch("selectel", &[record]);
        let parts = components(&batch.resources[0]);
        assert_eq!(parts[0].sku, "selectel:server:vcpu:sl1");
    }

    #[test]
    fn capacityless_resources_get_unit_component() {
        let batch = normalize_batch("yandex", &[NativeRecord::new("vpc.address", "a-1")]);
        let parts = components(&batch.resources[0]);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].sku, "yandex:ip_address:unit");
        assert_eq!(parts[0].candidates().count(), 1);
        assert_eq!(parts[0].kind.unit(), PriceUnit::UnitDay);
    }

    #[test]
    fn other_uses_native_type_class() {
        let batch = normalize_batch("yandex", &[NativeRecord::new("serverless.function", "f-1")]);
        let parts = components(&batch.resources[0]);
        assert_eq!(parts[0].sku, "yandex:other:unit:serverless.function");
    }

    #[test]
    fn price_units_parse() {
        for unit in [
            PriceUnit::VcpuDay,
            PriceUnit::GbRamDay,
            PriceUnit::GbStorageDay,
            PriceUnit::UnitDay,
        ] {
            assert_eq!(PriceUnit::parse(unit.as_str()), Some(unit));
        }
        assert_eq!(PriceUnit::parse("vcpu_hour"), None);
    }
}
