//! Provider kind and status tables.

use super::{ResourceStatus, ResourceType};

/// Yandex Cloud resource kinds
const YANDEX_KINDS: &[(&str, ResourceType)] = &[
    ("compute.instance", ResourceType::Server),
    ("compute.disk", ResourceType::Volume),
    ("compute.filesystem", ResourceType::Volume),
    ("vpc.network", ResourceType::Network),
    ("vpc.address", ResourceType::IpAddress),
    ("loadbalancer.networkLoadBalancer", ResourceType::LoadBalancer),
    ("apploadbalancer.loadBalancer", ResourceType::LoadBalancer),
    ("storage.bucket", ResourceType::ObjectStorage),
    ("dns.zone", ResourceType::DnsZone),
    ("k8s.cluster", ResourceType::KubernetesCluster),
    ("mdb.postgresql.cluster", ResourceType::ManagedDatabase),
    ("mdb.mysql.cluster", ResourceType::ManagedDatabase),
    ("mdb.clickhouse.cluster", ResourceType::ManagedDatabase),
    ("mdb.mongodb.cluster", ResourceType::ManagedDatabase),
    ("mdb.redis.cluster", ResourceType::ManagedDatabase),
    ("mdb.kafka.cluster", ResourceType::MessageQueue),
    ("ymq.queue", ResourceType::MessageQueue),
];

/// Selectel (OpenStack and platform services) kinds
const SELECTEL_KINDS: &[(&str, ResourceType)] = &[
    ("server", ResourceType::Server),
    ("volume", ResourceType::Volume),
    ("network", ResourceType::Network),
    ("floatingip", ResourceType::IpAddress),
    ("loadbalancer", ResourceType::LoadBalancer),
    ("s3.bucket", ResourceType::ObjectStorage),
    ("dns.zone", ResourceType::DnsZone),
    ("mks.cluster", ResourceType::KubernetesCluster),
    ("dbaas.postgresql", ResourceType::ManagedDatabase),
    ("dbaas.mysql", ResourceType::ManagedDatabase),
    ("dbaas.redis", ResourceType::ManagedDatabase),
    ("dbaas.kafka", ResourceType::MessageQueue),
];

fn table(provider: &str) -> &'static [(&'static str, ResourceType)] {
    match provider {
        "yandex" => YANDEX_KINDS,
        "selectel" => SELECTEL_KINDS,
        _ => &[],
    }
}

/// Map a provider kind onto the canonical type.
///
/// Provider tables win; otherwise the kind is accepted if it already is a
/// canonical name. Anything else is `None` and lands in `other`.
pub fn classify(provider: &str, kind: &str) -> Option<ResourceType> {
    table(provider)
        .iter()
        .find(|(native, _)| *native == kind)
        .map(|(_, canonical)| *canonical)
        .or_else(|| ResourceType::parse(kind).filter(|t| *t != ResourceType::Other))
}

pub fn status(native: Option<&str>) -> ResourceStatus {
    let Some(native) = native else {
        return ResourceStatus::Unknown;
    };
    match native.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "running" | "active" | "available" | "in_use" | "ready" | "alive" | "ok" | "healthy" => {
            ResourceStatus::Active
        }
        "stopped" | "stopping" | "shutoff" | "suspended" | "paused" | "shelved"
        | "shelved_offloaded" | "inactive" => ResourceStatus::Stopped,
        "error" | "failed" | "crashed" | "degraded" | "error_deleting" | "dead" => {
            ResourceStatus::Error
        }
        _ => ResourceStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tables_take_precedence() {
        assert_eq!(
            classify("yandex", "compute.instance"),
            Some(ResourceType::Server)
        );
        assert_eq!(
            classify("selectel", "floatingip"),
            Some(ResourceType::IpAddress)
        );
        assert_eq!(
            classify("yandex", "mdb.kafka.cluster"),
            Some(ResourceType::MessageQueue)
        );
    }

    #[test]
    fn canonical_names_accepted_for_any_provider() {
        assert_eq!(classify("manual", "server"), Some(ResourceType::Server));
        assert_eq!(
            classify("manual", "managed_database"),
            Some(ResourceType::ManagedDatabase)
        );
        assert_eq!(classify("manual", "other"), None);
        assert_eq!(classify("yandex", "serverless.function"), None);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status(Some("RUNNING")), ResourceStatus::Active);
        assert_eq!(status(Some("in-use")), ResourceStatus::Active);
        assert_eq!(status(Some("SHUTOFF")), ResourceStatus::Stopped);
        assert_eq!(status(Some("ERROR")), ResourceStatus::Error);
        assert_eq!(status(Some("PROVISIONING")), ResourceStatus::Unknown);
        assert_eq!(status(None), ResourceStatus::Unknown);
    }
}
