//! Resource normalization
//!
//! Maps provider-native records onto the canonical [`Resource`] model. Pure:
//! no I/O, and normalizing the same record twice yields identical output and
//! an identical [`Resource::fingerprint`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use crate::providers::{AttributeValue, NativeRecord};

pub mod kinds;
pub mod units;

pub use units::{ATTACHED_STORAGE_BYTES, GPU, MEMORY_BYTES, STORAGE_BYTES, VCPU};

/// Tag carrying the provider kind of resources classified as `other`
pub const TAG_NATIVE_TYPE: &str = "native_type";
/// Tag listing capacity attributes that could not be interpreted
pub const TAG_UNPARSED_CAPACITY: &str = "unparsed_capacity";
pub const TAG_IS_ORPHAN: &str = "is_orphan";

/// Canonical resource types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Server,
    Volume,
    Network,
    ManagedDatabase,
    LoadBalancer,
    ObjectStorage,
    DnsZone,
    MessageQueue,
    KubernetesCluster,
    IpAddress,
    Other,
}

/// Complete list of canonical types.
pub const ALL_RESOURCE_TYPES: &[ResourceType] = &[
    ResourceType::Server,
    ResourceType::Volume,
    ResourceType::Network,
    ResourceType::ManagedDatabase,
    ResourceType::LoadBalancer,
    ResourceType::ObjectStorage,
    ResourceType::DnsZone,
    ResourceType::MessageQueue,
    ResourceType::KubernetesCluster,
    ResourceType::IpAddress,
    ResourceType::Other,
];

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::Server => "server",
            ResourceType::Volume => "volume",
            ResourceType::Network => "network",
            ResourceType::ManagedDatabase => "managed_database",
            ResourceType::LoadBalancer => "load_balancer",
            ResourceType::ObjectStorage => "object_storage",
            ResourceType::DnsZone => "dns_zone",
            ResourceType::MessageQueue => "message_queue",
            ResourceType::KubernetesCluster => "kubernetes_cluster",
            ResourceType::IpAddress => "ip_address",
            ResourceType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_RESOURCE_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == value)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Active,
    Stopped,
    Error,
    Unknown,
}

impl ResourceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Stopped => "stopped",
            ResourceStatus::Error => "error",
            ResourceStatus::Unknown => "unknown",
        }
    }
}

/// A volume folded into the server it is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttachedVolume {
    pub native_id: String,
    pub name: String,
    pub storage_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
}

/// Canonical representation of one billable cloud object, before pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub provider_slug: String,
    pub resource_type: ResourceType,
    pub native_id: String,
    pub name: String,
    pub region: Option<String>,
    pub status: ResourceStatus,
    /// Canonical units: bytes for memory/storage, counts otherwise
    pub capacity: BTreeMap<String, u64>,
    pub attached_to: Option<String>,
    pub attached_volumes: Vec<AttachedVolume>,
    pub tags: BTreeMap<String, String>,
    pub extra: BTreeMap<String, AttributeValue>,
    pub is_orphan: bool,
}

impl Resource {
    /// SHA-256 over the canonical JSON of every normalized attribute.
    ///
    /// Maps are ordered, so equal resources always hash equal.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    pub fn capacity_of(&self, attribute: &str) -> u64 {
        self.capacity.get(attribute).copied().unwrap_or(0)
    }

    /// Text extra attribute, e.g. `disk_type` or `platform_id`.
    pub fn extra_text(&self, key: &str) -> Option<&str> {
        match self.extra.get(key) {
            Some(AttributeValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Identity of the resource within its connection.
    pub fn key(&self) -> (ResourceType, &str) {
        (self.resource_type, self.native_id.as_str())
    }
}

/// Errors that reject a single record; the rest of the batch still normalizes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("record is missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("duplicate record {resource_type}/{native_id}")]
    Duplicate {
        resource_type: ResourceType,
        native_id: String,
    },
    #[error("capacity {attribute} exceeds the representable range")]
    CapacityOverflow { attribute: String },
}

/// A record that could not be normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RejectedRecord {
    pub kind: String,
    pub native_id: String,
    pub reason: String,
}

/// Result of normalizing one provider listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    /// Sorted by `(resource_type, native_id)`
    pub resources: Vec<Resource>,
    pub rejected: Vec<RejectedRecord>,
}

/// Normalize one provider record.
pub fn normalize(provider: &str, record: &NativeRecord) -> Result<Resource, NormalizationError> {
    let native_id = record.native_id.trim();
    if native_id.is_empty() {
        return Err(NormalizationError::MissingField { field: "native_id" });
    }
    if record.kind.trim().is_empty() {
        return Err(NormalizationError::MissingField { field: "kind" });
    }

    let mut tags = record.labels.clone();
    let resource_type = match kinds::classify(provider, &record.kind) {
        Some(resource_type) => resource_type,
        None => {
            tags.insert(TAG_NATIVE_TYPE.to_string(), record.kind.clone());
            ResourceType::Other
        }
    };

    let mut capacity: BTreeMap<String, u64> = BTreeMap::new();
    let mut unparsed: BTreeSet<&str> = BTreeSet::new();
    for quantity in &record.capacity {
        match units::convert(quantity) {
            Some((attribute, value)) => {
                let total = capacity
                    .get(&attribute)
                    .copied()
                    .unwrap_or(0)
                    .checked_add(value)
                    .ok_or_else(|| NormalizationError::CapacityOverflow {
                        attribute: attribute.clone(),
                    })?;
                capacity.insert(attribute, total);
            }
            None => {
                unparsed.insert(quantity.attribute.as_str());
            }
        }
    }
    if !unparsed.is_empty() {
        tags.insert(
            TAG_UNPARSED_CAPACITY.to_string(),
            unparsed.into_iter().collect::<Vec<_>>().join(","),
        );
    }

    let name = record
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(native_id)
        .to_string();

    Ok(Resource {
        provider_slug: provider.to_string(),
        resource_type,
        native_id: native_id.to_string(),
        name,
        region: record.region.clone().filter(|r| !r.is_empty()),
        status: kinds::status(record.status.as_deref()),
        capacity,
        attached_to: record.attached_to.clone().filter(|a| !a.is_empty()),
        attached_volumes: Vec::new(),
        tags,
        extra: record.extra.clone(),
        is_orphan: false,
    })
}

/// Normalize a whole listing and resolve volume attachments.
///
/// Volumes attached to a server in the same listing are folded into that
/// server and not emitted on their own; every other volume is an orphan.
pub fn normalize_batch(provider: &str, records: &[NativeRecord]) -> NormalizedBatch {
    let mut rejected = Vec::new();
    let mut by_key: BTreeMap<(ResourceType, String), Resource> = BTreeMap::new();

    for record in records {
        let resource = match normalize(provider, record) {
            Ok(resource) => resource,
            Err(err) => {
                rejected.push(RejectedRecord {
                    kind: record.kind.clone(),
                    native_id: record.native_id.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let key = (resource.resource_type, resource.native_id.clone());
        if by_key.contains_key(&key) {
            let err = NormalizationError::Duplicate {
                resource_type: key.0,
                native_id: key.1,
            };
            rejected.push(RejectedRecord {
                kind: record.kind.clone(),
                native_id: record.native_id.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        by_key.insert(key, resource);
    }

    let server_ids: BTreeSet<String> = by_key
        .keys()
        .filter(|(t, _)| *t == ResourceType::Server)
        .map(|(_, id)| id.clone())
        .collect();

    let mut folded: BTreeMap<String, Vec<AttachedVolume>> = BTreeMap::new();
    let mut resources = Vec::with_capacity(by_key.len());

    for ((resource_type, _), mut resource) in by_key {
        if resource_type != ResourceType::Volume {
            resources.push(resource);
            continue;
        }
        match resource.attached_to.as_ref() {
            Some(parent) if server_ids.contains(parent) => {
                folded.entry(parent.clone()).or_default().push(AttachedVolume {
                    storage_bytes: resource.capacity_of(STORAGE_BYTES),
                    disk_type: resource.extra_text("disk_type").map(str::to_string),
                    native_id: resource.native_id,
                    name: resource.name,
                });
            }
            _ => {
                resource.is_orphan = true;
                resource
                    .tags
                    .insert(TAG_IS_ORPHAN.to_string(), "true".to_string());
                resources.push(resource);
            }
        }
    }

    let mut overflowed: BTreeSet<String> = BTreeSet::new();
    for resource in resources
        .iter_mut()
        .filter(|r| r.resource_type == ResourceType::Server)
    {
        let Some(volumes) = folded.remove(&resource.native_id) else {
            continue;
        };
        let attached = volumes
            .iter()
            .try_fold(0u64, |total, v| total.checked_add(v.storage_bytes));
        match attached {
            Some(attached) => {
                resource
                    .capacity
                    .insert(ATTACHED_STORAGE_BYTES.to_string(), attached);
                // volumes arrive in native_id order from the map iteration
                resource.attached_volumes = volumes;
            }
            None => {
                let err = NormalizationError::CapacityOverflow {
                    attribute: ATTACHED_STORAGE_BYTES.to_string(),
                };
                rejected.push(RejectedRecord {
                    kind: resource.resource_type.as_str().to_string(),
                    native_id: resource.native_id.clone(),
                    reason: err.to_string(),
                });
                overflowed.insert(resource.native_id.clone());
            }
        }
    }
    if !overflowed.is_empty() {
        resources.retain(|r| {
            r.resource_type != ResourceType::Server || !overflowed.contains(&r.native_id)
        });
    }

    // BTreeMap iteration already yields (resource_type, native_id) order.
    NormalizedBatch {
        resources,
        rejected,
    }
}
