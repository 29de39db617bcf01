//! Snapshot change tracking
//!
//! Classifies every resource of a fresh listing against the connection's
//! currently active resources. The diff is a pure value; the snapshot
//! repository applies it in a single transaction.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::resource;
use crate::pricing::{PricedResource, round_cost};

/// Classification of a resource within one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Unchanged,
    Removed,
}

impl ChangeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Unchanged => "unchanged",
            ChangeKind::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a stored resource row that change detection looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedResource {
    pub id: Uuid,
    pub resource_type: String,
    pub native_id: String,
    pub status: String,
    pub fingerprint: String,
    pub daily_cost: Decimal,
    pub monthly_cost: Decimal,
    pub currency: String,
    pub cost_source: Option<String>,
}

impl From<&resource::Model> for TrackedResource {
    fn from(model: &resource::Model) -> Self {
        Self {
            id: model.id,
            resource_type: model.resource_type.clone(),
            native_id: model.native_id.clone(),
            status: model.status.clone(),
            fingerprint: model.fingerprint.clone(),
            // Stored decimals may come back with a different scale.
            daily_cost: round_cost(model.daily_cost),
            monthly_cost: round_cost(model.monthly_cost),
            currency: model.currency.clone(),
            cost_source: model.cost_source.clone(),
        }
    }
}

impl TrackedResource {
    fn differs_from(&self, current: &PricedResource) -> bool {
        self.fingerprint != current.fingerprint
            || self.daily_cost != current.cost.daily_cost
            || self.currency != current.cost.currency
            || self.cost_source.as_deref() != current.cost.cost_source.map(|s| s.as_str())
    }
}

/// Classification of one resource of the current listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceChange {
    /// Position in the current listing
    pub index: usize,
    pub change: ChangeKind,
    /// Row of the previously active resource with the same identity
    pub previous_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChangeCounts {
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Active resources before this snapshot
    pub previous_active: usize,
}

impl ChangeCounts {
    /// `found == created + updated + unchanged` and
    /// `previous_active == updated + unchanged + removed`.
    pub fn is_conserved(&self) -> bool {
        self.found == self.created + self.updated + self.unchanged
            && self.previous_active == self.updated + self.unchanged + self.removed
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    /// One entry per current resource, in listing order
    pub changes: Vec<ResourceChange>,
    /// Previously active resources missing from the listing
    pub removed: Vec<TrackedResource>,
    pub counts: ChangeCounts,
}

/// Diff the current priced listing against the previously active set.
///
/// Identity is `(resource_type, native_id)`. A resource is `updated` when its
/// fingerprint, cost, currency or cost source moved.
pub fn diff_snapshot(previous: &[TrackedResource], current: &[PricedResource]) -> SnapshotDiff {
    let by_key: HashMap<(&str, &str), &TrackedResource> = previous
        .iter()
        .map(|tracked| {
            (
                (tracked.resource_type.as_str(), tracked.native_id.as_str()),
                tracked,
            )
        })
        .collect();

    let mut counts = ChangeCounts {
        found: current.len(),
        previous_active: previous.len(),
        ..ChangeCounts::default()
    };
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(current.len());
    let mut changes = Vec::with_capacity(current.len());

    for (index, priced) in current.iter().enumerate() {
        let key = (
            priced.resource.resource_type.as_str(),
            priced.resource.native_id.as_str(),
        );
        let change = match by_key.get(&key) {
            None => {
                counts.created += 1;
                ResourceChange {
                    index,
                    change: ChangeKind::Created,
                    previous_id: None,
                }
            }
            Some(tracked) => {
                seen.insert(tracked.id);
                let change = if tracked.differs_from(priced) {
                    counts.updated += 1;
                    ChangeKind::Updated
                } else {
                    counts.unchanged += 1;
                    ChangeKind::Unchanged
                };
                ResourceChange {
                    index,
                    change,
                    previous_id: Some(tracked.id),
                }
            }
        };
        changes.push(change);
    }

    let removed: Vec<TrackedResource> = previous
        .iter()
        .filter(|tracked| !seen.contains(&tracked.id))
        .cloned()
        .collect();
    counts.removed = removed.len();

    SnapshotDiff {
        changes,
        removed,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::normalize_batch;
    use crate::pricing::{PricingResolver, PriceCatalog, RateTables};
    use crate::providers::{NativeQuantity, NativeRecord};

    fn listing(ids: &[(&str, f64)]) -> Vec<PricedResource> {
        let records: Vec<NativeRecord> = ids
            .iter()
            .map(|(id, cores)| {
                let mut record = NativeRecord::new("server", *id);
                record.capacity = vec![
                    NativeQuantity::number("vcpus", *cores, "count"),
                    NativeQuantity::number("ram", 4096.0, "MB"),
                ];
                record
            })
            .collect();
        let batch = normalize_batch("selectel", &records);
        PricingResolver::new(PriceCatalog::new(), RateTables::builtin(), "RUB")
            .price_all(batch.resources, None)
    }

    fn tracked(priced: &[PricedResource]) -> Vec<TrackedResource> {
        priced
            .iter()
            .map(|p| TrackedResource {
                id: Uuid::new_v4(),
                resource_type: p.resource.resource_type.as_str().to_string(),
                native_id: p.resource.native_id.clone(),
                status: p.resource.status.as_str().to_string(),
                fingerprint: p.fingerprint.clone(),
                daily_cost: p.cost.daily_cost,
                monthly_cost: p.cost.monthly_projection,
                currency: p.cost.currency.clone(),
                cost_source: p.cost.cost_source.map(|s| s.as_str().to_string()),
            })
            .collect()
    }

    #[test]
    fn first_snapshot_creates_everything() {
        let current = listing(&[("a", 1.0), ("b", 2.0)]);
        let diff = diff_snapshot(&[], &current);
        assert_eq!(diff.counts.created, 2);
        assert_eq!(diff.counts.previous_active, 0);
        assert!(diff.removed.is_empty());
        assert!(diff.counts.is_conserved());
    }

    #[test]
    fn unchanged_listing_is_idempotent() {
        let current = listing(&[("a", 1.0), ("b", 2.0), ("c", 4.0)]);
        let previous = tracked(&current);
        let diff = diff_snapshot(&previous, &listing(&[("a", 1.0), ("b", 2.0), ("c", 4.0)]));

        assert_eq!(
            diff.counts,
            ChangeCounts {
                found: 3,
                created: 0,
                updated: 0,
                unchanged: 3,
                removed: 0,
                previous_active: 3,
            }
        );
        assert!(diff.changes.iter().all(|c| c.previous_id.is_some()));
    }

    #[test]
    fn mixed_changes_are_conserved() {
        let previous = tracked(&listing(&[("a", 1.0), ("b", 2.0), ("c", 4.0)]));
        let current = listing(&[("a", 1.0), ("b", 8.0), ("d", 2.0)]);
        let diff = diff_snapshot(&previous, &current);

        assert_eq!(diff.counts.created, 1);
        assert_eq!(diff.counts.updated, 1);
        assert_eq!(diff.counts.unchanged, 1);
        assert_eq!(diff.counts.removed, 1);
        assert_eq!(diff.removed[0].native_id, "c");
        assert!(diff.counts.is_conserved());
    }

    #[test]
    fn cost_source_change_counts_as_update() {
        let current = listing(&[("a", 1.0)]);
        let mut previous = tracked(&current);
        previous[0].cost_source = Some("documented_fallback".into());
        let diff = diff_snapshot(&previous, &current);
        assert_eq!(diff.changes[0].change, ChangeKind::Updated);
    }

    #[test]
    fn stored_scale_does_not_cause_updates() {
        let current = listing(&[("a", 1.0)]);
        let mut previous = tracked(&current);
        previous[0].daily_cost = previous[0].daily_cost.round_dp(6);
        let diff = diff_snapshot(&previous, &current);
        assert_eq!(diff.changes[0].change, ChangeKind::Unchanged);
    }
}
