//! Snapshot repository
//!
//! A snapshot row is inserted as `running` when a connection sync starts. It
//! is then either finalized together with every resource write in one
//! transaction, or marked `error` without any resource state. Readers only
//! look at finalized rows.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    provider_connection, resource, resource_state,
    snapshot::{self, Entity as Snapshot},
};
use crate::pricing::PricedResource;
use crate::providers::SyncError;
use crate::tracker::{ChangeKind, SnapshotDiff, TrackedResource};

/// Tag written on resources no pricing tier could price
pub const TAG_PRICING_UNRESOLVED: &str = "pricing_unresolved";
/// Tag naming the pricing tier that produced the cost
pub const TAG_COST_SOURCE: &str = "cost_source";

/// Everything needed to finalize a snapshot
#[derive(Debug)]
pub struct CompletedSnapshot<'a> {
    pub snapshot_id: Uuid,
    pub connection: &'a provider_connection::Model,
    pub priced: &'a [PricedResource],
    pub diff: &'a SnapshotDiff,
    /// `success` or `partial`
    pub status: &'a str,
    pub discovery: Value,
    pub completed_at: DateTime<Utc>,
}

/// Repository for snapshot database operations
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

fn count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn stored_tags(priced: &PricedResource) -> BTreeMap<String, String> {
    let mut tags = priced.resource.tags.clone();
    match priced.cost.cost_source {
        Some(source) => {
            tags.insert(TAG_COST_SOURCE.to_string(), source.as_str().to_string());
        }
        None => {
            tags.insert(TAG_PRICING_UNRESOLVED.to_string(), "true".to_string());
        }
    }
    tags
}

/// Copy normalized attributes and cost onto a resource row.
fn apply_attributes(
    row: &mut resource::ActiveModel,
    priced: &PricedResource,
    snapshot_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let resource = &priced.resource;
    row.name = Set(resource.name.clone());
    row.region = Set(resource.region.clone());
    row.status = Set(resource.status.as_str().to_string());
    row.capacity = Set(Some(serde_json::to_value(&resource.capacity)?));
    row.tags = Set(Some(serde_json::to_value(stored_tags(priced))?));
    row.extra = Set(Some(serde_json::to_value(&resource.extra)?));
    row.attached_volumes = Set(Some(serde_json::to_value(&resource.attached_volumes)?));
    row.fingerprint = Set(priced.fingerprint.clone());
    row.daily_cost = Set(priced.cost.daily_cost);
    row.monthly_cost = Set(priced.cost.monthly_projection);
    row.currency = Set(priced.cost.currency.clone());
    row.cost_source = Set(priced.cost.cost_source.map(|s| s.as_str().to_string()));
    row.pricing_unresolved = Set(priced.cost.pricing_unresolved());
    row.is_orphan = Set(resource.is_orphan);
    row.is_active = Set(true);
    row.last_seen_at = Set(now.into());
    row.deactivated_at = Set(None);
    row.last_snapshot_id = Set(Some(snapshot_id));
    Ok(())
}

impl SnapshotRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a `running` snapshot for a connection
    pub async fn start(
        &self,
        connection: &provider_connection::Model,
        complete_sync_run_id: Option<Uuid>,
    ) -> Result<snapshot::Model> {
        let snapshot = snapshot::ActiveModel {
            id: Set(Uuid::new_v4()),
            connection_id: Set(connection.id),
            account_id: Set(connection.account_id),
            provider_slug: Set(connection.provider_slug.clone()),
            complete_sync_run_id: Set(complete_sync_run_id),
            status: Set(snapshot::STATUS_RUNNING.to_string()),
            phase: Set("pending".to_string()),
            started_at: Set(Utc::now().into()),
            completed_at: Set(None),
            found_count: Set(0),
            total_daily_cost: Set(Decimal::ZERO),
            total_monthly_cost: Set(Decimal::ZERO),
            created_count: Set(0),
            updated_count: Set(0),
            unchanged_count: Set(0),
            removed_count: Set(0),
            discovery: Set(None),
            error: Set(None),
        };
        Ok(snapshot.insert(&*self.db).await?)
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<snapshot::Model>> {
        Ok(Snapshot::find_by_id(*id).one(&*self.db).await?)
    }

    /// Writes resources, resource states and the finalized snapshot atomically.
    ///
    /// Rows are matched by `(connection_id, resource_type, native_id)`,
    /// inactive rows included, so a resource that comes back reuses its row.
    pub async fn persist_completed(&self, completed: CompletedSnapshot<'_>) -> Result<snapshot::Model> {
        // Dropping the transaction on error rolls every write back
        let txn = self.db.begin().await?;
        let finalized = Self::write_completed(&txn, &completed).await?;
        txn.commit().await?;
        Ok(finalized)
    }

    async fn write_completed(
        txn: &DatabaseTransaction,
        completed: &CompletedSnapshot<'_>,
    ) -> Result<snapshot::Model> {
        let now = completed.completed_at;
        let snapshot_id = completed.snapshot_id;
        let connection = completed.connection;

        for change in &completed.diff.changes {
            let priced = completed
                .priced
                .get(change.index)
                .ok_or_else(|| anyhow!("diff references resource #{} outside the listing", change.index))?;

            let existing = match change.previous_id {
                Some(id) => resource::Entity::find_by_id(id).one(txn).await?,
                None => {
                    resource::Entity::find()
                        .filter(resource::Column::ConnectionId.eq(connection.id))
                        .filter(
                            resource::Column::ResourceType
                                .eq(priced.resource.resource_type.as_str()),
                        )
                        .filter(resource::Column::NativeId.eq(priced.resource.native_id.as_str()))
                        .one(txn)
                        .await?
                }
            };

            let resource_id = match existing {
                Some(model) => {
                    let id = model.id;
                    let mut row: resource::ActiveModel = model.into();
                    apply_attributes(&mut row, priced, snapshot_id, now)?;
                    row.update(txn).await?;
                    id
                }
                None => {
                    let id = Uuid::new_v4();
                    let mut row = resource::ActiveModel {
                        id: Set(id),
                        connection_id: Set(connection.id),
                        account_id: Set(connection.account_id),
                        provider_slug: Set(connection.provider_slug.clone()),
                        resource_type: Set(priced.resource.resource_type.as_str().to_string()),
                        native_id: Set(priced.resource.native_id.clone()),
                        first_seen_at: Set(now.into()),
                        ..Default::default()
                    };
                    apply_attributes(&mut row, priced, snapshot_id, now)?;
                    row.insert(txn).await?;
                    id
                }
            };

            resource_state::ActiveModel {
                id: Set(Uuid::new_v4()),
                snapshot_id: Set(snapshot_id),
                resource_id: Set(resource_id),
                change: Set(change.change.as_str().to_string()),
                status: Set(priced.resource.status.as_str().to_string()),
                daily_cost: Set(priced.cost.daily_cost),
                monthly_cost: Set(priced.cost.monthly_projection),
                cost_source: Set(priced.cost.cost_source.map(|s| s.as_str().to_string())),
                fingerprint: Set(priced.fingerprint.clone()),
                recorded_at: Set(now.into()),
            }
            .insert(txn)
            .await?;
        }

        for removed in &completed.diff.removed {
            Self::deactivate(txn, removed, snapshot_id, now).await?;
        }

        let (total_daily, total_monthly) = completed.priced.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(daily, monthly), p| {
                (
                    daily + p.cost.daily_cost,
                    monthly + p.cost.monthly_projection,
                )
            },
        );
        let counts = completed.diff.counts;

        let existing = Snapshot::find_by_id(snapshot_id)
            .one(txn)
            .await?
            .ok_or_else(|| anyhow!("snapshot {} not found", snapshot_id))?;
        let mut row: snapshot::ActiveModel = existing.into();
        row.status = Set(completed.status.to_string());
        row.phase = Set("completed".to_string());
        row.completed_at = Set(Some(now.into()));
        row.found_count = Set(count(counts.found));
        row.created_count = Set(count(counts.created));
        row.updated_count = Set(count(counts.updated));
        row.unchanged_count = Set(count(counts.unchanged));
        row.removed_count = Set(count(counts.removed));
        row.total_daily_cost = Set(total_daily);
        row.total_monthly_cost = Set(total_monthly);
        row.discovery = Set(Some(completed.discovery.clone()));
        let finalized = row.update(txn).await?;

        let connection_row = provider_connection::Entity::find_by_id(connection.id)
            .one(txn)
            .await?
            .ok_or_else(|| anyhow!("connection {} not found", connection.id))?;
        let mut connection_row: provider_connection::ActiveModel = connection_row.into();
        connection_row.last_synced_at = Set(Some(now.into()));
        connection_row.update(txn).await?;

        Ok(finalized)
    }

    /// Marks a resource inactive and records its last known cost as `removed`.
    async fn deactivate(
        txn: &DatabaseTransaction,
        removed: &TrackedResource,
        snapshot_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let model = resource::Entity::find_by_id(removed.id)
            .one(txn)
            .await?
            .with_context(|| format!("resource {} vanished during snapshot", removed.id))?;
        let mut row: resource::ActiveModel = model.into();
        row.is_active = Set(false);
        row.deactivated_at = Set(Some(now.into()));
        row.last_snapshot_id = Set(Some(snapshot_id));
        row.update(txn).await?;

        resource_state::ActiveModel {
            id: Set(Uuid::new_v4()),
            snapshot_id: Set(snapshot_id),
            resource_id: Set(removed.id),
            change: Set(ChangeKind::Removed.as_str().to_string()),
            status: Set(removed.status.clone()),
            daily_cost: Set(removed.daily_cost),
            monthly_cost: Set(removed.monthly_cost),
            cost_source: Set(removed.cost_source.clone()),
            fingerprint: Set(removed.fingerprint.clone()),
            recorded_at: Set(now.into()),
        }
        .insert(txn)
        .await?;
        Ok(())
    }

    /// Marks a snapshot `error`; no resource state is written
    pub async fn mark_failed(
        &self,
        snapshot_id: &Uuid,
        phase: &str,
        error: &SyncError,
        discovery: Option<Value>,
    ) -> Result<snapshot::Model> {
        let existing = self
            .get_by_id(snapshot_id)
            .await?
            .ok_or_else(|| anyhow!("snapshot {} not found", snapshot_id))?;
        let mut row: snapshot::ActiveModel = existing.into();
        row.status = Set(snapshot::STATUS_ERROR.to_string());
        row.phase = Set(phase.to_string());
        row.completed_at = Set(Some(Utc::now().into()));
        row.error = Set(Some(serde_json::to_value(error)?));
        row.discovery = Set(discovery);
        Ok(row.update(&*self.db).await?)
    }

    /// Latest finalized (`success` or `partial`) snapshot of a connection
    pub async fn latest_completed(&self, connection_id: &Uuid) -> Result<Option<snapshot::Model>> {
        Ok(Snapshot::find()
            .filter(snapshot::Column::ConnectionId.eq(*connection_id))
            .filter(
                snapshot::Column::Status
                    .is_in([snapshot::STATUS_SUCCESS, snapshot::STATUS_PARTIAL]),
            )
            .order_by_desc(snapshot::Column::CompletedAt)
            .order_by_desc(snapshot::Column::StartedAt)
            .one(&*self.db)
            .await?)
    }

    /// Finalized snapshots of a connection, newest first
    pub async fn list_completed(
        &self,
        connection_id: &Uuid,
        limit: u64,
    ) -> Result<Vec<snapshot::Model>> {
        Ok(Snapshot::find()
            .filter(snapshot::Column::ConnectionId.eq(*connection_id))
            .filter(
                snapshot::Column::Status
                    .is_in([snapshot::STATUS_SUCCESS, snapshot::STATUS_PARTIAL]),
            )
            .order_by_desc(snapshot::Column::CompletedAt)
            .order_by_desc(snapshot::Column::StartedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Resource states recorded in one snapshot
    pub async fn states(&self, snapshot_id: &Uuid) -> Result<Vec<resource_state::Model>> {
        Ok(resource_state::Entity::find()
            .filter(resource_state::Column::SnapshotId.eq(*snapshot_id))
            .order_by_asc(resource_state::Column::RecordedAt)
            .order_by_asc(resource_state::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
