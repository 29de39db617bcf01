//! # Read API Handlers
//!
//! Read-only views of what the sync core persisted: complete-sync runs,
//! finalized snapshots with their resource states, tracked resources and
//! the registered providers. In-progress snapshots are never listed.

use axum::{
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::{complete_sync_run, resource, resource_state, snapshot};
use crate::providers::ProviderMetadata;
use crate::repositories::{
    AccountRepository, ConnectionRepository, ResourceRepository, SnapshotRepository,
    SyncRunRepository,
};
use crate::server::AppState;

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct LimitQuery {
    /// Maximum number of records to return (default: 20, max: 100)
    pub limit: Option<u64>,
}

impl LimitQuery {
    fn resolve(&self) -> Result<u64, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(validation_error(
                "Invalid query parameter",
                serde_json::json!({ "limit": "must be between 1 and 100" }),
            ));
        }
        Ok(limit)
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ResourcesQuery {
    /// Also return resources no longer present at the provider
    #[serde(default)]
    pub include_inactive: bool,
}

/// Persisted complete-sync run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunInfo {
    pub id: Uuid,
    pub account_id: Uuid,
    pub bulk_sync_run_id: Option<Uuid>,
    pub trigger: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_resources: i32,
    pub total_daily_cost: Decimal,
    pub total_monthly_cost: Decimal,
    #[schema(value_type = Option<Object>)]
    pub cost_by_provider: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub resources_by_provider: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub connection_results: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub errors: Option<serde_json::Value>,
}

impl From<complete_sync_run::Model> for SyncRunInfo {
    fn from(run: complete_sync_run::Model) -> Self {
        Self {
            id: run.id,
            account_id: run.account_id,
            bulk_sync_run_id: run.bulk_sync_run_id,
            trigger: run.trigger,
            status: run.status,
            started_at: run.started_at.with_timezone(&Utc),
            completed_at: run.completed_at.map(|at| at.with_timezone(&Utc)),
            total_resources: run.total_resources,
            total_daily_cost: run.total_daily_cost,
            total_monthly_cost: run.total_monthly_cost,
            cost_by_provider: run.cost_by_provider,
            resources_by_provider: run.resources_by_provider,
            connection_results: run.connection_results,
            errors: run.errors,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotCounts {
    pub found: i32,
    pub created: i32,
    pub updated: i32,
    pub unchanged: i32,
    pub removed: i32,
}

/// Finalized snapshot of one connection
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotInfo {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub provider_slug: String,
    pub complete_sync_run_id: Option<Uuid>,
    pub status: String,
    pub phase: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: SnapshotCounts,
    pub total_daily_cost: Decimal,
    pub total_monthly_cost: Decimal,
    #[schema(value_type = Option<Object>)]
    pub discovery: Option<serde_json::Value>,
}

impl From<snapshot::Model> for SnapshotInfo {
    fn from(s: snapshot::Model) -> Self {
        Self {
            id: s.id,
            connection_id: s.connection_id,
            provider_slug: s.provider_slug,
            complete_sync_run_id: s.complete_sync_run_id,
            status: s.status,
            phase: s.phase,
            started_at: s.started_at.with_timezone(&Utc),
            completed_at: s.completed_at.map(|at| at.with_timezone(&Utc)),
            counts: SnapshotCounts {
                found: s.found_count,
                created: s.created_count,
                updated: s.updated_count,
                unchanged: s.unchanged_count,
                removed: s.removed_count,
            },
            total_daily_cost: s.total_daily_cost,
            total_monthly_cost: s.total_monthly_cost,
            discovery: s.discovery,
        }
    }
}

/// How one resource was classified in a snapshot
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResourceStateInfo {
    pub resource_id: Uuid,
    pub change: String,
    pub status: String,
    pub daily_cost: Decimal,
    pub monthly_cost: Decimal,
    pub cost_source: Option<String>,
}

impl From<resource_state::Model> for ResourceStateInfo {
    fn from(state: resource_state::Model) -> Self {
        Self {
            resource_id: state.resource_id,
            change: state.change,
            status: state.status,
            daily_cost: state.daily_cost,
            monthly_cost: state.monthly_cost,
            cost_source: state.cost_source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotDetail {
    #[serde(flatten)]
    pub snapshot: SnapshotInfo,
    pub states: Vec<ResourceStateInfo>,
}

/// Tracked resource with its current cost
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResourceInfo {
    pub id: Uuid,
    pub provider_slug: String,
    pub resource_type: String,
    pub native_id: String,
    pub name: String,
    pub region: Option<String>,
    pub status: String,
    #[schema(value_type = Option<Object>)]
    pub capacity: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub tags: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub extra: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub attached_volumes: Option<serde_json::Value>,
    pub daily_cost: Decimal,
    pub monthly_cost: Decimal,
    pub currency: String,
    pub cost_source: Option<String>,
    pub pricing_unresolved: bool,
    pub is_orphan: bool,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl From<resource::Model> for ResourceInfo {
    fn from(r: resource::Model) -> Self {
        Self {
            id: r.id,
            provider_slug: r.provider_slug,
            resource_type: r.resource_type,
            native_id: r.native_id,
            name: r.name,
            region: r.region,
            status: r.status,
            capacity: r.capacity,
            tags: r.tags,
            extra: r.extra,
            attached_volumes: r.attached_volumes,
            daily_cost: r.daily_cost,
            monthly_cost: r.monthly_cost,
            currency: r.currency,
            cost_source: r.cost_source,
            pricing_unresolved: r.pricing_unresolved,
            is_orphan: r.is_orphan,
            is_active: r.is_active,
            first_seen_at: r.first_seen_at.with_timezone(&Utc),
            last_seen_at: r.last_seen_at.with_timezone(&Utc),
            deactivated_at: r.deactivated_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// Recent complete-sync runs of an account, newest first
#[utoipa::path(
    get,
    path = "/accounts/{account_id}/sync-runs",
    security(("bearer_auth" = [])),
    params(("account_id" = Uuid, Path, description = "Account"), LimitQuery),
    responses(
        (status = 200, description = "Complete-sync runs", body = Vec<SyncRunInfo>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Account not found", body = ApiError)
    ),
    tag = "reads"
)]
pub async fn list_sync_runs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Vec<SyncRunInfo>>, ApiError> {
    let Path(account_id) = path?;
    let Query(query) = query?;
    let limit = query.resolve()?;

    AccountRepository::new(state.db.clone())
        .get_by_id(&account_id)
        .await?
        .ok_or_else(|| not_found("Account", &account_id.to_string()))?;

    let runs = SyncRunRepository::new(state.db.clone())
        .list_complete_for_account(&account_id, limit)
        .await?;
    Ok(Json(runs.into_iter().map(SyncRunInfo::from).collect()))
}

/// Finalized snapshots of a connection, newest first
#[utoipa::path(
    get,
    path = "/connections/{connection_id}/snapshots",
    security(("bearer_auth" = [])),
    params(("connection_id" = Uuid, Path, description = "Provider connection"), LimitQuery),
    responses(
        (status = 200, description = "Completed snapshots", body = Vec<SnapshotInfo>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "reads"
)]
pub async fn list_snapshots(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Vec<SnapshotInfo>>, ApiError> {
    let Path(connection_id) = path?;
    let Query(query) = query?;
    let limit = query.resolve()?;
    ensure_connection(&state, &connection_id).await?;

    let snapshots = SnapshotRepository::new(state.db.clone())
        .list_completed(&connection_id, limit)
        .await?;
    Ok(Json(snapshots.into_iter().map(SnapshotInfo::from).collect()))
}

/// One finalized snapshot with the per-resource classification
#[utoipa::path(
    get,
    path = "/snapshots/{snapshot_id}",
    security(("bearer_auth" = [])),
    params(("snapshot_id" = Uuid, Path, description = "Snapshot")),
    responses(
        (status = 200, description = "Snapshot with resource states", body = SnapshotDetail),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Snapshot not found or not finalized", body = ApiError)
    ),
    tag = "reads"
)]
pub async fn get_snapshot(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SnapshotDetail>, ApiError> {
    let Path(snapshot_id) = path?;
    let repo = SnapshotRepository::new(state.db.clone());

    // Running snapshots are not visible to readers
    let snapshot = repo
        .get_by_id(&snapshot_id)
        .await?
        .filter(|s| s.status != snapshot::STATUS_RUNNING)
        .ok_or_else(|| not_found("Snapshot", &snapshot_id.to_string()))?;
    let states = repo.states(&snapshot_id).await?;

    Ok(Json(SnapshotDetail {
        snapshot: SnapshotInfo::from(snapshot),
        states: states.into_iter().map(ResourceStateInfo::from).collect(),
    }))
}

/// Resources of a connection ordered by type and native id
#[utoipa::path(
    get,
    path = "/connections/{connection_id}/resources",
    security(("bearer_auth" = [])),
    params(("connection_id" = Uuid, Path, description = "Provider connection"), ResourcesQuery),
    responses(
        (status = 200, description = "Tracked resources", body = Vec<ResourceInfo>),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "reads"
)]
pub async fn list_resources(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ResourcesQuery>, QueryRejection>,
) -> Result<Json<Vec<ResourceInfo>>, ApiError> {
    let Path(connection_id) = path?;
    let Query(query) = query?;
    ensure_connection(&state, &connection_id).await?;

    let resources = ResourceRepository::new(state.db.clone())
        .list_for_connection(&connection_id, query.include_inactive)
        .await?;
    Ok(Json(resources.into_iter().map(ResourceInfo::from).collect()))
}

/// Providers this deployment can sync
#[utoipa::path(
    get,
    path = "/providers",
    responses(
        (status = 200, description = "Registered providers", body = Vec<ProviderMetadata>)
    ),
    tag = "reads"
)]
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderMetadata>> {
    Json(state.registry.list_metadata())
}

async fn ensure_connection(state: &AppState, connection_id: &Uuid) -> Result<(), ApiError> {
    let repo = ConnectionRepository::new(state.db.clone(), state.crypto_key.clone());
    repo.get_by_id(connection_id)
        .await?
        .ok_or_else(|| not_found("Connection", &connection_id.to_string()))?;
    Ok(())
}
