//! # Complete-Sync Aggregator
//!
//! Synchronizes every included connection of one account, one at a time in
//! connection creation order, and aggregates cost and resource counts across
//! them. A failed connection never aborts the run; its previous snapshot is
//! carried into the aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{account, complete_sync_run};
use crate::pricing::round_cost;
use crate::providers::SyncError;
use crate::repositories::{
    AccountRepository, CompleteSyncRunRecord, ResourceTotals, SyncRunRepository,
};
use crate::sync_orchestrator::{SnapshotOutcome, SnapshotStatus, SyncOrchestrator};
use crate::tracker::ChangeCounts;

/// Run-level status shared by complete-sync runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }

    /// `success` when all succeeded, `partial` on a mix, `error` when none
    /// succeeded or there was nothing to run.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (0, _) => RunStatus::Error,
            (_, 0) => RunStatus::Success,
            _ => RunStatus::Partial,
        }
    }
}

/// What triggered a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    Cli,
    Bulk,
}

impl SyncTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Cli => "cli",
            SyncTrigger::Bulk => "bulk",
        }
    }
}

/// Per-connection entry of a complete-sync run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionResult {
    pub connection_id: Uuid,
    pub provider_slug: String,
    pub snapshot_id: Option<Uuid>,
    pub status: SnapshotStatus,
    pub counts: ChangeCounts,
    /// Active resources counted into the aggregate for this connection
    pub resource_count: usize,
    pub daily_cost: Decimal,
    pub monthly_cost: Decimal,
    /// The aggregate uses the previous completed snapshot for this connection
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carried_snapshot_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<SyncError>,
}

/// Structured result of one complete-sync run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteSyncOutcome {
    pub run_id: Uuid,
    pub account_id: Uuid,
    pub trigger: SyncTrigger,
    pub status: RunStatus,
    pub succeeded: usize,
    pub failed: usize,
    pub total_resources: usize,
    pub total_daily_cost: Decimal,
    pub total_monthly_projection: Decimal,
    pub cost_by_provider: BTreeMap<String, Decimal>,
    pub resources_by_provider: BTreeMap<String, usize>,
    pub connections: Vec<ConnectionResult>,
    /// Run-level failure: no eligible connections or cancellation
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<SyncError>,
    pub duration_ms: u64,
}

impl CompleteSyncOutcome {
    /// Connection-level errors keyed by connection id
    pub fn errors(&self) -> BTreeMap<Uuid, &SyncError> {
        self.connections
            .iter()
            .filter_map(|c| c.error.as_ref().map(|e| (c.connection_id, e)))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum CompleteSyncError {
    #[error("account {0} not found")]
    AccountNotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Default)]
struct Aggregate {
    total_resources: usize,
    total_daily_cost: Decimal,
    total_monthly: Decimal,
    cost_by_provider: BTreeMap<String, Decimal>,
    resources_by_provider: BTreeMap<String, usize>,
}

impl Aggregate {
    fn add(&mut self, provider: &str, totals: &ResourceTotals) {
        self.total_resources += totals.count;
        self.total_daily_cost += totals.daily_cost;
        self.total_monthly += totals.monthly_cost;
        *self
            .cost_by_provider
            .entry(provider.to_string())
            .or_insert(Decimal::ZERO) += totals.daily_cost;
        *self
            .resources_by_provider
            .entry(provider.to_string())
            .or_insert(0) += totals.count;
    }
}

#[derive(Clone)]
pub struct CompleteSyncAggregator {
    orchestrator: SyncOrchestrator,
    accounts: AccountRepository,
    runs: SyncRunRepository,
}

impl CompleteSyncAggregator {
    pub fn new(db: Arc<DatabaseConnection>, orchestrator: SyncOrchestrator) -> Self {
        Self {
            orchestrator,
            accounts: AccountRepository::new(db.clone()),
            runs: SyncRunRepository::new(db),
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Synchronize all included connections of an account.
    ///
    /// A storage failure after the run row exists closes the row as
    /// `error` before it is returned.
    pub async fn run(
        &self,
        account_id: Uuid,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> Result<CompleteSyncOutcome, CompleteSyncError> {
        let account = self
            .accounts
            .get_by_id(&account_id)
            .await?
            .ok_or(CompleteSyncError::AccountNotFound(account_id))?;
        self.run_for_account(&account, trigger, None, cancel).await
    }

    #[instrument(
        skip(self, account, cancel),
        fields(account_id = %account.id, trigger = trigger.as_str(), run_id = tracing::field::Empty)
    )]
    pub(crate) async fn run_for_account(
        &self,
        account: &account::Model,
        trigger: SyncTrigger,
        bulk_sync_run_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<CompleteSyncOutcome, CompleteSyncError> {
        let started = Instant::now();
        let run = self
            .runs
            .start_complete(&account.id, trigger.as_str(), bulk_sync_run_id)
            .await?;
        tracing::Span::current().record("run_id", tracing::field::display(run.id));

        match self.execute(account, &run, trigger, started, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!("Complete sync aborted: {:#}", err);
                counter!("complete_sync_total", &[("status", RunStatus::Error.as_str().to_string())])
                    .increment(1);
                if let Err(mark_err) = self.runs.fail_complete(&run.id, &format!("{err:#}")).await {
                    error!("Could not close aborted complete sync run: {:#}", mark_err);
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        account: &account::Model,
        run: &complete_sync_run::Model,
        trigger: SyncTrigger,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<CompleteSyncOutcome, CompleteSyncError> {
        let connections = self
            .orchestrator
            .connections()
            .list_included(&account.id)
            .await?;
        info!(connections = connections.len(), "Complete sync started");

        let mut results = Vec::with_capacity(connections.len());
        let mut aggregate = Aggregate::default();
        let mut run_error = None;

        if connections.is_empty() {
            run_error = Some(SyncError::permanent(
                "account has no connections included in complete sync",
            ));
        }

        for connection in &connections {
            if cancel.is_cancelled() {
                warn!(
                    remaining = connections.len() - results.len(),
                    "Complete sync cancelled between connections"
                );
                run_error = Some(SyncError::cancelled("cancelled"));
                break;
            }

            let outcome = self.orchestrator.sync_connection(connection, Some(run.id)).await;
            let result = self.connection_result(outcome).await?;
            aggregate.add(&result.provider_slug, &ResourceTotals {
                count: result.resource_count,
                daily_cost: result.daily_cost,
                monthly_cost: result.monthly_cost,
            });
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.error.is_none()).count();
        let failed = results.len() - succeeded;
        let status = match run_error {
            Some(_) => RunStatus::Error,
            None => RunStatus::from_counts(succeeded, failed),
        };

        let outcome = CompleteSyncOutcome {
            run_id: run.id,
            account_id: account.id,
            trigger,
            status,
            succeeded,
            failed,
            total_resources: aggregate.total_resources,
            total_daily_cost: round_cost(aggregate.total_daily_cost),
            total_monthly_projection: round_cost(aggregate.total_monthly),
            cost_by_provider: aggregate.cost_by_provider,
            resources_by_provider: aggregate.resources_by_provider,
            connections: results,
            error: run_error,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        self.persist(run, &outcome).await?;
        counter!("complete_sync_total", &[("status", status.as_str().to_string())]).increment(1);
        info!(
            status = status.as_str(),
            succeeded,
            failed,
            total_resources = outcome.total_resources,
            total_daily_cost = %outcome.total_daily_cost,
            duration_ms = outcome.duration_ms,
            "Complete sync finished"
        );

        Ok(outcome)
    }

    /// Attach the figures counted into the aggregate. Failed connections keep
    /// their active resources from the last completed snapshot.
    async fn connection_result(
        &self,
        outcome: SnapshotOutcome,
    ) -> Result<ConnectionResult, CompleteSyncError> {
        let totals = self
            .orchestrator
            .resources()
            .active_totals(&outcome.connection_id)
            .await?;

        let carried_snapshot_id = if outcome.is_completed() {
            None
        } else {
            self.orchestrator
                .snapshots()
                .latest_completed(&outcome.connection_id)
                .await?
                .map(|s| s.id)
        };

        Ok(ConnectionResult {
            connection_id: outcome.connection_id,
            provider_slug: outcome.provider_slug,
            snapshot_id: outcome.snapshot_id,
            status: outcome.status,
            counts: outcome.counts,
            resource_count: totals.count,
            daily_cost: totals.daily_cost,
            monthly_cost: totals.monthly_cost,
            stale: carried_snapshot_id.is_some(),
            carried_snapshot_id,
            error: outcome.error,
        })
    }

    async fn persist(
        &self,
        run: &complete_sync_run::Model,
        outcome: &CompleteSyncOutcome,
    ) -> anyhow::Result<()> {
        let mut errors: Vec<serde_json::Value> = outcome
            .connections
            .iter()
            .filter_map(|c| {
                c.error.as_ref().map(|e| {
                    serde_json::json!({
                        "connection_id": c.connection_id,
                        "provider_slug": c.provider_slug,
                        "error": e,
                    })
                })
            })
            .collect();
        if let Some(run_error) = &outcome.error {
            errors.push(serde_json::json!({ "error": run_error }));
        }

        self.runs
            .finish_complete(
                &run.id,
                CompleteSyncRunRecord {
                    status: outcome.status.as_str().to_string(),
                    completed_at: Utc::now(),
                    total_resources: outcome.total_resources,
                    total_daily_cost: outcome.total_daily_cost,
                    total_monthly_cost: outcome.total_monthly_projection,
                    cost_by_provider: serde_json::to_value(&outcome.cost_by_provider)?,
                    resources_by_provider: serde_json::to_value(&outcome.resources_by_provider)?,
                    connection_results: serde_json::to_value(&outcome.connections)?,
                    errors: (!errors.is_empty()).then(|| serde_json::Value::Array(errors)),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_follows_connection_results() {
        assert_eq!(RunStatus::from_counts(3, 0), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(2, 1), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(0, 2), RunStatus::Error);
        assert_eq!(RunStatus::from_counts(0, 0), RunStatus::Error);
    }

    #[test]
    fn aggregate_sums_connections_of_same_provider() {
        let mut aggregate = Aggregate::default();
        aggregate.add("yandex", &ResourceTotals {
            count: 2,
            daily_cost: Decimal::new(1000, 2),
            monthly_cost: Decimal::new(30000, 2),
        });
        aggregate.add("yandex", &ResourceTotals {
            count: 1,
            daily_cost: Decimal::new(550, 2),
            monthly_cost: Decimal::new(16500, 2),
        });
        aggregate.add("selectel", &ResourceTotals {
            count: 1,
            daily_cost: Decimal::new(2000, 2),
            monthly_cost: Decimal::new(60000, 2),
        });

        assert_eq!(aggregate.total_resources, 4);
        assert_eq!(aggregate.total_daily_cost, Decimal::new(3550, 2));
        assert_eq!(aggregate.cost_by_provider["yandex"], Decimal::new(1550, 2));
        assert_eq!(aggregate.resources_by_provider["selectel"], 1);
    }
}
