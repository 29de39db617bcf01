//! # Bulk-Sync Coordinator
//!
//! Runs a complete sync for every eligible account, strictly one account at a
//! time, and records a per-account result. Skipped accounts are reported
//! separately and never count as failures.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::complete_sync::{CompleteSyncAggregator, RunStatus, SyncTrigger};
use crate::models::{account, bulk_sync_run};
use crate::providers::SyncError;
use crate::repositories::{AccountRepository, BulkSyncRunRecord, SyncRunRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl AccountOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            AccountOutcome::Succeeded => "succeeded",
            AccountOutcome::Failed => "failed",
            AccountOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    Demo,
    NoEligibleConnections,
}

/// Result of one account within a bulk run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResult {
    pub account_id: Uuid,
    pub account_name: String,
    pub outcome: AccountOutcome,
    /// Status of the account's complete-sync run, when one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_sync_run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<SyncError>,
}

impl AccountResult {
    fn skipped(account: &account::Model, reason: SkipReason) -> Self {
        Self {
            account_id: account.id,
            account_name: account.name.clone(),
            outcome: AccountOutcome::Skipped,
            run_status: None,
            complete_sync_run_id: None,
            skip_reason: Some(reason),
            error: None,
        }
    }

    fn failed(account: &account::Model, error: SyncError) -> Self {
        Self {
            account_id: account.id,
            account_name: account.name.clone(),
            outcome: AccountOutcome::Failed,
            run_status: None,
            complete_sync_run_id: None,
            skip_reason: None,
            error: Some(error),
        }
    }
}

/// Structured result of one bulk-sync run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkSyncOutcome {
    pub run_id: Uuid,
    pub trigger: SyncTrigger,
    pub status: RunStatus,
    pub total_accounts: usize,
    /// Accounts whose run ended `success` or `partial`
    pub succeeded: usize,
    /// Subset of `succeeded` whose run ended `partial`
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub accounts: Vec<AccountResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<SyncError>,
    pub duration_ms: u64,
}

impl BulkSyncOutcome {
    pub fn failed_accounts(&self) -> impl Iterator<Item = &AccountResult> {
        self.accounts
            .iter()
            .filter(|a| a.outcome == AccountOutcome::Failed)
    }
}

/// `error` only when some account failed and none succeeded
fn bulk_status(succeeded: usize, failed: usize, cancelled: bool) -> RunStatus {
    if cancelled {
        return RunStatus::Error;
    }
    match (succeeded, failed) {
        (_, 0) => RunStatus::Success,
        (0, _) => RunStatus::Error,
        _ => RunStatus::Partial,
    }
}

#[derive(Clone)]
pub struct BulkSyncCoordinator {
    aggregator: CompleteSyncAggregator,
    accounts: AccountRepository,
    runs: SyncRunRepository,
}

impl BulkSyncCoordinator {
    pub fn new(db: Arc<DatabaseConnection>, aggregator: CompleteSyncAggregator) -> Self {
        Self {
            aggregator,
            accounts: AccountRepository::new(db.clone()),
            runs: SyncRunRepository::new(db),
        }
    }

    /// Run a complete sync for every eligible account.
    ///
    /// Only a storage failure on the bulk run record or the account listing
    /// is returned as an error, after the run row is closed as `error`.
    /// Everything else lands in the per-account results.
    #[instrument(skip(self, cancel), fields(trigger = trigger.as_str(), bulk_run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> anyhow::Result<BulkSyncOutcome> {
        let started = Instant::now();
        let run = self.runs.start_bulk(trigger.as_str()).await?;
        tracing::Span::current().record("bulk_run_id", tracing::field::display(run.id));

        match self.execute(&run, trigger, started, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!("Bulk sync aborted: {:#}", err);
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                if let Err(mark_err) = self
                    .runs
                    .fail_bulk(&run.id, duration_ms, &format!("{err:#}"))
                    .await
                {
                    error!("Could not close aborted bulk sync run: {:#}", mark_err);
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run: &bulk_sync_run::Model,
        trigger: SyncTrigger,
        started: Instant,
        cancel: &CancellationToken,
    ) -> anyhow::Result<BulkSyncOutcome> {
        let accounts = self.accounts.list_all().await?;
        info!(accounts = accounts.len(), "Bulk sync started");

        let mut results = Vec::with_capacity(accounts.len());
        let mut cancelled = false;

        for account in &accounts {
            if cancel.is_cancelled() {
                warn!(
                    remaining = accounts.len() - results.len(),
                    "Bulk sync cancelled between accounts"
                );
                cancelled = true;
                break;
            }

            let result = self.sync_account(account, run.id, cancel).await;
            counter!(
                "bulk_sync_accounts_total",
                &[("outcome", result.outcome.as_str().to_string())]
            )
            .increment(1);
            results.push(result);
        }

        let count = |outcome: AccountOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        let succeeded = count(AccountOutcome::Succeeded);
        let failed = count(AccountOutcome::Failed);
        let skipped = count(AccountOutcome::Skipped);
        let partial = results
            .iter()
            .filter(|r| r.run_status == Some(RunStatus::Partial))
            .count();
        let status = bulk_status(succeeded, failed, cancelled);

        let outcome = BulkSyncOutcome {
            run_id: run.id,
            trigger,
            status,
            total_accounts: accounts.len(),
            succeeded,
            partial,
            failed,
            skipped,
            accounts: results,
            error: cancelled.then(|| SyncError::cancelled("cancelled")),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        self.runs
            .finish_bulk(
                &run.id,
                BulkSyncRunRecord {
                    status: status.as_str().to_string(),
                    completed_at: Utc::now(),
                    duration_ms: outcome.duration_ms,
                    total_accounts: outcome.total_accounts,
                    succeeded,
                    partial,
                    failed,
                    skipped,
                    account_results: serde_json::to_value(&outcome.accounts)?,
                },
            )
            .await?;

        info!(
            status = status.as_str(),
            total_accounts = outcome.total_accounts,
            succeeded,
            partial,
            failed,
            skipped,
            duration_ms = outcome.duration_ms,
            "Bulk sync finished"
        );
        Ok(outcome)
    }

    async fn sync_account(
        &self,
        account: &account::Model,
        bulk_run_id: Uuid,
        cancel: &CancellationToken,
    ) -> AccountResult {
        if account.status != account::STATUS_ACTIVE {
            return AccountResult::skipped(account, SkipReason::Inactive);
        }
        if account.is_demo {
            return AccountResult::skipped(account, SkipReason::Demo);
        }

        match self
            .aggregator
            .orchestrator()
            .connections()
            .list_included(&account.id)
            .await
        {
            Ok(connections) if connections.is_empty() => {
                return AccountResult::skipped(account, SkipReason::NoEligibleConnections);
            }
            Ok(_) => {}
            Err(e) => {
                error!(account_id = %account.id, "Could not load connections: {:#}", e);
                return AccountResult::failed(
                    account,
                    SyncError::permanent(format!("could not load connections: {e}")),
                );
            }
        }

        match self
            .aggregator
            .run_for_account(account, SyncTrigger::Bulk, Some(bulk_run_id), cancel)
            .await
        {
            Ok(run) => {
                let outcome = match run.status {
                    RunStatus::Success | RunStatus::Partial => AccountOutcome::Succeeded,
                    RunStatus::Error => AccountOutcome::Failed,
                };
                let error = match run.status {
                    RunStatus::Error => run.error.clone().or_else(|| {
                        Some(SyncError::permanent(format!(
                            "all {} connections failed",
                            run.failed
                        )))
                    }),
                    _ => None,
                };
                AccountResult {
                    account_id: account.id,
                    account_name: account.name.clone(),
                    outcome,
                    run_status: Some(run.status),
                    complete_sync_run_id: Some(run.run_id),
                    skip_reason: None,
                    error,
                }
            }
            Err(e) => {
                error!(account_id = %account.id, "Complete sync could not run: {:#}", e);
                AccountResult::failed(account, SyncError::permanent(e.to_string()))
            }
        }
    }
}
