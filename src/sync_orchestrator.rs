//! Sync Orchestrator
//!
//! Drives one provider connection through
//! `Pending → Fetching → Normalizing → Pricing → Diffing → Persisted`, ending
//! in `Completed` or `Failed`. Transient provider failures are retried once
//! with backoff. Nothing of a failed run becomes visible: resource writes
//! happen only in the final snapshot transaction.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;
use tracing::{Span, debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{AppConfig, EffectiveRetryPolicy, RetryPolicyConfig};
use crate::crypto::CryptoKey;
use crate::models::{provider_connection, snapshot};
use crate::normalization::{NormalizedBatch, RejectedRecord, normalize_batch};
use crate::pricing::{BillingIndex, CostSource, PricedResource, PricingResolver, RateTables};
use crate::providers::{
    BillingRecords, ConnectionContext, NativeRecord, ProviderAdapter, ProviderError, Registry,
    SyncError,
};
use crate::repositories::{
    CompletedSnapshot, ConnectionRepository, PriceCatalogRepository, ResourceRepository,
    SnapshotRepository,
};
use crate::tracker::{ChangeCounts, TrackedResource, diff_snapshot};

/// Rejected records listed individually in the discovery metadata
const MAX_REPORTED_REJECTIONS: usize = 20;

/// Orchestrator state of one connection sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Pending,
    Fetching,
    Normalizing,
    Pricing,
    Diffing,
    Persisted,
    Completed,
    Failed,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Pending => "pending",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Normalizing => "normalizing",
            SyncPhase::Pricing => "pricing",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Persisted => "persisted",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Success,
    /// Completed without authoritative billing because the billing call failed
    Partial,
    Error,
}

impl SnapshotStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Success => snapshot::STATUS_SUCCESS,
            SnapshotStatus::Partial => snapshot::STATUS_PARTIAL,
            SnapshotStatus::Error => snapshot::STATUS_ERROR,
        }
    }

    pub fn is_completed(self) -> bool {
        !matches!(self, SnapshotStatus::Error)
    }
}

/// How the billing listing went for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BillingAvailability {
    Supported,
    NotSupported,
    Failed,
}

/// Structured result of one connection sync
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SnapshotOutcome {
    pub connection_id: Uuid,
    pub account_id: Uuid,
    pub provider_slug: String,
    /// `None` only when the snapshot row itself could not be written
    pub snapshot_id: Option<Uuid>,
    pub status: SnapshotStatus,
    /// Last phase reached; for failures, the phase that failed
    pub phase: SyncPhase,
    pub counts: ChangeCounts,
    pub total_daily_cost: Decimal,
    pub total_monthly_cost: Decimal,
    pub pricing_unresolved: usize,
    pub rejected_records: usize,
    pub billing: Option<BillingAvailability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<SyncError>,
    pub duration_ms: u64,
}

impl SnapshotOutcome {
    fn failed(
        connection: &provider_connection::Model,
        snapshot_id: Option<Uuid>,
        phase: SyncPhase,
        error: SyncError,
    ) -> Self {
        Self {
            connection_id: connection.id,
            account_id: connection.account_id,
            provider_slug: connection.provider_slug.clone(),
            snapshot_id,
            status: SnapshotStatus::Error,
            phase,
            counts: ChangeCounts::default(),
            total_daily_cost: Decimal::ZERO,
            total_monthly_cost: Decimal::ZERO,
            pricing_unresolved: 0,
            rejected_records: 0,
            billing: None,
            error: Some(error),
            duration_ms: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

/// Compute the wait before the single retry of a provider call.
///
/// Exponential in `attempts_completed`, capped at `max_seconds`; a provider
/// `Retry-After` raises the wait up to the same cap. Jitter is added on top.
pub fn calculate_backoff(
    policy: &EffectiveRetryPolicy,
    error: &ProviderError,
    attempts_completed: i32,
) -> Duration {
    let max_seconds = policy.max_seconds as f64;
    let mut backoff = (policy.base_seconds as f64 * 2_f64.powi(attempts_completed)).min(max_seconds);

    if let ProviderError::RateLimited {
        retry_after: Some(retry_after),
    } = error
    {
        backoff = backoff.max(*retry_after as f64).min(max_seconds);
    }

    let spread = policy.jitter_factor * backoff;
    let jitter = if spread > 0.0 {
        thread_rng().gen_range(0.0..spread)
    } else {
        0.0
    };

    Duration::from_secs_f64(backoff + jitter)
}

struct Fetched {
    records: Vec<NativeRecord>,
    billing: Result<BillingRecords, SyncError>,
}

/// Runs connection syncs. Holds no per-connection state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    registry: Arc<Registry>,
    connections: ConnectionRepository,
    snapshots: SnapshotRepository,
    resources: ResourceRepository,
    catalog: PriceCatalogRepository,
    rates: Arc<RateTables>,
    retry_policy: RetryPolicyConfig,
    fetch_timeout: Duration,
    default_currency: String,
}

impl SyncOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Arc<Registry>,
        crypto_key: CryptoKey,
        config: &AppConfig,
    ) -> Self {
        Self {
            registry,
            connections: ConnectionRepository::new(db.clone(), crypto_key),
            snapshots: SnapshotRepository::new(db.clone()),
            resources: ResourceRepository::new(db.clone()),
            catalog: PriceCatalogRepository::new(db),
            rates: Arc::new(RateTables::builtin()),
            retry_policy: config.retry_policy.clone(),
            fetch_timeout: Duration::from_secs(config.sync.fetch_timeout_seconds),
            default_currency: config.default_currency.clone(),
        }
    }

    /// Replace the built-in derived and fallback rate tables
    pub fn with_rate_tables(mut self, rates: RateTables) -> Self {
        self.rates = Arc::new(rates);
        self
    }

    pub fn connections(&self) -> &ConnectionRepository {
        &self.connections
    }

    pub fn snapshots(&self) -> &SnapshotRepository {
        &self.snapshots
    }

    pub fn resources(&self) -> &ResourceRepository {
        &self.resources
    }

    /// Synchronize one connection and return its structured outcome.
    ///
    /// Never returns an error: failures are recorded on the snapshot and in
    /// the outcome.
    #[instrument(
        skip(self, connection),
        fields(
            account_id = %connection.account_id,
            connection_id = %connection.id,
            provider_slug = %connection.provider_slug,
            snapshot_id = tracing::field::Empty,
        )
    )]
    pub async fn sync_connection(
        &self,
        connection: &provider_connection::Model,
        complete_sync_run_id: Option<Uuid>,
    ) -> SnapshotOutcome {
        let started = Instant::now();
        let mut outcome = self.run(connection, complete_sync_run_id).await;
        outcome.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let labels = vec![
            ("provider", connection.provider_slug.clone()),
            ("status", outcome.status.as_str().to_string()),
        ];
        counter!("sync_connection_total", &labels).increment(1);
        histogram!(
            "sync_connection_duration_ms",
            &[("provider", connection.provider_slug.clone())]
        )
        .record(outcome.duration_ms as f64);

        match &outcome.error {
            Some(err) => warn!(
                phase = outcome.phase.as_str(),
                error_code = err.code(),
                duration_ms = outcome.duration_ms,
                "Connection sync failed: {}",
                err
            ),
            None => info!(
                phase = SyncPhase::Completed.as_str(),
                status = outcome.status.as_str(),
                found = outcome.counts.found,
                created = outcome.counts.created,
                updated = outcome.counts.updated,
                unchanged = outcome.counts.unchanged,
                removed = outcome.counts.removed,
                duration_ms = outcome.duration_ms,
                "Connection sync completed"
            ),
        }
        outcome
    }

    async fn run(
        &self,
        connection: &provider_connection::Model,
        complete_sync_run_id: Option<Uuid>,
    ) -> SnapshotOutcome {
        let snapshot = match self.snapshots.start(connection, complete_sync_run_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(phase = SyncPhase::Pending.as_str(), "Could not start snapshot: {:#}", e);
                return SnapshotOutcome::failed(
                    connection,
                    None,
                    SyncPhase::Pending,
                    SyncError::permanent(format!("could not start snapshot: {e}")),
                );
            }
        };
        Span::current().record("snapshot_id", tracing::field::display(snapshot.id));
        debug!(phase = SyncPhase::Pending.as_str(), "Snapshot started");

        let mut discovery = json!({});
        match self.execute(connection, snapshot.id, &mut discovery).await {
            Ok(outcome) => outcome,
            Err((phase, err)) => {
                if let Err(e) = self
                    .snapshots
                    .mark_failed(&snapshot.id, phase.as_str(), &err, Some(discovery))
                    .await
                {
                    error!(
                        phase = phase.as_str(),
                        "Could not record snapshot failure: {:#}", e
                    );
                }
                SnapshotOutcome::failed(connection, Some(snapshot.id), phase, err)
            }
        }
    }

    async fn execute(
        &self,
        connection: &provider_connection::Model,
        snapshot_id: Uuid,
        discovery: &mut serde_json::Value,
    ) -> Result<SnapshotOutcome, (SyncPhase, SyncError)> {
        let provider = connection.provider_slug.as_str();
        let fail = |phase: SyncPhase| move |err: SyncError| (phase, err);

        let adapter = self
            .registry
            .get(provider)
            .map_err(|e| (SyncPhase::Pending, SyncError::permanent(e.to_string())))?;
        let ctx = self
            .connections
            .load_context(connection)
            .map_err(|e| (SyncPhase::Pending, SyncError::permanent(e.to_string())))?;

        // Fetching
        info!(phase = SyncPhase::Fetching.as_str(), "Fetching provider data");
        let fetched = self
            .fetch(adapter.as_ref(), &ctx)
            .await
            .map_err(fail(SyncPhase::Fetching))?;
        discovery["resources_listed"] = json!(fetched.records.len());

        let billing_availability = match &fetched.billing {
            Ok(BillingRecords::Supported(records)) => {
                discovery["billing"] = json!("supported");
                discovery["billing_records"] = json!(records.len());
                BillingAvailability::Supported
            }
            Ok(BillingRecords::NotSupported) => {
                discovery["billing"] = json!("not_supported");
                BillingAvailability::NotSupported
            }
            Err(err) => {
                warn!(
                    phase = SyncPhase::Fetching.as_str(),
                    error_code = err.code(),
                    "Billing listing failed, pricing without authoritative billing: {}",
                    err
                );
                discovery["billing"] = json!("failed");
                discovery["billing_error"] = serde_json::to_value(err).unwrap_or_default();
                BillingAvailability::Failed
            }
        };

        // Normalizing
        debug!(phase = SyncPhase::Normalizing.as_str(), records = fetched.records.len());
        let NormalizedBatch {
            resources,
            rejected,
        } = normalize_batch(provider, &fetched.records);
        record_rejections(discovery, &rejected);
        discovery["normalized"] = json!(resources.len());

        // Pricing
        debug!(phase = SyncPhase::Pricing.as_str(), resources = resources.len());
        let catalog = self
            .catalog
            .load_catalog(provider, Utc::now())
            .await
            .map_err(|e| {
                (
                    SyncPhase::Pricing,
                    SyncError::permanent(format!("could not load price catalog: {e}")),
                )
            })?;
        discovery["catalog_entries"] = json!(catalog.len());

        let billing_index = match &fetched.billing {
            Ok(billing) => BillingIndex::from_records(billing),
            Err(_) => None,
        };
        let resolver = PricingResolver::new(catalog, (*self.rates).clone(), &self.default_currency);
        let priced = resolver.price_all(resources, billing_index.as_ref());
        let unresolved = record_pricing(discovery, provider, &priced);

        // Diffing
        debug!(phase = SyncPhase::Diffing.as_str());
        let previous: Vec<TrackedResource> = self
            .resources
            .active_for_connection(&connection.id)
            .await
            .map_err(|e| {
                (
                    SyncPhase::Diffing,
                    SyncError::permanent(format!("could not load previous resources: {e}")),
                )
            })?
            .iter()
            .map(TrackedResource::from)
            .collect();
        let diff = diff_snapshot(&previous, &priced);
        if !diff.counts.is_conserved() {
            error!(phase = SyncPhase::Diffing.as_str(), counts = ?diff.counts, "Snapshot counts do not add up");
            return Err((
                SyncPhase::Diffing,
                SyncError::permanent("snapshot classification counts do not add up")
                    .with_details(serde_json::to_value(diff.counts).unwrap_or_default()),
            ));
        }

        // Persisted
        let status = if billing_availability == BillingAvailability::Failed {
            SnapshotStatus::Partial
        } else {
            SnapshotStatus::Success
        };
        discovery["phases"] = json!([
            SyncPhase::Fetching.as_str(),
            SyncPhase::Normalizing.as_str(),
            SyncPhase::Pricing.as_str(),
            SyncPhase::Diffing.as_str(),
            SyncPhase::Persisted.as_str(),
        ]);

        let finalized = self
            .snapshots
            .persist_completed(CompletedSnapshot {
                snapshot_id,
                connection,
                priced: &priced,
                diff: &diff,
                status: status.as_str(),
                discovery: discovery.clone(),
                completed_at: Utc::now(),
            })
            .await
            .map_err(|e| {
                (
                    SyncPhase::Persisted,
                    SyncError::permanent(format!("could not persist snapshot: {e:#}")),
                )
            })?;
        debug!(phase = SyncPhase::Persisted.as_str(), "Snapshot persisted");

        Ok(SnapshotOutcome {
            connection_id: connection.id,
            account_id: connection.account_id,
            provider_slug: connection.provider_slug.clone(),
            snapshot_id: Some(finalized.id),
            status,
            phase: SyncPhase::Completed,
            counts: diff.counts,
            total_daily_cost: finalized.total_daily_cost,
            total_monthly_cost: finalized.total_monthly_cost,
            pricing_unresolved: unresolved,
            rejected_records: rejected.len(),
            billing: Some(billing_availability),
            error: None,
            duration_ms: 0,
        })
    }

    /// Authenticate, list resources, then list billing.
    ///
    /// A failed billing listing is kept as a value unless it is an
    /// authentication failure, which fails the whole fetch.
    async fn fetch(
        &self,
        adapter: &dyn ProviderAdapter,
        ctx: &ConnectionContext,
    ) -> Result<Fetched, SyncError> {
        let provider = ctx.provider_slug.as_str();

        let session = self
            .call_with_retry(provider, "authenticate", move || adapter.authenticate(ctx))
            .await?;
        let session = &session;

        let records = self
            .call_with_retry(provider, "list_resources", move || {
                adapter.list_resources(session, ctx)
            })
            .await?;

        let billing = match self
            .call_with_retry(provider, "list_billing_records", move || {
                adapter.list_billing_records(session, ctx)
            })
            .await
        {
            Ok(billing) => Ok(billing),
            Err(err @ ProviderError::Authentication { .. }) => return Err(err.into()),
            Err(err) => Err(SyncError::from(err)),
        };

        Ok(Fetched { records, billing })
    }

    /// Run one adapter call under the fetch timeout, retrying a transient
    /// failure exactly once.
    async fn call_with_retry<T, F, Fut>(
        &self,
        provider: &str,
        operation: &'static str,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let err = match self.with_timeout(operation, call()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err),
        };

        let policy = self.retry_policy.for_provider(provider);
        let backoff = calculate_backoff(&policy, &err, 0);
        let labels = vec![
            ("provider", provider.to_string()),
            ("operation", operation.to_string()),
        ];
        counter!("provider_retry_total", &labels).increment(1);
        warn!(
            phase = SyncPhase::Fetching.as_str(),
            operation,
            backoff_seconds = backoff.as_secs_f64(),
            "Transient provider failure, retrying once: {}",
            err
        );
        sleep(backoff).await;

        self.with_timeout(operation, call()).await
    }

    async fn with_timeout<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Network {
                    details: format!(
                        "{operation} timed out after {}s",
                        self.fetch_timeout.as_secs()
                    ),
                    retryable: true,
                })
            })
    }
}

fn record_rejections(discovery: &mut serde_json::Value, rejected: &[RejectedRecord]) {
    discovery["rejected"] = json!(rejected.len());
    if rejected.is_empty() {
        return;
    }
    warn!(
        phase = SyncPhase::Normalizing.as_str(),
        rejected = rejected.len(),
        "Provider records rejected during normalization"
    );
    let listed: Vec<&RejectedRecord> = rejected.iter().take(MAX_REPORTED_REJECTIONS).collect();
    discovery["rejected_records"] = serde_json::to_value(listed).unwrap_or_default();
}

/// Count resources per pricing tier; returns the number left unresolved.
fn record_pricing(
    discovery: &mut serde_json::Value,
    provider: &str,
    priced: &[PricedResource],
) -> usize {
    let mut tiers = serde_json::Map::new();
    let mut unresolved = 0usize;
    for resource in priced {
        let source = match resource.cost.cost_source {
            Some(source) => source.as_str(),
            None => {
                unresolved += 1;
                "unresolved"
            }
        };
        let entry = tiers.entry(source.to_string()).or_insert(json!(0));
        *entry = json!(entry.as_u64().unwrap_or(0) + 1);
    }

    for source in [
        CostSource::AuthoritativeBilling,
        CostSource::SkuCatalog,
        CostSource::DerivedUnitPrice,
        CostSource::DocumentedFallback,
    ] {
        let hits = tiers
            .get(source.as_str())
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if hits > 0 {
            let labels = vec![
                ("provider", provider.to_string()),
                ("source", source.as_str().to_string()),
            ];
            counter!("pricing_tier_total", &labels).increment(hits);
        }
    }
    if unresolved > 0 {
        counter!("pricing_unresolved_total", &[("provider", provider.to_string())])
            .increment(unresolved as u64);
        warn!(
            phase = SyncPhase::Pricing.as_str(),
            unresolved, "Resources left without a price"
        );
    }

    discovery["pricing"] = serde_json::Value::Object(tiers);
    unresolved
}
