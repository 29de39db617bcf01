//! Test utilities for database and sync testing.
//!
//! In-memory SQLite databases with migrations applied, fixture helpers, and
//! a scripted provider adapter whose responses each test controls.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use cloudspend::bulk_sync::BulkSyncCoordinator;
use cloudspend::complete_sync::CompleteSyncAggregator;
use cloudspend::config::AppConfig;
use cloudspend::crypto::CryptoKey;
use cloudspend::models::{account, provider_connection};
use cloudspend::pricing::rates::{RateTables, UnitRates};
use cloudspend::providers::{
    AuthType, BillingPeriod, BillingRecords, ConnectionContext, NativeBillingRecord,
    NativeQuantity, NativeRecord, ProviderAdapter, ProviderError, ProviderMetadata, Registry,
    Session,
};
use cloudspend::repositories::{
    AccountRepository, ConnectionRepository, CreateAccountRequest, CreateConnectionRequest,
};
use cloudspend::seeds::seed_providers;
use cloudspend::sync_orchestrator::SyncOrchestrator;
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Same as [`setup_test_db`], wrapped in an `Arc`.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Seeds the built-in providers (yandex, selectel, manual) so connections
/// can reference them.
pub async fn seed_builtin_providers(db: &DatabaseConnection) -> Result<()> {
    let registry = Registry::from_config(&AppConfig::default())?;
    seed_providers(db, &registry).await?;
    Ok(())
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("32-byte key")
}

/// Configuration with instant retries so tests never sleep.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        operator_tokens: vec!["test-token".to_string()],
        crypto_key: Some(vec![7u8; 32]),
        ..AppConfig::default()
    };
    config.retry_policy.base_seconds = 0;
    config.retry_policy.max_seconds = 0;
    config.retry_policy.jitter_factor = 0.0;
    config
}

/// Derived compute rates used by the scenarios: 5.00 per vCPU-day and
/// 2.50 per GB-RAM-day, so 2 vCPU / 4 GB costs 20.00 per day.
pub fn test_rate_tables(providers: &[&str]) -> RateTables {
    providers.iter().fold(RateTables::new(), |tables, provider| {
        tables.with_derived(provider, "compute", UnitRates::compute("RUB", 500, 250, 0))
    })
}

pub async fn create_account(db: &Arc<DatabaseConnection>, name: &str) -> Result<account::Model> {
    AccountRepository::new(db.clone())
        .create(CreateAccountRequest {
            name: name.to_string(),
            is_demo: false,
        })
        .await
}

pub async fn create_demo_account(
    db: &Arc<DatabaseConnection>,
    name: &str,
) -> Result<account::Model> {
    AccountRepository::new(db.clone())
        .create(CreateAccountRequest {
            name: name.to_string(),
            is_demo: true,
        })
        .await
}

/// Creates an included connection with a throwaway encrypted credential.
pub async fn create_connection(
    db: &Arc<DatabaseConnection>,
    account_id: Uuid,
    provider_slug: &str,
) -> Result<provider_connection::Model> {
    let mut credentials = BTreeMap::new();
    credentials.insert("api_key".to_string(), format!("key-{provider_slug}"));
    ConnectionRepository::new(db.clone(), test_crypto_key())
        .create(CreateConnectionRequest {
            account_id,
            provider_slug: provider_slug.to_string(),
            display_name: Some(format!("{provider_slug} connection")),
            credentials,
            settings: serde_json::json!({}),
            include_in_complete_sync: true,
        })
        .await
}

/// Server record with `vcpus` cores and `memory_gb` of RAM.
pub fn server(native_id: &str, vcpus: u32, memory_gb: u32) -> NativeRecord {
    let mut record = NativeRecord::new("server", native_id);
    record.name = Some(native_id.to_string());
    record.status = Some("running".to_string());
    record.capacity = vec![
        NativeQuantity::number("vcpus", f64::from(vcpus), "count"),
        NativeQuantity::number("memory", f64::from(memory_gb), "GB"),
    ];
    record
}

pub fn daily_bill(native_id: &str, amount: i64) -> NativeBillingRecord {
    NativeBillingRecord {
        native_id: native_id.to_string(),
        amount: Decimal::from(amount),
        currency: "RUB".to_string(),
        period: BillingPeriod::Day,
    }
}

struct Script {
    resources: Vec<NativeRecord>,
    billing: BillingRecords,
    auth_failure: Option<ProviderError>,
    list_failures: VecDeque<ProviderError>,
    billing_failure: Option<ProviderError>,
}

/// Provider adapter answering from an in-memory script.
pub struct ScriptedAdapter {
    script: Mutex<Script>,
    list_calls: AtomicUsize,
    auth_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                resources: Vec::new(),
                billing: BillingRecords::NotSupported,
                auth_failure: None,
                list_failures: VecDeque::new(),
                billing_failure: None,
            }),
            list_calls: AtomicUsize::new(0),
            auth_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_resources(&self, resources: Vec<NativeRecord>) {
        self.script.lock().unwrap().resources = resources;
    }

    pub fn set_billing(&self, billing: BillingRecords) {
        self.script.lock().unwrap().billing = billing;
    }

    /// Every authenticate call fails with `err` until cleared with `None`.
    pub fn fail_auth(&self, err: Option<ProviderError>) {
        self.script.lock().unwrap().auth_failure = err;
    }

    /// The next resource listing fails once with `err`.
    pub fn fail_next_listing(&self, err: ProviderError) {
        self.script.lock().unwrap().list_failures.push_back(err);
    }

    pub fn fail_billing(&self, err: Option<ProviderError>) {
        self.script.lock().unwrap().billing_failure = err;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn authenticate(&self, _ctx: &ConnectionContext) -> Result<Session, ProviderError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script.lock().unwrap().auth_failure {
            Some(err) => Err(err.clone()),
            None => Ok(Session::bearer("scripted-token", None)),
        }
    }

    async fn list_resources(
        &self,
        session: &Session,
        _ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError> {
        session.token()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if let Some(err) = script.list_failures.pop_front() {
            return Err(err);
        }
        Ok(script.resources.clone())
    }

    async fn list_billing_records(
        &self,
        _session: &Session,
        _ctx: &ConnectionContext,
    ) -> Result<BillingRecords, ProviderError> {
        let script = self.script.lock().unwrap();
        match &script.billing_failure {
            Some(err) => Err(err.clone()),
            None => Ok(script.billing.clone()),
        }
    }
}

/// Wired sync stack over an in-memory database.
pub struct SyncHarness {
    pub db: Arc<DatabaseConnection>,
    pub aggregator: CompleteSyncAggregator,
    pub bulk: BulkSyncCoordinator,
}

/// Builds the sync stack with the given scripted adapters registered
/// under their slugs. Every slug gets the derived compute rates of
/// [`test_rate_tables`].
pub async fn sync_harness(adapters: &[(&str, Arc<ScriptedAdapter>)]) -> Result<SyncHarness> {
    let db = setup_test_db_arc().await?;

    let mut registry = Registry::new();
    for (slug, adapter) in adapters {
        registry.register(
            adapter.clone(),
            ProviderMetadata::new(*slug, format!("Scripted {slug}"), AuthType::ApiKey, true),
        );
    }
    seed_providers(&db, &registry).await?;

    let slugs: Vec<&str> = adapters.iter().map(|(slug, _)| *slug).collect();
    let orchestrator = SyncOrchestrator::new(
        db.clone(),
        Arc::new(registry),
        test_crypto_key(),
        &test_config(),
    )
    .with_rate_tables(test_rate_tables(&slugs));
    let aggregator = CompleteSyncAggregator::new(db.clone(), orchestrator);
    let bulk = BulkSyncCoordinator::new(db.clone(), aggregator.clone());

    Ok(SyncHarness {
        db,
        aggregator,
        bulk,
    })
}
