//! # Server Configuration
//!
//! Router assembly, shared state and the process lifecycle: the HTTP API,
//! the optional bulk-sync scheduler, and graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::bulk_sync::BulkSyncCoordinator;
use crate::complete_sync::CompleteSyncAggregator;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::providers::Registry;
use crate::scheduler::{BulkSyncScheduler, SyncLock, new_sync_lock};
use crate::sync_orchestrator::SyncOrchestrator;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub crypto_key: CryptoKey,
    pub registry: Arc<Registry>,
    pub aggregator: CompleteSyncAggregator,
    pub bulk: BulkSyncCoordinator,
    /// Shared with the scheduler so sync runs never overlap
    pub sync_lock: SyncLock,
    /// Parent token of every run started by this process
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .context("crypto key not present in configuration")?;
        let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

        let orchestrator =
            SyncOrchestrator::new(db.clone(), registry.clone(), crypto_key.clone(), &config);
        let aggregator = CompleteSyncAggregator::new(db.clone(), orchestrator);
        let bulk = BulkSyncCoordinator::new(db.clone(), aggregator.clone());

        Ok(Self {
            config,
            db,
            crypto_key,
            registry,
            aggregator,
            bulk,
            sync_lock: new_sync_lock(),
            shutdown: CancellationToken::new(),
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/accounts/{account_id}/sync", post(handlers::sync::sync_account))
        .route("/sync/bulk", post(handlers::sync::sync_all))
        .route(
            "/accounts/{account_id}/sync-runs",
            get(handlers::reads::list_sync_runs),
        )
        .route(
            "/connections/{connection_id}/snapshots",
            get(handlers::reads::list_snapshots),
        )
        .route(
            "/connections/{connection_id}/resources",
            get(handlers::reads::list_resources),
        )
        .route("/snapshots/{snapshot_id}", get(handlers::reads::get_snapshot))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/providers", get(handlers::reads::list_providers))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until Ctrl-C, running the bulk-sync scheduler alongside
/// when enabled.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    registry: Registry,
) -> Result<()> {
    let addr = config.bind_addr().context("invalid API_BIND_ADDR")?;
    let state = AppState::new(Arc::new(config), Arc::new(db), Arc::new(registry))?;
    let shutdown = state.shutdown.clone();

    let scheduler_handle = if state.config.scheduler.bulk_sync_enabled {
        let scheduler = BulkSyncScheduler::new(
            state.bulk.clone(),
            state.config.scheduler.clone(),
            state.sync_lock.clone(),
        );
        Some(tokio::spawn(scheduler.run(shutdown.clone())))
    } else {
        tracing::info!("Bulk sync scheduler disabled");
        None
    };

    let profile = state.config.profile.clone();
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, %profile, "Server listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = ?err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Some(handle) = scheduler_handle
        && let Err(err) = handle.await
    {
        tracing::error!(error = ?err, "Scheduler task ended abnormally");
    }
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::sync::sync_account,
        crate::handlers::sync::sync_all,
        crate::handlers::reads::list_sync_runs,
        crate::handlers::reads::list_snapshots,
        crate::handlers::reads::get_snapshot,
        crate::handlers::reads::list_resources,
        crate::handlers::reads::list_providers,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::error::ApiError,
            crate::complete_sync::CompleteSyncOutcome,
            crate::complete_sync::ConnectionResult,
            crate::complete_sync::RunStatus,
            crate::complete_sync::SyncTrigger,
            crate::bulk_sync::BulkSyncOutcome,
            crate::bulk_sync::AccountResult,
            crate::bulk_sync::AccountOutcome,
            crate::bulk_sync::SkipReason,
            crate::sync_orchestrator::SnapshotStatus,
            crate::tracker::ChangeCounts,
            crate::handlers::reads::SyncRunInfo,
            crate::handlers::reads::SnapshotInfo,
            crate::handlers::reads::SnapshotCounts,
            crate::handlers::reads::SnapshotDetail,
            crate::handlers::reads::ResourceStateInfo,
            crate::handlers::reads::ResourceInfo,
            crate::providers::ProviderMetadata,
            crate::providers::AuthType,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Cloudspend API",
        description = "Multi-provider resource sync and cost attribution",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
