//! # Sync Trigger Handlers
//!
//! "Sync one account now" and "sync all eligible accounts". Both return the
//! structured run outcome; connection and account failures are part of the
//! body, not HTTP errors.

use axum::{
    extract::{Path, State, rejection::PathRejection},
    response::Json,
};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::bulk_sync::BulkSyncOutcome;
use crate::complete_sync::{CompleteSyncOutcome, SyncTrigger};
use crate::error::{ApiError, sync_in_progress};
use crate::server::AppState;

/// Run a complete sync for one account
#[utoipa::path(
    post,
    path = "/accounts/{account_id}/sync",
    security(("bearer_auth" = [])),
    params(("account_id" = Uuid, Path, description = "Account to synchronize")),
    responses(
        (status = 200, description = "Complete-sync outcome (status may be success, partial or error)", body = CompleteSyncOutcome),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Account not found", body = ApiError),
        (status = 409, description = "Another sync is running", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_account(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<CompleteSyncOutcome>, ApiError> {
    let Path(account_id) = path?;
    let _guard = state.sync_lock.try_lock().map_err(|_| sync_in_progress())?;

    tracing::info!(account_id = %account_id, "Manual complete sync requested");
    let cancel = state.shutdown.child_token();
    let outcome = state
        .aggregator
        .run(account_id, SyncTrigger::Manual, &cancel)
        .await?;
    Ok(Json(outcome))
}

/// Run a bulk sync over every eligible account
#[utoipa::path(
    post,
    path = "/sync/bulk",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Bulk-sync outcome with per-account results", body = BulkSyncOutcome),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Another sync is running", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_all(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<BulkSyncOutcome>, ApiError> {
    let _guard = state.sync_lock.try_lock().map_err(|_| sync_in_progress())?;

    tracing::info!("Manual bulk sync requested");
    let cancel = state.shutdown.child_token();
    let outcome = state.bulk.run(SyncTrigger::Manual, &cancel).await?;
    Ok(Json(outcome))
}
