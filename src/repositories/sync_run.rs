//! Repository for complete-sync and bulk-sync run records

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{bulk_sync_run, complete_sync_run};

pub const RUN_STATUS_RUNNING: &str = "running";
pub const RUN_STATUS_ERROR: &str = "error";

/// Final figures of a complete-sync run
#[derive(Debug, Clone)]
pub struct CompleteSyncRunRecord {
    pub status: String,
    pub completed_at: DateTime<Utc>,
    pub total_resources: usize,
    pub total_daily_cost: Decimal,
    pub total_monthly_cost: Decimal,
    pub cost_by_provider: Value,
    pub resources_by_provider: Value,
    pub connection_results: Value,
    pub errors: Option<Value>,
}

/// Final figures of a bulk-sync run
#[derive(Debug, Clone)]
pub struct BulkSyncRunRecord {
    pub status: String,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_accounts: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub account_results: Value,
}

fn count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Repository for sync run database operations
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl SyncRunRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a `running` complete-sync run
    pub async fn start_complete(
        &self,
        account_id: &Uuid,
        trigger: &str,
        bulk_sync_run_id: Option<Uuid>,
    ) -> Result<complete_sync_run::Model> {
        let run = complete_sync_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(*account_id),
            bulk_sync_run_id: Set(bulk_sync_run_id),
            trigger: Set(trigger.to_string()),
            status: Set(RUN_STATUS_RUNNING.to_string()),
            started_at: Set(Utc::now().into()),
            completed_at: Set(None),
            total_resources: Set(0),
            total_daily_cost: Set(Decimal::ZERO),
            total_monthly_cost: Set(Decimal::ZERO),
            cost_by_provider: Set(None),
            resources_by_provider: Set(None),
            connection_results: Set(None),
            errors: Set(None),
        };
        Ok(run.insert(&*self.db).await?)
    }

    /// Stores the final status and aggregates of a complete-sync run
    pub async fn finish_complete(
        &self,
        id: &Uuid,
        record: CompleteSyncRunRecord,
    ) -> Result<complete_sync_run::Model> {
        let existing = complete_sync_run::Entity::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("complete sync run {} not found", id))?;

        let mut run: complete_sync_run::ActiveModel = existing.into();
        run.status = Set(record.status);
        run.completed_at = Set(Some(record.completed_at.into()));
        run.total_resources = Set(count(record.total_resources));
        run.total_daily_cost = Set(record.total_daily_cost);
        run.total_monthly_cost = Set(record.total_monthly_cost);
        run.cost_by_provider = Set(Some(record.cost_by_provider));
        run.resources_by_provider = Set(Some(record.resources_by_provider));
        run.connection_results = Set(Some(record.connection_results));
        run.errors = Set(record.errors);
        Ok(run.update(&*self.db).await?)
    }

    /// Closes a complete-sync run that aborted before its figures were known
    pub async fn fail_complete(&self, id: &Uuid, message: &str) -> Result<complete_sync_run::Model> {
        let existing = complete_sync_run::Entity::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("complete sync run {} not found", id))?;

        let mut run: complete_sync_run::ActiveModel = existing.into();
        run.status = Set(RUN_STATUS_ERROR.to_string());
        run.completed_at = Set(Some(Utc::now().into()));
        run.errors = Set(Some(serde_json::json!([{ "error": message }])));
        Ok(run.update(&*self.db).await?)
    }

    pub async fn get_complete(&self, id: &Uuid) -> Result<Option<complete_sync_run::Model>> {
        Ok(complete_sync_run::Entity::find_by_id(*id)
            .one(&*self.db)
            .await?)
    }

    /// Recent complete-sync runs of an account, newest first
    pub async fn list_complete_for_account(
        &self,
        account_id: &Uuid,
        limit: u64,
    ) -> Result<Vec<complete_sync_run::Model>> {
        Ok(complete_sync_run::Entity::find()
            .filter(complete_sync_run::Column::AccountId.eq(*account_id))
            .order_by_desc(complete_sync_run::Column::StartedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Inserts a `running` bulk-sync run
    pub async fn start_bulk(&self, trigger: &str) -> Result<bulk_sync_run::Model> {
        let run = bulk_sync_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            status: Set(RUN_STATUS_RUNNING.to_string()),
            trigger: Set(trigger.to_string()),
            started_at: Set(Utc::now().into()),
            completed_at: Set(None),
            duration_ms: Set(0),
            total_accounts: Set(0),
            succeeded_count: Set(0),
            partial_count: Set(0),
            failed_count: Set(0),
            skipped_count: Set(0),
            account_results: Set(None),
        };
        Ok(run.insert(&*self.db).await?)
    }

    /// Stores per-account results and statistics of a bulk-sync run
    pub async fn finish_bulk(
        &self,
        id: &Uuid,
        record: BulkSyncRunRecord,
    ) -> Result<bulk_sync_run::Model> {
        let existing = bulk_sync_run::Entity::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("bulk sync run {} not found", id))?;

        let mut run: bulk_sync_run::ActiveModel = existing.into();
        run.status = Set(record.status);
        run.completed_at = Set(Some(record.completed_at.into()));
        run.duration_ms = Set(i64::try_from(record.duration_ms).unwrap_or(i64::MAX));
        run.total_accounts = Set(count(record.total_accounts));
        run.succeeded_count = Set(count(record.succeeded));
        run.partial_count = Set(count(record.partial));
        run.failed_count = Set(count(record.failed));
        run.skipped_count = Set(count(record.skipped));
        run.account_results = Set(Some(record.account_results));
        Ok(run.update(&*self.db).await?)
    }

    /// Closes a bulk-sync run that aborted before its account results were stored
    pub async fn fail_bulk(
        &self,
        id: &Uuid,
        duration_ms: u64,
        message: &str,
    ) -> Result<bulk_sync_run::Model> {
        let existing = bulk_sync_run::Entity::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("bulk sync run {} not found", id))?;

        let mut run: bulk_sync_run::ActiveModel = existing.into();
        run.status = Set(RUN_STATUS_ERROR.to_string());
        run.completed_at = Set(Some(Utc::now().into()));
        run.duration_ms = Set(i64::try_from(duration_ms).unwrap_or(i64::MAX));
        run.account_results = Set(Some(serde_json::json!({ "error": message })));
        Ok(run.update(&*self.db).await?)
    }

    pub async fn get_bulk(&self, id: &Uuid) -> Result<Option<bulk_sync_run::Model>> {
        Ok(bulk_sync_run::Entity::find_by_id(*id).one(&*self.db).await?)
    }
}
