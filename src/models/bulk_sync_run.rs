//! Bulk sync run entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "bulk_sync_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// running|completed|cancelled
    pub status: String,

    /// scheduled|manual|cli
    pub trigger: String,

    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub duration_ms: i64,

    pub total_accounts: i32,
    pub succeeded_count: i32,
    pub partial_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,

    /// Per-account outcome list
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub account_results: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
