//! Snapshot entity model
//!
//! One row per synchronization attempt of a single connection. A snapshot is
//! inserted as `running` and finalized in the same transaction that writes its
//! resource states, or marked `error` with no states at all.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::{DateTimeWithTimeZone, Decimal};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_PARTIAL: &str = "partial";
pub const STATUS_ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub connection_id: Uuid,
    pub account_id: Uuid,
    pub provider_slug: String,

    /// Complete-sync run that produced this snapshot, if any
    pub complete_sync_run_id: Option<Uuid>,

    /// running|success|partial|error
    pub status: String,

    /// Last phase reached by the orchestrator
    pub phase: String,

    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Number of resources returned by the provider after normalization
    pub found_count: i32,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub total_daily_cost: Decimal,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub total_monthly_cost: Decimal,

    pub created_count: i32,
    pub updated_count: i32,
    pub unchanged_count: i32,
    pub removed_count: i32,

    /// Discovery metadata (record counts, billing availability, pricing tiers)
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub discovery: Option<JsonValue>,

    /// Structured sync error for failed snapshots
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub error: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::provider_connection::Entity",
        from = "Column::ConnectionId",
        to = "super::provider_connection::Column::Id"
    )]
    ProviderConnection,
    #[sea_orm(has_many = "super::resource_state::Entity")]
    ResourceStates,
}

impl Related<super::provider_connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProviderConnection.def()
    }
}

impl Related<super::resource_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceStates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
