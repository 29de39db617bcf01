//! Complete sync run entity model
//!
//! Account-wide aggregation over the snapshots produced (or carried forward)
//! for each eligible connection.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::{DateTimeWithTimeZone, Decimal};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "complete_sync_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub account_id: Uuid,

    /// Parent bulk run when triggered by the coordinator
    pub bulk_sync_run_id: Option<Uuid>,

    /// manual|scheduled|bulk|cli
    pub trigger: String,

    /// running|success|partial|error
    pub status: String,

    pub started_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub total_resources: i32,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub total_daily_cost: Decimal,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub total_monthly_cost: Decimal,

    /// provider slug -> daily cost
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub cost_by_provider: Option<JsonValue>,

    /// provider slug -> active resource count
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub resources_by_provider: Option<JsonValue>,

    /// Per-connection outcome list
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub connection_results: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub errors: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
