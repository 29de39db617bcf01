//! Resource state entity model
//!
//! Captures how a resource was classified and priced in one snapshot.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::{DateTimeWithTimeZone, Decimal};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "resource_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub snapshot_id: Uuid,
    pub resource_id: Uuid,

    /// created|updated|unchanged|removed
    pub change: String,

    /// Canonical status observed in this snapshot
    pub status: String,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub daily_cost: Decimal,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub monthly_cost: Decimal,

    pub cost_source: Option<String>,
    pub fingerprint: String,
    pub recorded_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::snapshot::Entity",
        from = "Column::SnapshotId",
        to = "super::snapshot::Column::Id"
    )]
    Snapshot,
    #[sea_orm(
        belongs_to = "super::resource::Entity",
        from = "Column::ResourceId",
        to = "super::resource::Column::Id"
    )]
    Resource,
}

impl Related<super::snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Snapshot.def()
    }
}

impl Related<super::resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Resource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
