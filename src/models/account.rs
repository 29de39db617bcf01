//! Account entity model
//!
//! Accounts own provider connections. Only `active`, non-demo accounts take
//! part in bulk synchronization.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Account status value that makes an account eligible for bulk sync.
pub const STATUS_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    /// Lifecycle status (active|suspended|closed)
    pub status: String,

    /// Demo accounts are never synchronized in bulk
    pub is_demo: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::provider_connection::Entity")]
    ProviderConnections,
}

impl Related<super::provider_connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProviderConnections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
