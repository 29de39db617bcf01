//! Resource entity model
//!
//! Persistent identity of a normalized resource within a connection. The
//! latest normalized attributes and priced cost are kept on the row; the
//! per-snapshot history lives in `resource_states`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::{DateTimeWithTimeZone, Decimal};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub connection_id: Uuid,
    pub account_id: Uuid,
    pub provider_slug: String,

    /// Canonical resource type (server, volume, ...)
    pub resource_type: String,

    /// Provider-native identifier
    pub native_id: String,

    pub name: String,
    pub region: Option<String>,

    /// Canonical status (active|stopped|error|unknown)
    pub status: String,

    /// Capacity quantities in canonical units
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub capacity: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub tags: Option<JsonValue>,

    /// Typed extra attributes
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub extra: Option<JsonValue>,

    /// Volumes folded into this server
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub attached_volumes: Option<JsonValue>,

    /// Digest of the normalized attributes
    pub fingerprint: String,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub daily_cost: Decimal,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub monthly_cost: Decimal,

    pub currency: String,

    /// Pricing tier that produced the cost; `None` when unresolved
    pub cost_source: Option<String>,

    pub pricing_unresolved: bool,
    pub is_orphan: bool,
    pub is_active: bool,

    pub first_seen_at: DateTimeWithTimeZone,
    pub last_seen_at: DateTimeWithTimeZone,
    pub deactivated_at: Option<DateTimeWithTimeZone>,

    pub last_snapshot_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::provider_connection::Entity",
        from = "Column::ConnectionId",
        to = "super::provider_connection::Column::Id"
    )]
    ProviderConnection,
}

impl Related<super::provider_connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProviderConnection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
