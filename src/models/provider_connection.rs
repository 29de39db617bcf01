//! Provider connection entity model
//!
//! Binds an account to one provider. Credentials are stored as AES-GCM
//! ciphertext; `settings` holds non-secret provider parameters such as folder
//! ids, regions or a declared inventory.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Connection status value that makes a connection eligible for sync.
pub const STATUS_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "provider_connections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning account
    pub account_id: Uuid,

    /// Provider-type slug used to look up the adapter
    pub provider_slug: String,

    pub display_name: Option<String>,

    /// Connection status (active|disabled|error)
    pub status: String,

    /// Whether complete sync should visit this connection
    pub include_in_complete_sync: bool,

    /// Encrypted JSON object of credential fields
    pub credentials_ciphertext: Option<Vec<u8>>,

    /// Non-secret provider settings
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub settings: Option<JsonValue>,

    /// Last time a snapshot for this connection completed
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    #[sea_orm(
        belongs_to = "super::provider::Entity",
        from = "Column::ProviderSlug",
        to = "super::provider::Column::Slug"
    )]
    Provider,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::provider::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
