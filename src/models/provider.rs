//! Provider entity model
//!
//! Global catalog of cloud providers with a registered adapter, seeded at
//! startup from the adapter registry.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Provider entity representing a supported cloud platform
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    /// Provider-type slug (primary key), e.g. `yandex`
    #[sea_orm(primary_key, auto_increment = false)]
    pub slug: String,

    /// Human readable name
    pub display_name: String,

    /// Credential scheme, e.g. `service_account_key`
    pub auth_type: String,

    /// Whether the provider exposes per-resource billing data
    pub billing_api: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
