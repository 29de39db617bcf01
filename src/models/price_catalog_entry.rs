//! Price catalog entity model
//!
//! Versioned unit prices keyed by provider and SKU signature.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::{DateTimeWithTimeZone, Decimal};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "price_catalog_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub provider_slug: String,

    /// SKU signature, e.g. `yandex:server:vcpu:standard-v3`
    pub sku: String,

    /// Billing unit (vcpu_day, gb_ram_day, gb_storage_day, unit_day)
    pub unit: String,

    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub unit_price: Decimal,

    pub currency: String,
    pub effective_from: DateTimeWithTimeZone,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
