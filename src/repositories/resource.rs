//! Resource repository for read access to tracked resources
//!
//! Writes happen only inside the snapshot transaction
//! (see [`SnapshotRepository::persist_completed`](super::SnapshotRepository::persist_completed)).

use anyhow::Result;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::resource::{self, Entity as Resource};

/// Cost totals over a set of active resources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTotals {
    pub count: usize,
    pub daily_cost: Decimal,
    pub monthly_cost: Decimal,
}

impl ResourceTotals {
    pub fn from_models(models: &[resource::Model]) -> Self {
        models
            .iter()
            .filter(|m| m.is_active)
            .fold(Self::default(), |mut totals, m| {
                totals.count += 1;
                totals.daily_cost += m.daily_cost;
                totals.monthly_cost += m.monthly_cost;
                totals
            })
    }
}

/// Repository for resource database operations
#[derive(Debug, Clone)]
pub struct ResourceRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ResourceRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<resource::Model>> {
        Ok(Resource::find_by_id(*id).one(&*self.db).await?)
    }

    /// Active resources of a connection, i.e. the resource set of its latest
    /// completed snapshot
    pub async fn active_for_connection(&self, connection_id: &Uuid) -> Result<Vec<resource::Model>> {
        self.list_for_connection(connection_id, false).await
    }

    /// Resources of a connection ordered by `(resource_type, native_id)`
    pub async fn list_for_connection(
        &self,
        connection_id: &Uuid,
        include_inactive: bool,
    ) -> Result<Vec<resource::Model>> {
        let mut query = Resource::find().filter(resource::Column::ConnectionId.eq(*connection_id));
        if !include_inactive {
            query = query.filter(resource::Column::IsActive.eq(true));
        }
        Ok(query
            .order_by_asc(resource::Column::ResourceType)
            .order_by_asc(resource::Column::NativeId)
            .all(&*self.db)
            .await?)
    }

    /// Active totals of one connection
    pub async fn active_totals(&self, connection_id: &Uuid) -> Result<ResourceTotals> {
        let active = self.active_for_connection(connection_id).await?;
        Ok(ResourceTotals::from_models(&active))
    }
}
