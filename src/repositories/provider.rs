//! Provider repository for database operations
//!
//! This module provides the ProviderRepository struct which encapsulates
//! SeaORM operations for the providers catalog table.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;

use crate::models::provider::{self, Entity as Provider};

/// Repository for provider database operations
#[derive(Debug, Clone)]
pub struct ProviderRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ProviderRepository {
    /// Creates a new ProviderRepository instance
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a provider by its slug
    ///
    /// # Arguments
    ///
    /// * `slug` - The unique slug identifier of the provider
    ///
    /// # Returns
    ///
    /// Returns a Result containing the provider model if found, or an error
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<provider::Model>> {
        let provider = Provider::find_by_id(slug.to_string())
            .one(&*self.db)
            .await?;
        Ok(provider)
    }

    /// Finds all providers ordered by slug
    pub async fn list_all(&self) -> Result<Vec<provider::Model>> {
        let providers = Provider::find()
            .order_by_asc(provider::Column::Slug)
            .all(&*self.db)
            .await?;
        Ok(providers)
    }

    /// Inserts a provider or refreshes its catalog fields
    ///
    /// # Arguments
    ///
    /// * `slug` - Provider-type slug (primary key)
    /// * `display_name` - Human readable name
    /// * `auth_type` - Credential scheme
    /// * `billing_api` - Whether the provider reports per-resource billing
    ///
    /// # Returns
    ///
    /// Returns the stored provider row
    pub async fn upsert(
        &self,
        slug: &str,
        display_name: &str,
        auth_type: &str,
        billing_api: bool,
    ) -> Result<provider::Model> {
        let now = Utc::now();
        if let Some(existing) = self.find_by_slug(slug).await? {
            let unchanged = existing.display_name == display_name
                && existing.auth_type == auth_type
                && existing.billing_api == billing_api;
            if unchanged {
                return Ok(existing);
            }
            let mut am: provider::ActiveModel = existing.into();
            am.display_name = Set(display_name.to_string());
            am.auth_type = Set(auth_type.to_string());
            am.billing_api = Set(billing_api);
            am.updated_at = Set(now.into());
            Ok(am.update(&*self.db).await?)
        } else {
            let am = provider::ActiveModel {
                slug: Set(slug.to_string()),
                display_name: Set(display_name.to_string()),
                auth_type: Set(auth_type.to_string()),
                billing_api: Set(billing_api),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };
            Ok(am.insert(&*self.db).await?)
        }
    }
}
