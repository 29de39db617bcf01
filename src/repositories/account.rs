//! Account repository for database operations

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::account::{self, Entity as Account};

/// Request data for creating a new account
#[derive(Debug, Clone)]
pub struct CreateAccountRequest {
    pub name: String,
    pub is_demo: bool,
}

/// Repository for account database operations
#[derive(Debug, Clone)]
pub struct AccountRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl AccountRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an active account
    pub async fn create(&self, request: CreateAccountRequest) -> Result<account::Model> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(anyhow!("account name cannot be empty"));
        }

        let now = Utc::now();
        let account = account::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            status: Set(account::STATUS_ACTIVE.to_string()),
            is_demo: Set(request.is_demo),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        Ok(account.insert(&*self.db).await?)
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<account::Model>> {
        Ok(Account::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists every account in creation order
    ///
    /// Eligibility is decided by the caller so skipped accounts can be reported.
    pub async fn list_all(&self) -> Result<Vec<account::Model>> {
        Ok(Account::find()
            .order_by_asc(account::Column::CreatedAt)
            .order_by_asc(account::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Updates the lifecycle status of an account
    pub async fn set_status(&self, id: &Uuid, status: &str) -> Result<account::Model> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Account with ID '{}' not found", id))?;

        let mut active: account::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }
}
