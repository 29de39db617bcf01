//! Connection repository for database operations
//!
//! This module provides the ConnectionRepository struct which encapsulates
//! SeaORM operations for the provider_connections table. Credentials pass
//! through this repository only in encrypted form.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, credentials_aad, decrypt_credentials, encrypt_credentials};
use crate::models::provider_connection::{self, Entity as ProviderConnection};
use crate::providers::{ConnectionContext, Credentials};

/// Request data for creating a provider connection
#[derive(Debug, Clone)]
pub struct CreateConnectionRequest {
    pub account_id: Uuid,
    pub provider_slug: String,
    pub display_name: Option<String>,
    /// Plaintext credential fields, encrypted before they reach the database
    pub credentials: BTreeMap<String, String>,
    pub settings: Value,
    pub include_in_complete_sync: bool,
}

/// Repository for provider connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for credential encryption
    pub crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Creates an active connection with encrypted credentials
    pub async fn create(
        &self,
        request: CreateConnectionRequest,
    ) -> Result<provider_connection::Model> {
        let id = Uuid::new_v4();
        let ciphertext = if request.credentials.is_empty() {
            None
        } else {
            let aad = credentials_aad(&request.account_id, &request.provider_slug, &id);
            Some(
                encrypt_credentials(&self.crypto_key, &aad, &request.credentials)
                    .map_err(|e| anyhow!("Credential encryption failed: {}", e))?,
            )
        };

        let now = Utc::now();
        let connection = provider_connection::ActiveModel {
            id: Set(id),
            account_id: Set(request.account_id),
            provider_slug: Set(request.provider_slug),
            display_name: Set(request.display_name),
            status: Set(provider_connection::STATUS_ACTIVE.to_string()),
            include_in_complete_sync: Set(request.include_in_complete_sync),
            credentials_ciphertext: Set(ciphertext),
            settings: Set(Some(request.settings)),
            last_synced_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        Ok(connection.insert(&*self.db).await?)
    }

    /// Retrieves a connection by its ID
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<provider_connection::Model>> {
        Ok(ProviderConnection::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists the connections a complete sync visits: active and flagged for
    /// inclusion, in creation order
    pub async fn list_included(
        &self,
        account_id: &Uuid,
    ) -> Result<Vec<provider_connection::Model>> {
        Ok(ProviderConnection::find()
            .filter(provider_connection::Column::AccountId.eq(*account_id))
            .filter(provider_connection::Column::Status.eq(provider_connection::STATUS_ACTIVE))
            .filter(provider_connection::Column::IncludeInCompleteSync.eq(true))
            .order_by_asc(provider_connection::Column::CreatedAt)
            .order_by_asc(provider_connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Replaces the stored credentials of a connection
    pub async fn update_credentials(
        &self,
        id: &Uuid,
        credentials: &BTreeMap<String, String>,
    ) -> Result<provider_connection::Model> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Connection with ID '{}' not found", id))?;

        let aad = credentials_aad(&existing.account_id, &existing.provider_slug, &existing.id);
        let ciphertext = encrypt_credentials(&self.crypto_key, &aad, credentials)
            .map_err(|e| anyhow!("Credential encryption failed: {}", e))?;

        let mut active: provider_connection::ActiveModel = existing.into();
        active.credentials_ciphertext = Set(Some(ciphertext));
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }

    /// Decrypts credentials and builds the adapter context for a connection
    pub fn load_context(&self, connection: &provider_connection::Model) -> Result<ConnectionContext> {
        let credentials = match connection.credentials_ciphertext.as_deref() {
            Some(ciphertext) => {
                let aad = credentials_aad(
                    &connection.account_id,
                    &connection.provider_slug,
                    &connection.id,
                );
                decrypt_credentials(&self.crypto_key, &aad, ciphertext).map_err(|e| {
                    // Never log the ciphertext or the decrypted payload
                    tracing::error!(
                        account_id = %connection.account_id,
                        connection_id = %connection.id,
                        provider_slug = %connection.provider_slug,
                        "Credential decryption failed"
                    );
                    anyhow!("Credential decryption failed: {}", e)
                })?
            }
            None => Credentials::default(),
        };

        Ok(ConnectionContext {
            connection_id: connection.id,
            account_id: connection.account_id,
            provider_slug: connection.provider_slug.clone(),
            credentials,
            settings: connection
                .settings
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
        })
    }
}
