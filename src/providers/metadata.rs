//! Provider metadata types
//!
//! Describes each registered provider: how its credentials look and whether
//! it exposes a billing API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Credential scheme a provider expects in the connection's encrypted credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// OAuth token exchanged for a short-lived IAM token
    OauthExchange,
    /// Username/password scoped to a project (Keystone style)
    Password,
    /// Static API key
    ApiKey,
    /// No credentials; inventory is declared in connection settings
    None,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::OauthExchange => "oauth_exchange",
            AuthType::Password => "password",
            AuthType::ApiKey => "api_key",
            AuthType::None => "none",
        }
    }
}

/// Metadata about a provider
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderMetadata {
    /// Provider-type slug used as registry key
    pub name: String,
    /// Human readable name
    pub display_name: String,
    pub auth_type: AuthType,
    /// Whether `list_billing_records` can return authoritative figures
    pub billing_api: bool,
}

impl ProviderMetadata {
    pub fn new<N: Into<String>, D: Into<String>>(
        name: N,
        display_name: D,
        auth_type: AuthType,
        billing_api: bool,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            auth_type,
            billing_api,
        }
    }
}
