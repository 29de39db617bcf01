//! Provider adapter trait definition
//!
//! Defines the capability set every cloud provider implements: authenticate,
//! list provider-native resources and, where the provider has one, list
//! per-resource billing records.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use zeroize::Zeroize;

/// Errors raised at the provider API boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Credentials rejected or expired
    #[error("authentication failed: {details}")]
    Authentication { details: String },
    /// Provider throttled the request
    #[error("rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<u64> },
    /// Connectivity problem before a response was received
    #[error("network error: {details}")]
    Network { details: String, retryable: bool },
    /// Provider answered with a server-side failure
    #[error("provider unavailable (HTTP {status})")]
    Unavailable { status: u16, body: Option<String> },
    /// Provider rejected the request as invalid
    #[error("request rejected (HTTP {status})")]
    Rejected { status: u16, body: Option<String> },
    /// Payload could not be decoded into the expected shape
    #[error("malformed response: {details}")]
    MalformedResponse { details: String },
    /// Connection credentials or settings are incomplete
    #[error("configuration error: {details}")]
    Configuration { details: String },
}

fn retry_after_suffix(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|secs| format!(" (retry after: {secs}s)"))
        .unwrap_or_default()
}

impl ProviderError {
    /// Whether the orchestrator may retry the failed call once.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Unavailable { .. } => true,
            ProviderError::Network { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn configuration<S: Into<String>>(details: S) -> Self {
        ProviderError::Configuration {
            details: details.into(),
        }
    }

    pub fn malformed<S: Into<String>>(details: S) -> Self {
        ProviderError::MalformedResponse {
            details: details.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ProviderError::MalformedResponse {
                details: err.to_string(),
            };
        }
        ProviderError::Network {
            retryable: err.is_timeout() || err.is_connect() || err.is_request(),
            details: err.to_string(),
        }
    }
}

/// Sync-level error recorded on failed snapshots and complete-sync runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    #[serde(flatten)]
    pub kind: SyncErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Authentication/authorization failure
    Unauthorized,
    /// Provider unreachable, failing server-side, or still throttling after the retry
    ProviderUnavailable,
    /// Non-retryable failure (bad settings, malformed payloads, storage errors)
    Permanent,
    /// Run aborted at a connection boundary
    Cancelled,
}

impl SyncError {
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(SyncErrorKind::Unauthorized, message)
    }

    pub fn provider_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(SyncErrorKind::ProviderUnavailable, message)
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self::new(SyncErrorKind::Permanent, message)
    }

    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(SyncErrorKind::Cancelled, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Stable snake_case code for logs and metrics labels.
    pub fn code(&self) -> &'static str {
        match self.kind {
            SyncErrorKind::Unauthorized => "unauthorized",
            SyncErrorKind::ProviderUnavailable => "provider_unavailable",
            SyncErrorKind::Permanent => "permanent",
            SyncErrorKind::Cancelled => "cancelled",
        }
    }

    fn new<S: Into<String>>(kind: SyncErrorKind, message: S) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            details: None,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SyncErrorKind::Unauthorized => write!(f, "Unauthorized")?,
            SyncErrorKind::ProviderUnavailable => write!(f, "Provider unavailable")?,
            SyncErrorKind::Permanent => write!(f, "Permanent error")?,
            SyncErrorKind::Cancelled => write!(f, "Cancelled")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

impl From<ProviderError> for SyncError {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        match err {
            ProviderError::Authentication { .. } => SyncError::unauthorized(message),
            ProviderError::RateLimited { retry_after } => SyncError::provider_unavailable(message)
                .with_details(serde_json::json!({
                    "rate_limited": true,
                    "retry_after_secs": retry_after,
                })),
            ProviderError::Network { .. } => SyncError::provider_unavailable(message),
            ProviderError::Unavailable { status, body } => SyncError::provider_unavailable(message)
                .with_details(serde_json::json!({ "status": status, "body": body })),
            ProviderError::Rejected { status, body } => SyncError::permanent(message)
                .with_details(serde_json::json!({ "status": status, "body": body })),
            ProviderError::MalformedResponse { .. } | ProviderError::Configuration { .. } => {
                SyncError::permanent(message)
            }
        }
    }
}

/// Decrypted credential fields for one connection.
///
/// Values are wiped from memory on drop and never printed.
#[derive(Clone, Default)]
pub struct Credentials(BTreeMap<String, String>);

impl Drop for Credentials {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
    }
}

impl Credentials {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }

    /// Required credential field, or a configuration error naming it.
    pub fn require(&self, key: &str) -> Result<&str, ProviderError> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::configuration(format!("missing credential '{key}'")))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Everything an adapter needs to talk to the provider on behalf of one connection
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: Uuid,
    pub account_id: Uuid,
    pub provider_slug: String,
    pub credentials: Credentials,
    /// Non-secret provider settings (folder ids, regions, declared inventory)
    pub settings: Value,
}

impl ConnectionContext {
    /// Required string setting, or a configuration error naming it.
    pub fn setting_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::configuration(format!("missing setting '{key}'")))
    }
}

/// Authenticated session threaded through listing calls.
#[derive(Clone, PartialEq)]
pub struct Session {
    token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider scope the token is bound to (folder, project)
    pub scope: Option<String>,
}

impl Session {
    /// Session for providers that need no token exchange.
    pub fn anonymous() -> Self {
        Self {
            token: None,
            expires_at: None,
            scope: None,
        }
    }

    pub fn bearer<S: Into<String>>(token: S, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: Some(token.into()),
            expires_at,
            scope: None,
        }
    }

    pub fn with_scope<S: Into<String>>(mut self, scope: S) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn token(&self) -> Result<&str, ProviderError> {
        self.token
            .as_deref()
            .ok_or_else(|| ProviderError::Authentication {
                details: "session carries no token".to_string(),
            })
    }

    /// Whether the session stays valid for at least `lead` from `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - lead > now,
            None => true,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Typed provider-specific attribute that has no canonical slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Flag(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Flag(value)
    }
}

/// Capacity figure as the provider reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantityValue {
    Number(f64),
    Text(String),
}

/// One provider-native capacity attribute, e.g. `memory = "4294967296" B`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeQuantity {
    pub attribute: String,
    pub value: QuantityValue,
    /// Unit label (`B`, `MB`, `GiB`, `count`); empty when embedded in the value
    #[serde(default)]
    pub unit: String,
}

impl NativeQuantity {
    pub fn number<A: Into<String>, U: Into<String>>(attribute: A, value: f64, unit: U) -> Self {
        Self {
            attribute: attribute.into(),
            value: QuantityValue::Number(value),
            unit: unit.into(),
        }
    }

    pub fn text<A: Into<String>, V: Into<String>, U: Into<String>>(
        attribute: A,
        value: V,
        unit: U,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            value: QuantityValue::Text(value.into()),
            unit: unit.into(),
        }
    }
}

/// Provider-native resource record, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeRecord {
    /// Provider taxonomy kind, e.g. `compute.instance`, `os-volume`
    pub kind: String,
    pub native_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Provider status string
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub capacity: Vec<NativeQuantity>,
    /// Native id of the owning instance for attachable kinds
    #[serde(default)]
    pub attached_to: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub extra: BTreeMap<String, AttributeValue>,
}

impl NativeRecord {
    pub fn new<K: Into<String>, I: Into<String>>(kind: K, native_id: I) -> Self {
        Self {
            kind: kind.into(),
            native_id: native_id.into(),
            name: None,
            region: None,
            status: None,
            capacity: Vec::new(),
            attached_to: None,
            labels: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Billing period a provider-reported amount covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Hour,
    Day,
    Month,
}

/// Provider-reported spend for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBillingRecord {
    pub native_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub period: BillingPeriod,
}

/// Result of a billing listing. `NotSupported` is not the same as an empty list.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingRecords {
    Supported(Vec<NativeBillingRecord>),
    NotSupported,
}

impl BillingRecords {
    pub fn is_supported(&self) -> bool {
        matches!(self, BillingRecords::Supported(_))
    }

    pub fn records(&self) -> &[NativeBillingRecord] {
        match self {
            BillingRecords::Supported(records) => records,
            BillingRecords::NotSupported => &[],
        }
    }
}

/// Capability set implemented once per cloud provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Obtain a session for the connection.
    ///
    /// Idempotent: adapters with short-lived tokens return the cached session
    /// until it nears expiry and refresh it transparently.
    async fn authenticate(&self, ctx: &ConnectionContext) -> Result<Session, ProviderError>;

    /// List every resource visible to the session, provider-native shapes.
    async fn list_resources(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError>;

    /// List per-resource billing, or `NotSupported` for providers without a billing API.
    async fn list_billing_records(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<BillingRecords, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_maps_to_sync_error_kinds() {
        let auth: SyncError = ProviderError::Authentication {
            details: "expired".into(),
        }
        .into();
        assert_eq!(auth.kind, SyncErrorKind::Unauthorized);

        let limited: SyncError = ProviderError::RateLimited {
            retry_after: Some(30),
        }
        .into();
        assert_eq!(limited.kind, SyncErrorKind::ProviderUnavailable);
        assert_eq!(limited.details.unwrap()["retry_after_secs"], 30);

        let down: SyncError = ProviderError::Unavailable {
            status: 503,
            body: None,
        }
        .into();
        assert_eq!(down.kind, SyncErrorKind::ProviderUnavailable);

        let bad: SyncError = ProviderError::malformed("missing id").into();
        assert_eq!(bad.kind, SyncErrorKind::Permanent);
    }

    #[test]
    fn sync_error_serializes_with_type_tag() {
        let err = SyncError::unauthorized("token expired")
            .with_details(serde_json::json!({ "status": 401 }));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "unauthorized");
        assert_eq!(json["message"], "token expired");
        assert_eq!(json["details"]["status"], 401);

        let back: SyncError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(
            ProviderError::Network {
                details: "reset".into(),
                retryable: true
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::Authentication {
                details: "nope".into()
            }
            .is_retryable()
        );
        assert!(!ProviderError::configuration("x").is_retryable());
    }

    #[test]
    fn session_freshness_respects_lead_time() {
        let now = Utc::now();
        let session = Session::bearer("t", Some(now + Duration::minutes(10)));
        assert!(session.is_fresh(now, Duration::minutes(5)));
        assert!(!session.is_fresh(now, Duration::minutes(15)));
        assert!(Session::anonymous().is_fresh(now, Duration::hours(1)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials::new(BTreeMap::from([(
            "password".to_string(),
            "hunter2".to_string(),
        )]));
        assert!(!format!("{:?}", creds).contains("hunter2"));
        let session = Session::bearer("secret-token", None);
        assert!(!format!("{:?}", session).contains("secret-token"));
    }

    #[test]
    fn billing_not_supported_is_distinct_from_empty() {
        let empty = BillingRecords::Supported(Vec::new());
        assert!(empty.is_supported());
        assert!(!BillingRecords::NotSupported.is_supported());
        assert_ne!(empty, BillingRecords::NotSupported);
    }
}
