//! Configuration loading for the cost synchronization service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CLOUDSPEND_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

const ENV_PREFIX: &str = "CLOUDSPEND_";

/// Application configuration derived from `CLOUDSPEND_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    /// Currency used when a provider or price table does not name one
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry_policy: RetryPolicyConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Bulk-sync scheduler parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    /// Run bulk syncs in the background (`CLOUDSPEND_BULK_SYNC_ENABLED`)
    #[serde(default)]
    pub bulk_sync_enabled: bool,
    /// Interval between bulk-sync runs (`CLOUDSPEND_BULK_SYNC_INTERVAL_SECONDS`)
    #[serde(default = "default_bulk_sync_interval_seconds")]
    pub bulk_sync_interval_seconds: u64,
    /// How often the scheduler wakes to check whether a run is due
    #[serde(default = "default_bulk_sync_tick_seconds")]
    pub tick_seconds: u64,
}

/// Retry policy for transient provider failures
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryPolicyConfig {
    /// Base backoff before the single retry, in seconds (default: 2)
    ///
    /// Environment variable: `CLOUDSPEND_RETRY_BASE_SECONDS`
    #[serde(default = "default_retry_base_seconds")]
    #[schema(example = 2)]
    pub base_seconds: u64,

    /// Upper bound for the backoff, including a provider's `Retry-After` (default: 60)
    ///
    /// Environment variable: `CLOUDSPEND_RETRY_MAX_SECONDS`
    #[serde(default = "default_retry_max_seconds")]
    #[schema(example = 60)]
    pub max_seconds: u64,

    /// Random factor applied to the backoff, `backoff * (1 ± jitter_factor)` (default: 0.1)
    ///
    /// Environment variable: `CLOUDSPEND_RETRY_JITTER_FACTOR`
    #[serde(default = "default_retry_jitter_factor")]
    #[schema(example = 0.1, minimum = 0.0, maximum = 1.0)]
    pub jitter_factor: f64,

    /// Provider-specific overrides keyed by provider slug
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_overrides: BTreeMap<String, RetryProviderOverride>,
}

/// Provider-specific retry policy overrides
///
/// Environment variables: `CLOUDSPEND_RETRY_OVERRIDE_{PROVIDER}_{BASE_SECONDS|MAX_SECONDS|JITTER_FACTOR}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryProviderOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_factor: Option<f64>,
}

/// Effective retry parameters for one provider after applying overrides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveRetryPolicy {
    pub base_seconds: u64,
    pub max_seconds: u64,
    pub jitter_factor: f64,
}

/// Per-connection sync parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Budget for one adapter call (authenticate, list resources, list billing)
    #[serde(default = "default_sync_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

/// Provider endpoint overrides and adapter HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProvidersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yandex_iam_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yandex_api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectel_identity_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectel_api_base: Option<String>,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_session_cache_capacity")]
    pub session_cache_capacity: usize,
    /// Refresh cached provider tokens this long before they expire
    #[serde(default = "default_session_refresh_lead_seconds")]
    pub session_refresh_lead_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            crypto_key: None,
            default_currency: default_currency(),
            scheduler: SchedulerConfig::default(),
            retry_policy: RetryPolicyConfig::default(),
            sync: SyncConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bulk_sync_enabled: false,
            bulk_sync_interval_seconds: default_bulk_sync_interval_seconds(),
            tick_seconds: default_bulk_sync_tick_seconds(),
        }
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            base_seconds: default_retry_base_seconds(),
            max_seconds: default_retry_max_seconds(),
            jitter_factor: default_retry_jitter_factor(),
            provider_overrides: BTreeMap::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: default_sync_fetch_timeout_seconds(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            yandex_iam_base: None,
            yandex_api_base: None,
            selectel_identity_base: None,
            selectel_api_base: None,
            http_timeout_seconds: default_http_timeout_seconds(),
            session_cache_capacity: default_session_cache_capacity(),
            session_refresh_lead_seconds: default_session_refresh_lead_seconds(),
        }
    }
}

impl RetryPolicyConfig {
    /// Validate retry policy bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_seconds > self.max_seconds {
            return Err(ConfigError::InvalidRetryBounds {
                base: self.base_seconds,
                max: self.max_seconds,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidRetryJitter {
                value: self.jitter_factor,
            });
        }

        for provider in self.provider_overrides.keys() {
            let effective = self.for_provider(provider);
            if effective.base_seconds > effective.max_seconds {
                return Err(ConfigError::InvalidRetryProviderBounds {
                    provider: provider.clone(),
                    base: effective.base_seconds,
                    max: effective.max_seconds,
                });
            }
            if !(0.0..=1.0).contains(&effective.jitter_factor) {
                return Err(ConfigError::InvalidRetryProviderJitter {
                    provider: provider.clone(),
                    value: effective.jitter_factor,
                });
            }
        }

        Ok(())
    }

    /// Resolve the policy for a provider slug, falling back to the global values.
    pub fn for_provider(&self, provider: &str) -> EffectiveRetryPolicy {
        let overrides = self.provider_overrides.get(provider);
        EffectiveRetryPolicy {
            base_seconds: overrides
                .and_then(|o| o.base_seconds)
                .unwrap_or(self.base_seconds),
            max_seconds: overrides
                .and_then(|o| o.max_seconds)
                .unwrap_or(self.max_seconds),
            jitter_factor: overrides
                .and_then(|o| o.jitter_factor)
                .unwrap_or(self.jitter_factor),
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_seconds < 10 || self.tick_seconds > 300 {
            return Err(ConfigError::InvalidSchedulerTickInterval {
                value: self.tick_seconds,
            });
        }

        if self.bulk_sync_interval_seconds < 300 || self.bulk_sync_interval_seconds > 604_800 {
            return Err(ConfigError::InvalidBulkSyncInterval {
                value: self.bulk_sync_interval_seconds,
            });
        }

        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_seconds == 0 || self.fetch_timeout_seconds > 3600 {
            return Err(ConfigError::InvalidFetchTimeout {
                value: self.fetch_timeout_seconds,
            });
        }
        Ok(())
    }
}

impl ProvidersConfig {
    /// Endpoint overrides must be absolute http(s) URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let overrides = [
            ("YANDEX_IAM_BASE", &self.yandex_iam_base),
            ("YANDEX_API_BASE", &self.yandex_api_base),
            ("SELECTEL_IDENTITY_BASE", &self.selectel_identity_base),
            ("SELECTEL_API_BASE", &self.selectel_api_base),
        ];
        for (name, value) in overrides {
            let Some(value) = value else { continue };
            let valid = url::Url::parse(value)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidProviderEndpoint {
                    name,
                    value: value.clone(),
                });
            }
        }
        if self.http_timeout_seconds == 0 {
            return Err(ConfigError::InvalidProviderHttpTimeout);
        }
        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        if let Some(at) = config.database_url.find('@') {
            // keep scheme and host, drop userinfo
            if let Some(scheme_end) = config.database_url.find("://") {
                config.database_url = format!(
                    "{}://[REDACTED]{}",
                    &config.database_url[..scheme_end],
                    &config.database_url[at..]
                );
            }
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            Some(_) => {}
            None => return Err(ConfigError::MissingCryptoKey),
        }

        if self.operator_tokens.is_empty() {
            return Err(ConfigError::MissingOperatorTokens);
        }

        if self.default_currency.len() != 3 {
            return Err(ConfigError::InvalidCurrency {
                value: self.default_currency.clone(),
            });
        }

        self.scheduler.validate()?;
        self.retry_policy.validate()?;
        self.sync.validate()?;
        self.providers.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/cloudspend".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_currency() -> String {
    "RUB".to_string()
}

fn default_bulk_sync_interval_seconds() -> u64 {
    86400 // daily
}

fn default_bulk_sync_tick_seconds() -> u64 {
    60
}

fn default_retry_base_seconds() -> u64 {
    2
}

fn default_retry_max_seconds() -> u64 {
    60
}

fn default_retry_jitter_factor() -> f64 {
    0.1
}

fn default_sync_fetch_timeout_seconds() -> u64 {
    300
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_session_cache_capacity() -> usize {
    256
}

fn default_session_refresh_lead_seconds() -> u64 {
    300
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error(
        "no operator tokens configured; set CLOUDSPEND_OPERATOR_TOKEN or CLOUDSPEND_OPERATOR_TOKENS"
    )]
    MissingOperatorTokens,
    #[error("crypto key is missing; set CLOUDSPEND_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("default currency must be a 3-letter ISO code, got '{value}'")]
    InvalidCurrency { value: String },
    #[error("scheduler tick interval must be between 10 and 300 seconds, got {value}")]
    InvalidSchedulerTickInterval { value: u64 },
    #[error("bulk sync interval must be between 300 and 604800 seconds, got {value}")]
    InvalidBulkSyncInterval { value: u64 },
    #[error("sync fetch timeout must be between 1 and 3600 seconds, got {value}")]
    InvalidFetchTimeout { value: u64 },
    #[error("provider endpoint {name} must be an absolute http(s) URL, got '{value}'")]
    InvalidProviderEndpoint { name: &'static str, value: String },
    #[error("provider HTTP timeout must be at least 1 second")]
    InvalidProviderHttpTimeout,
    #[error("retry base seconds ({base}) cannot be greater than max seconds ({max})")]
    InvalidRetryBounds { base: u64, max: u64 },
    #[error("retry jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRetryJitter { value: f64 },
    #[error("provider {provider} retry base seconds ({base}) cannot be greater than max seconds ({max})")]
    InvalidRetryProviderBounds {
        provider: String,
        base: u64,
        max: u64,
    },
    #[error("provider {provider} retry jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRetryProviderJitter { provider: String, value: f64 },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Loads configuration using layered `.env` files and `CLOUDSPEND_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let default_currency = layered
            .remove("DEFAULT_CURRENCY")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_uppercase())
            .unwrap_or_else(default_currency);

        // Single token or comma-separated list
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = layered.remove("OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let crypto_key = match layered.remove("CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(key_str.trim()).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        let scheduler = SchedulerConfig {
            bulk_sync_enabled: layered
                .remove("BULK_SYNC_ENABLED")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            bulk_sync_interval_seconds: layered
                .remove("BULK_SYNC_INTERVAL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_bulk_sync_interval_seconds),
            tick_seconds: layered
                .remove("BULK_SYNC_TICK_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_bulk_sync_tick_seconds),
        };

        let sync = SyncConfig {
            fetch_timeout_seconds: layered
                .remove("SYNC_FETCH_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_sync_fetch_timeout_seconds),
        };

        let providers = ProvidersConfig {
            yandex_iam_base: non_empty(layered.remove("YANDEX_IAM_BASE")),
            yandex_api_base: non_empty(layered.remove("YANDEX_API_BASE")),
            selectel_identity_base: non_empty(layered.remove("SELECTEL_IDENTITY_BASE")),
            selectel_api_base: non_empty(layered.remove("SELECTEL_API_BASE")),
            http_timeout_seconds: layered
                .remove("PROVIDER_HTTP_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_http_timeout_seconds),
            session_cache_capacity: layered
                .remove("SESSION_CACHE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_session_cache_capacity),
            session_refresh_lead_seconds: layered
                .remove("SESSION_REFRESH_LEAD_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_session_refresh_lead_seconds),
        };

        // RETRY_OVERRIDE_<PROVIDER>_<SETTING>
        let mut provider_overrides: BTreeMap<String, RetryProviderOverride> = BTreeMap::new();
        for (key, value) in &layered {
            let Some(suffix) = key.strip_prefix("RETRY_OVERRIDE_") else {
                continue;
            };
            let Some((provider, setting)) = suffix.split_once('_') else {
                continue;
            };
            let entry = provider_overrides
                .entry(provider.to_lowercase())
                .or_default();
            match setting {
                "BASE_SECONDS" => entry.base_seconds = value.parse().ok(),
                "MAX_SECONDS" => entry.max_seconds = value.parse().ok(),
                "JITTER_FACTOR" => entry.jitter_factor = value.parse().ok(),
                _ => {}
            }
        }

        let retry_policy = RetryPolicyConfig {
            base_seconds: layered
                .remove("RETRY_BASE_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_base_seconds),
            max_seconds: layered
                .remove("RETRY_MAX_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_max_seconds),
            jitter_factor: layered
                .remove("RETRY_JITTER_FACTOR")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_jitter_factor),
            provider_overrides,
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            operator_tokens,
            crypto_key,
            default_currency,
            scheduler,
            retry_policy,
            sync,
            providers,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            operator_tokens: vec!["op".to_string()],
            crypto_key: Some(vec![7u8; 32]),
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_needs_key_and_tokens() {
        assert!(matches!(
            AppConfig::default().validate(),
            Err(ConfigError::MissingCryptoKey)
        ));
        let config = AppConfig {
            crypto_key: Some(vec![0u8; 32]),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingOperatorTokens)
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn short_crypto_key_is_rejected() {
        let config = AppConfig {
            crypto_key: Some(vec![0u8; 16]),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCryptoKeyLength { length: 16 })
        ));
    }

    #[test]
    fn retry_policy_validation() {
        let inverted = RetryPolicyConfig {
            base_seconds: 100,
            max_seconds: 10,
            ..RetryPolicyConfig::default()
        };
        assert!(inverted.validate().is_err());

        let bad_jitter = RetryPolicyConfig {
            jitter_factor: 1.5,
            ..RetryPolicyConfig::default()
        };
        assert!(bad_jitter.validate().is_err());

        let mut provider_overrides = BTreeMap::new();
        provider_overrides.insert(
            "yandex".to_string(),
            RetryProviderOverride {
                base_seconds: Some(120),
                max_seconds: None,
                jitter_factor: None,
            },
        );
        let bad_override = RetryPolicyConfig {
            provider_overrides,
            ..RetryPolicyConfig::default()
        };
        assert!(matches!(
            bad_override.validate(),
            Err(ConfigError::InvalidRetryProviderBounds { .. })
        ));
    }

    #[test]
    fn provider_override_falls_back_to_global() {
        let mut provider_overrides = BTreeMap::new();
        provider_overrides.insert(
            "selectel".to_string(),
            RetryProviderOverride {
                base_seconds: Some(5),
                ..RetryProviderOverride::default()
            },
        );
        let policy = RetryPolicyConfig {
            provider_overrides,
            ..RetryPolicyConfig::default()
        };

        let selectel = policy.for_provider("selectel");
        assert_eq!(selectel.base_seconds, 5);
        assert_eq!(selectel.max_seconds, 60);
        assert_eq!(policy.for_provider("yandex").base_seconds, 2);
    }

    #[test]
    fn scheduler_bounds() {
        let too_fast = SchedulerConfig {
            tick_seconds: 1,
            ..SchedulerConfig::default()
        };
        assert!(too_fast.validate().is_err());

        let too_frequent = SchedulerConfig {
            bulk_sync_interval_seconds: 60,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            too_frequent.validate(),
            Err(ConfigError::InvalidBulkSyncInterval { value: 60 })
        ));
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let config = AppConfig {
            database_url: "postgresql://finops:hunter2@db:5432/cloudspend".to_string(),
            ..valid_config()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("@db:5432/cloudspend"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn provider_endpoint_overrides_must_be_urls() {
        let mut config = valid_config();
        config.providers.selectel_api_base = Some("api.selectel.local".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProviderEndpoint {
                name: "SELECTEL_API_BASE",
                ..
            })
        ));

        config.providers.selectel_api_base = Some("http://127.0.0.1:9000".to_string());
        assert!(config.validate().is_ok());
    }
}
