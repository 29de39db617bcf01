//! Provider registry
//!
//! Maps provider-type slugs to adapter implementations and their metadata.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::providers::{ProviderAdapter, ProviderError, ProviderMetadata};

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider '{name}' not found")]
    ProviderNotFound { name: String },
}

/// Provider registry that stores adapters and their metadata
#[derive(Clone)]
pub struct Registry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    metadata: HashMap<String, ProviderMetadata>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Build a registry with every built-in adapter wired to the configured endpoints
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::new();

        crate::providers::yandex::register_yandex_adapter(
            &mut registry,
            Arc::new(crate::providers::YandexAdapter::from_config(
                &config.providers,
            )?),
        );
        crate::providers::selectel::register_selectel_adapter(
            &mut registry,
            Arc::new(crate::providers::SelectelAdapter::from_config(
                &config.providers,
            )?),
        );
        crate::providers::manual::register_manual_adapter(&mut registry);

        info!(
            providers = ?registry.list_metadata().iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "Provider registry initialized"
        );
        Ok(registry)
    }

    /// Register a provider adapter with its metadata, replacing any previous entry
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>, metadata: ProviderMetadata) {
        let name = metadata.name.clone();
        self.adapters.insert(name.clone(), adapter);
        self.metadata.insert(name, metadata);
    }

    /// Get an adapter by provider-type slug
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>, RegistryError> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    /// Get metadata for all providers, sorted by name for stable ordering
    pub fn list_metadata(&self) -> Vec<ProviderMetadata> {
        let mut metadata: Vec<_> = self.metadata.values().cloned().collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }

    /// Get metadata for a specific provider
    pub fn get_metadata(&self, name: &str) -> Result<&ProviderMetadata, RegistryError> {
        self.metadata
            .get(name)
            .ok_or_else(|| RegistryError::ProviderNotFound {
                name: name.to_string(),
            })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        AuthType, BillingRecords, ConnectionContext, NativeRecord, Session,
    };
    use async_trait::async_trait;

    struct TestAdapter;

    #[async_trait]
    impl ProviderAdapter for TestAdapter {
        async fn authenticate(&self, _ctx: &ConnectionContext) -> Result<Session, ProviderError> {
            Ok(Session::anonymous())
        }

        async fn list_resources(
            &self,
            _session: &Session,
            _ctx: &ConnectionContext,
        ) -> Result<Vec<NativeRecord>, ProviderError> {
            Ok(vec![])
        }

        async fn list_billing_records(
            &self,
            _session: &Session,
            _ctx: &ConnectionContext,
        ) -> Result<BillingRecords, ProviderError> {
            Ok(BillingRecords::NotSupported)
        }
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = Registry::new();

        match registry.get("unknown") {
            Err(RegistryError::ProviderNotFound { name }) => assert_eq!(name, "unknown"),
            Ok(_) => panic!("Expected ProviderNotFound error"),
        }

        match registry.get_metadata("unknown") {
            Err(RegistryError::ProviderNotFound { name }) => assert_eq!(name, "unknown"),
            Ok(_) => panic!("Expected ProviderNotFound error"),
        }
    }

    #[test]
    fn test_registry_list_ordering() {
        let mut registry = Registry::new();

        for name in ["zebra", "apple", "banana"] {
            registry.register(
                Arc::new(TestAdapter),
                ProviderMetadata::new(name, name, AuthType::ApiKey, false),
            );
        }

        let metadata = registry.list_metadata();
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata[0].name, "apple");
        assert_eq!(metadata[1].name, "banana");
        assert_eq!(metadata[2].name, "zebra");
    }

    #[test]
    fn test_registry_replaces_existing_entry() {
        let mut registry = Registry::new();
        registry.register(
            Arc::new(TestAdapter),
            ProviderMetadata::new("x", "X v1", AuthType::ApiKey, false),
        );
        registry.register(
            Arc::new(TestAdapter),
            ProviderMetadata::new("x", "X v2", AuthType::ApiKey, true),
        );

        let metadata = registry.get_metadata("x").unwrap();
        assert_eq!(metadata.display_name, "X v2");
        assert!(metadata.billing_api);
        assert_eq!(registry.list_metadata().len(), 1);
    }

    #[test]
    fn test_registry_from_default_config_has_builtins() {
        let config = AppConfig::default();
        let registry = Registry::from_config(&config).expect("registry builds");

        let names: Vec<String> = registry
            .list_metadata()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["manual", "selectel", "yandex"]);
        assert!(registry.get_metadata("selectel").unwrap().billing_api);
        assert!(!registry.get_metadata("yandex").unwrap().billing_api);
    }
}
