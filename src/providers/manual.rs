//! Manual inventory adapter
//!
//! For providers without an API (colocation, on-prem racks, small VPS hosts)
//! the inventory is declared in the connection settings:
//!
//! ```json
//! {
//!   "resources": [{ "kind": "server", "native_id": "rack-1", "capacity": [...] }],
//!   "billing": [{ "native_id": "rack-1", "amount": "450.00", "currency": "RUB", "period": "month" }]
//! }
//! ```
//!
//! A missing `billing` key means the provider has no billing source at all.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::providers::{
    AuthType, BillingRecords, ConnectionContext, NativeBillingRecord, NativeRecord,
    ProviderAdapter, ProviderError, ProviderMetadata, Registry, Session,
};

pub const MANUAL_PROVIDER_SLUG: &str = "manual";

#[derive(Debug, Default, Clone, Copy)]
pub struct ManualAdapter;

fn declared<T: DeserializeOwned>(
    ctx: &ConnectionContext,
    key: &str,
) -> Result<Option<Vec<T>>, ProviderError> {
    match ctx.settings.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ProviderError::configuration(format!("invalid declared {key}: {e}"))),
    }
}

#[async_trait]
impl ProviderAdapter for ManualAdapter {
    async fn authenticate(&self, _ctx: &ConnectionContext) -> Result<Session, ProviderError> {
        Ok(Session::anonymous())
    }

    async fn list_resources(
        &self,
        _session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError> {
        Ok(declared(ctx, "resources")?.unwrap_or_default())
    }

    async fn list_billing_records(
        &self,
        _session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<BillingRecords, ProviderError> {
        Ok(match declared::<NativeBillingRecord>(ctx, "billing")? {
            Some(records) => BillingRecords::Supported(records),
            None => BillingRecords::NotSupported,
        })
    }
}

/// Register the manual inventory adapter
pub fn register_manual_adapter(registry: &mut Registry) {
    registry.register(
        Arc::new(ManualAdapter),
        ProviderMetadata::new(MANUAL_PROVIDER_SLUG, "Manual inventory", AuthType::None, false),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BillingPeriod, Credentials};
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    fn context(settings: serde_json::Value) -> ConnectionContext {
        ConnectionContext {
            connection_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider_slug: MANUAL_PROVIDER_SLUG.to_string(),
            credentials: Credentials::default(),
            settings,
        }
    }

    #[tokio::test]
    async fn declared_inventory_is_listed() {
        let ctx = context(json!({
            "resources": [{
                "kind": "server",
                "native_id": "rack-1",
                "capacity": [{ "attribute": "vcpus", "value": 16, "unit": "count" }]
            }],
            "billing": [{ "native_id": "rack-1", "amount": "450", "currency": "RUB", "period": "month" }]
        }));
        let session = ManualAdapter.authenticate(&ctx).await.unwrap();

        let resources = ManualAdapter.list_resources(&session, &ctx).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].native_id, "rack-1");

        let billing = ManualAdapter
            .list_billing_records(&session, &ctx)
            .await
            .unwrap();
        assert_eq!(billing.records()[0].amount, Decimal::new(450, 0));
        assert_eq!(billing.records()[0].period, BillingPeriod::Month);
    }

    #[tokio::test]
    async fn absent_billing_is_not_supported() {
        let ctx = context(json!({ "resources": [] }));
        let billing = ManualAdapter
            .list_billing_records(&Session::anonymous(), &ctx)
            .await
            .unwrap();
        assert_eq!(billing, BillingRecords::NotSupported);

        let ctx = context(json!({ "billing": [] }));
        let billing = ManualAdapter
            .list_billing_records(&Session::anonymous(), &ctx)
            .await
            .unwrap();
        assert_eq!(billing, BillingRecords::Supported(vec![]));
    }

    #[tokio::test]
    async fn malformed_inventory_is_configuration_error() {
        let ctx = context(json!({ "resources": [{ "kind": "server" }] }));
        let err = ManualAdapter
            .list_resources(&Session::anonymous(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }
}
