//! Cloud provider adapters
//!
//! Every provider is reached through [`ProviderAdapter`]; the [`Registry`]
//! maps provider-type slugs to adapter instances.

pub mod http;
pub mod manual;
pub mod metadata;
pub mod registry;
pub mod selectel;
pub mod session_cache;
pub mod trait_;
pub mod yandex;

pub use manual::ManualAdapter;
pub use metadata::{AuthType, ProviderMetadata};
pub use registry::{Registry, RegistryError};
pub use selectel::SelectelAdapter;
pub use session_cache::SessionCache;
pub use trait_::{
    AttributeValue, BillingPeriod, BillingRecords, ConnectionContext, Credentials,
    NativeBillingRecord, NativeQuantity, NativeRecord, ProviderAdapter, ProviderError,
    QuantityValue, Session, SyncError, SyncErrorKind,
};
pub use yandex::YandexAdapter;
