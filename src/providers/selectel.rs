//! Selectel adapter
//!
//! OpenStack-style provider: a Keystone project token (returned in the
//! `X-Subject-Token` header), Nova servers with embedded flavors, Cinder
//! volumes with attachments, and a per-resource consumption endpoint that
//! serves as authoritative billing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ProvidersConfig;
use crate::providers::http::{MAX_PAGES, build_client, check_status, pagination_limit_exceeded};
use crate::providers::session_cache::SessionCache;
use crate::providers::{
    AttributeValue, AuthType, BillingPeriod, BillingRecords, ConnectionContext,
    NativeBillingRecord, NativeQuantity, NativeRecord, ProviderAdapter, ProviderError,
    ProviderMetadata, Registry, Session,
};

pub const SELECTEL_PROVIDER_SLUG: &str = "selectel";

const PAGE_LIMIT: usize = 100;
const COMPUTE_MICROVERSION: &str = "compute 2.79";

#[derive(Debug, Clone)]
pub struct SelectelEndpoints {
    pub identity: String,
    /// Regional API base; `None` means `https://{region}.cloud.api.selcloud.ru`
    pub regional: Option<String>,
    pub billing: String,
}

impl SelectelEndpoints {
    pub fn public() -> Self {
        Self {
            identity: "https://cloud.api.selcloud.ru/identity".to_string(),
            regional: None,
            billing: "https://api.selectel.ru/billing".to_string(),
        }
    }

    /// Route identity, regional and billing APIs through one base URL.
    pub fn single_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            identity: format!("{base}/identity"),
            regional: Some(base.to_string()),
            billing: format!("{base}/billing"),
        }
    }

    fn regional_base(&self, region: &str) -> String {
        match &self.regional {
            Some(base) => base.clone(),
            None => format!("https://{region}.cloud.api.selcloud.ru"),
        }
    }
}

pub struct SelectelAdapter {
    client: Client,
    endpoints: SelectelEndpoints,
    sessions: SessionCache,
}

impl SelectelAdapter {
    pub fn new(client: Client, endpoints: SelectelEndpoints, sessions: SessionCache) -> Self {
        Self {
            client,
            endpoints,
            sessions,
        }
    }

    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut endpoints = match &config.selectel_api_base {
            Some(base) => SelectelEndpoints::single_base(base),
            None => SelectelEndpoints::public(),
        };
        if let Some(identity) = &config.selectel_identity_base {
            endpoints.identity = identity.trim_end_matches('/').to_string();
        }
        Ok(Self::new(
            build_client(StdDuration::from_secs(config.http_timeout_seconds))?,
            endpoints,
            SessionCache::new(
                config.session_cache_capacity,
                Duration::seconds(config.session_refresh_lead_seconds as i64),
            ),
        ))
    }

    async fn issue_token(&self, ctx: &ConnectionContext) -> Result<Session, ProviderError> {
        #[derive(Deserialize)]
        struct TokenBody {
            token: TokenInfo,
        }
        #[derive(Deserialize)]
        struct TokenInfo {
            expires_at: DateTime<Utc>,
        }

        let username = ctx.credentials.require("username")?;
        let password = ctx.credentials.require("password")?;
        let account_id = ctx.setting_str("account_id")?;
        let project_id = ctx.setting_str("project_id")?;

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": username,
                            "domain": { "name": account_id },
                            "password": password,
                        }
                    }
                },
                "scope": { "project": { "id": project_id } }
            }
        });

        let resp = self
            .client
            .post(format!("{}/v3/auth/tokens", self.endpoints.identity))
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let token = resp
            .headers()
            .get("X-Subject-Token")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::malformed("missing X-Subject-Token header"))?;
        let info: TokenBody = resp.json().await?;

        Ok(Session::bearer(token, Some(info.token.expires_at)).with_scope(project_id))
    }

    fn project_id<'a>(
        &self,
        session: &'a Session,
        ctx: &'a ConnectionContext,
    ) -> Result<&'a str, ProviderError> {
        match session.scope.as_deref() {
            Some(scope) => Ok(scope),
            None => ctx.setting_str("project_id"),
        }
    }

    /// Marker-paginated OpenStack listing.
    async fn list_marker_paged<T, F>(
        &self,
        session: &Session,
        url: &str,
        field: &str,
        id_of: F,
    ) -> Result<Vec<T>, ProviderError>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&T) -> String,
    {
        let token = session.token()?;
        let mut items: Vec<T> = Vec::new();
        let mut marker: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(m) = &marker {
                query.push(("marker", m.clone()));
            }

            let resp = self
                .client
                .get(url)
                .header("X-Auth-Token", token)
                .header("OpenStack-API-Version", COMPUTE_MICROVERSION)
                .query(&query)
                .send()
                .await?;
            let mut body: serde_json::Value = check_status(resp).await?.json().await?;
            let page: Vec<T> = match body.get_mut(field).map(serde_json::Value::take) {
                Some(array) => serde_json::from_value(array)
                    .map_err(|e| ProviderError::malformed(format!("{field}: {e}")))?,
                None => Vec::new(),
            };

            let full_page = page.len() >= PAGE_LIMIT;
            marker = page.last().map(&id_of);
            items.extend(page);
            if !full_page {
                return Ok(items);
            }
        }

        Err(pagination_limit_exceeded(url))
    }

    /// Drop a cached token the provider rejected and issue a new one. A
    /// token already renewed since `rejected` was handed out is reused.
    async fn reissue(
        &self,
        rejected: &Session,
        ctx: &ConnectionContext,
        details: &str,
    ) -> Result<Session, ProviderError> {
        if let Some(current) = self.sessions.get_fresh(&ctx.connection_id).await
            && current != *rejected
        {
            return Ok(current);
        }
        warn!(
            connection_id = %ctx.connection_id,
            details,
            "Project token rejected, issuing a new one"
        );
        self.sessions.invalidate(&ctx.connection_id).await;
        self.authenticate(ctx).await
    }

    async fn list_project(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError> {
        let region = ctx.setting_str("region")?;
        let project_id = self.project_id(session, ctx)?;
        let base = self.endpoints.regional_base(region);

        let servers: Vec<Server> = self
            .list_marker_paged(
                session,
                &format!("{base}/compute/v2.1/servers/detail"),
                "servers",
                |s: &Server| s.id.clone(),
            )
            .await?;
        let volumes: Vec<Volume> = self
            .list_marker_paged(
                session,
                &format!("{base}/volume/v3/{project_id}/volumes/detail"),
                "volumes",
                |v: &Volume| v.id.clone(),
            )
            .await?;

        info!(
            connection_id = %ctx.connection_id,
            region,
            servers = servers.len(),
            volumes = volumes.len(),
            "Listed Selectel resources"
        );

        let mut records: Vec<NativeRecord> = servers.into_iter().map(server_record).collect();
        records.extend(volumes.into_iter().map(volume_record));
        Ok(records)
    }

    async fn consumption(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<BillingRecords, ProviderError> {
        #[derive(Deserialize)]
        struct Consumption {
            #[serde(default)]
            items: Vec<ConsumptionItem>,
        }

        let project_id = self.project_id(session, ctx)?;
        let resp = self
            .client
            .get(format!("{}/v1/cloud/consumption", self.endpoints.billing))
            .header("X-Auth-Token", session.token()?)
            .query(&[("project_id", project_id), ("period", "day")])
            .send()
            .await?;
        let consumption: Consumption = check_status(resp).await?.json().await?;

        let mut records = Vec::with_capacity(consumption.items.len());
        for item in consumption.items {
            if item.amount.is_sign_negative() {
                warn!(
                    resource_id = %item.resource_id,
                    amount = %item.amount,
                    "Ignoring negative consumption entry"
                );
                continue;
            }
            records.push(NativeBillingRecord {
                native_id: item.resource_id,
                amount: item.amount,
                currency: item.currency.to_uppercase(),
                period: item.period,
            });
        }
        Ok(BillingRecords::Supported(records))
    }
}

#[derive(Debug, Deserialize)]
struct Server {
    id: String,
    name: Option<String>,
    status: Option<String>,
    #[serde(rename = "OS-EXT-AZ:availability_zone")]
    availability_zone: Option<String>,
    flavor: Flavor,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Flavor {
    vcpus: u32,
    /// MB
    ram: u64,
    /// GB of local disk
    #[serde(default)]
    disk: u64,
    original_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    name: Option<String>,
    status: Option<String>,
    availability_zone: Option<String>,
    /// GB
    size: u64,
    volume_type: Option<String>,
    #[serde(default)]
    attachments: Vec<VolumeAttachment>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct VolumeAttachment {
    server_id: String,
}

#[derive(Debug, Deserialize)]
struct ConsumptionItem {
    resource_id: String,
    amount: Decimal,
    currency: String,
    #[serde(default = "default_consumption_period")]
    period: BillingPeriod,
}

fn default_consumption_period() -> BillingPeriod {
    BillingPeriod::Day
}

fn server_record(server: Server) -> NativeRecord {
    let mut record = NativeRecord::new("server", server.id);
    record.name = server.name;
    record.region = server.availability_zone;
    record.status = server.status;
    record.labels = server.metadata;
    record.capacity.push(NativeQuantity::number(
        "vcpus",
        f64::from(server.flavor.vcpus),
        "count",
    ));
    record
        .capacity
        .push(NativeQuantity::number("ram", server.flavor.ram as f64, "MB"));
    if server.flavor.disk > 0 {
        record.capacity.push(NativeQuantity::number(
            "disk",
            server.flavor.disk as f64,
            "GB",
        ));
    }
    if let Some(flavor) = server.flavor.original_name {
        record
            .extra
            .insert("flavor".to_string(), AttributeValue::Text(flavor));
    }
    record
}

fn volume_record(volume: Volume) -> NativeRecord {
    let mut record = NativeRecord::new("volume", volume.id);
    record.name = volume.name;
    record.region = volume.availability_zone;
    record.status = volume.status;
    record.labels = volume.metadata;
    record.attached_to = volume.attachments.into_iter().next().map(|a| a.server_id);
    record
        .capacity
        .push(NativeQuantity::number("size", volume.size as f64, "GB"));
    if let Some(volume_type) = volume.volume_type {
        // Types look like `fast.ru-3a`; the class is the part before the zone.
        let class = volume_type
            .split('.')
            .next()
            .unwrap_or(volume_type.as_str())
            .to_string();
        record
            .extra
            .insert("disk_type".to_string(), AttributeValue::Text(class));
    }
    record
}

#[async_trait]
impl ProviderAdapter for SelectelAdapter {
    async fn authenticate(&self, ctx: &ConnectionContext) -> Result<Session, ProviderError> {
        if let Some(session) = self.sessions.get_fresh(&ctx.connection_id).await {
            return Ok(session);
        }

        let session = self.issue_token(ctx).await?;
        debug!(
            connection_id = %ctx.connection_id,
            expires_at = ?session.expires_at,
            "Issued Selectel project token"
        );
        self.sessions.put(ctx.connection_id, session.clone()).await;
        Ok(session)
    }

    async fn list_resources(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError> {
        match self.list_project(session, ctx).await {
            Err(ProviderError::Authentication { details }) => {
                let session = self.reissue(session, ctx, &details).await?;
                self.list_project(&session, ctx).await
            }
            other => other,
        }
    }

    async fn list_billing_records(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<BillingRecords, ProviderError> {
        match self.consumption(session, ctx).await {
            Err(ProviderError::Authentication { details }) => {
                let session = self.reissue(session, ctx, &details).await?;
                self.consumption(&session, ctx).await
            }
            other => other,
        }
    }
}

/// Register the Selectel adapter
pub fn register_selectel_adapter(registry: &mut Registry, adapter: Arc<SelectelAdapter>) {
    registry.register(
        adapter,
        ProviderMetadata::new(SELECTEL_PROVIDER_SLUG, "Selectel", AuthType::Password, true),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Credentials;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> SelectelAdapter {
        SelectelAdapter::new(
            Client::new(),
            SelectelEndpoints::single_base(base),
            SessionCache::new(8, Duration::minutes(5)),
        )
    }

    fn context() -> ConnectionContext {
        ConnectionContext {
            connection_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider_slug: SELECTEL_PROVIDER_SLUG.to_string(),
            credentials: Credentials::new(BTreeMap::from([
                ("username".to_string(), "svc-finops".to_string()),
                ("password".to_string(), "s3cret".to_string()),
            ])),
            settings: json!({ "account_id": "123456", "project_id": "prj-1", "region": "ru-3" }),
        }
    }

    async fn mount_keystone(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/identity/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "gAAAA-token")
                    .set_body_json(json!({
                        "token": { "expires_at": (Utc::now() + Duration::hours(24)).to_rfc3339() }
                    })),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn token_comes_from_subject_header() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        assert_eq!(session.token().unwrap(), "gAAAA-token");
        assert_eq!(session.scope.as_deref(), Some("prj-1"));

        // cached on the second call
        adapter.authenticate(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_password_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .authenticate(&context())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Authentication { .. }));
    }

    #[tokio::test]
    async fn lists_servers_and_volumes() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;
        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .and(header("X-Auth-Token", "gAAAA-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{
                    "id": "srv-1",
                    "name": "db",
                    "status": "ACTIVE",
                    "OS-EXT-AZ:availability_zone": "ru-3a",
                    "flavor": { "vcpus": 2, "ram": 4096, "disk": 0, "original_name": "SL1.2-4096" }
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/volume/v3/prj-1/volumes/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "volumes": [{
                    "id": "vol-1",
                    "status": "in-use",
                    "availability_zone": "ru-3a",
                    "size": 20,
                    "volume_type": "fast.ru-3a",
                    "attachments": [{ "server_id": "srv-1" }]
                }]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let records = adapter.list_resources(&session, &ctx).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "server");
        assert_eq!(records[0].capacity.len(), 2);
        assert_eq!(records[1].attached_to.as_deref(), Some("srv-1"));
        assert_eq!(
            records[1].extra.get("disk_type"),
            Some(&AttributeValue::from("fast"))
        );
    }

    #[tokio::test]
    async fn consumption_becomes_billing_records() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;
        Mock::given(method("GET"))
            .and(path("/billing/v1/cloud/consumption"))
            .and(query_param("project_id", "prj-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "resource_id": "srv-1", "amount": "100.00", "currency": "rub" },
                    { "resource_id": "vol-1", "amount": "0.50", "currency": "rub", "period": "hour" }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let billing = adapter.list_billing_records(&session, &ctx).await.unwrap();

        let records = billing.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, Decimal::new(10000, 2));
        assert_eq!(records[0].currency, "RUB");
        assert_eq!(records[0].period, BillingPeriod::Day);
        assert_eq!(records[1].period, BillingPeriod::Hour);
    }

    #[tokio::test]
    async fn full_pages_past_the_limit_are_an_error() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;
        let page: Vec<serde_json::Value> = (0..PAGE_LIMIT)
            .map(|i| {
                json!({
                    "id": format!("srv-{i}"),
                    "flavor": { "vcpus": 1, "ram": 1024 }
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "servers": page })))
            .expect(MAX_PAGES as u64)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let err = adapter.list_resources(&session, &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn billing_rejection_reissues_token_once_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", "gAAAA-token")
                    .set_body_json(json!({
                        "token": { "expires_at": (Utc::now() + Duration::hours(24)).to_rfc3339() }
                    })),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/billing/v1/cloud/consumption"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let err = adapter
            .list_billing_records(&session, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Authentication { .. }));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;
        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let err = adapter.list_resources(&session, &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
