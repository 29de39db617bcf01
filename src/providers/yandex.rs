//! Yandex Cloud adapter
//!
//! Exchanges an OAuth token for a short-lived IAM token and lists compute
//! instances, disks, VPC networks and managed PostgreSQL clusters in one
//! folder. Yandex Cloud has no per-resource billing API, so billing is
//! reported as `NotSupported`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::ProvidersConfig;
use crate::providers::http::{MAX_PAGES, build_client, check_status, pagination_limit_exceeded};
use crate::providers::session_cache::SessionCache;
use crate::providers::{
    AttributeValue, AuthType, BillingRecords, ConnectionContext, NativeQuantity, NativeRecord,
    ProviderAdapter, ProviderError, ProviderMetadata, Registry, Session,
};

pub const YANDEX_PROVIDER_SLUG: &str = "yandex";

const PAGE_SIZE: u32 = 1000;

/// Managed database presets: (vCPU, RAM GiB)
const MDB_PRESETS: &[(&str, u32, u32)] = &[
    ("b2.nano", 2, 2),
    ("b2.micro", 2, 4),
    ("b2.medium", 2, 8),
    ("s2.micro", 2, 8),
    ("s2.small", 4, 16),
    ("s2.medium", 8, 32),
    ("s2.large", 12, 48),
    ("s3-c2-m8", 2, 8),
    ("s3-c4-m16", 4, 16),
    ("s3-c8-m32", 8, 32),
];

/// Service endpoints; every base may point at a proxy or a test server.
#[derive(Debug, Clone)]
pub struct YandexEndpoints {
    pub iam: String,
    pub compute: String,
    pub vpc: String,
    pub mdb: String,
}

impl YandexEndpoints {
    pub fn public() -> Self {
        Self {
            iam: "https://iam.api.cloud.yandex.net".to_string(),
            compute: "https://compute.api.cloud.yandex.net".to_string(),
            vpc: "https://vpc.api.cloud.yandex.net".to_string(),
            mdb: "https://mdb.api.cloud.yandex.net".to_string(),
        }
    }

    /// Route every service through one base URL.
    pub fn single_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            iam: base.clone(),
            compute: base.clone(),
            vpc: base.clone(),
            mdb: base,
        }
    }
}

pub struct YandexAdapter {
    client: Client,
    endpoints: YandexEndpoints,
    sessions: SessionCache,
}

impl YandexAdapter {
    pub fn new(client: Client, endpoints: YandexEndpoints, sessions: SessionCache) -> Self {
        Self {
            client,
            endpoints,
            sessions,
        }
    }

    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut endpoints = match &config.yandex_api_base {
            Some(base) => YandexEndpoints::single_base(base),
            None => YandexEndpoints::public(),
        };
        if let Some(iam) = &config.yandex_iam_base {
            endpoints.iam = iam.trim_end_matches('/').to_string();
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

    async fn exchange_token(&self, ctx: &ConnectionContext) -> Result<Session, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct IamToken {
            iam_token: String,
            expires_at: DateTime<Utc>,
        }

        let oauth_token = ctx.credentials.require("oauth_token")?;
        let folder_id = ctx.setting_str("folder_id")?;
        let url = format!("{}/iam/v1/tokens", self.endpoints.iam);

        let resp = self
            .client
            .post(&url)
            .json(&json!({ "yandexPassportOauthToken": oauth_token }))
            .send()
            .await?;
        let resp = check_status(resp).await.map_err(|err| match err {
            ProviderError::Rejected { status, body } => ProviderError::Authentication {
                details: format!(
                    "IAM token exchange rejected (HTTP {status}): {}",
                    body.unwrap_or_default()
                ),
            },
            other => other,
        })?;
        let token: IamToken = resp.json().await?;

        Ok(Session::bearer(token.iam_token, Some(token.expires_at)).with_scope(folder_id))
    }

    /// Walk a `pageToken`-paginated listing and decode the items under `field`.
    async fn list_paged<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: &str,
        folder_id: &str,
        field: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let token = session.token()?;
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, String)> = vec![
                ("folderId", folder_id.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(page) = &page_token {
                query.push(("pageToken", page.clone()));
            }

            let resp = self
                .client
                .get(url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await?;
            let mut body: Value = check_status(resp).await?.json().await?;

            if let Some(array) = body.get_mut(field).map(Value::take) {
                let page: Vec<T> = serde_json::from_value(array)
                    .map_err(|e| ProviderError::malformed(format!("{field}: {e}")))?;
                items.extend(page);
            }

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
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
            "IAM token rejected, issuing a new one"
        );
        self.sessions.invalidate(&ctx.connection_id).await;
        self.authenticate(ctx).await
    }

    async fn list_folder(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError> {
        let folder_id = match &session.scope {
            Some(scope) => scope.clone(),
            None => ctx.setting_str("folder_id")?.to_string(),
        };

        let compute = &self.endpoints.compute;
        let instances: Vec<Instance> = self
            .list_paged(
                session,
                &format!("{compute}/compute/v1/instances"),
                &folder_id,
                "instances",
            )
            .await?;
        let disks: Vec<Disk> = self
            .list_paged(
                session,
                &format!("{compute}/compute/v1/disks"),
                &folder_id,
                "disks",
            )
            .await?;
        let networks: Vec<Network> = self
            .list_paged(
                session,
                &format!("{}/vpc/v1/networks", self.endpoints.vpc),
                &folder_id,
                "networks",
            )
            .await?;
        let clusters: Vec<Cluster> = self
            .list_paged(
                session,
                &format!("{}/managed-postgresql/v1/clusters", self.endpoints.mdb),
                &folder_id,
                "clusters",
            )
            .await?;

        info!(
            connection_id = %ctx.connection_id,
            folder_id = %folder_id,
            instances = instances.len(),
            disks = disks.len(),
            networks = networks.len(),
            clusters = clusters.len(),
            "Listed Yandex Cloud resources"
        );

        let mut records = Vec::with_capacity(
            instances.len() + disks.len() + networks.len() + clusters.len(),
        );
        records.extend(instances.into_iter().map(instance_record));
        records.extend(disks.into_iter().map(disk_record));
        records.extend(networks.into_iter().map(network_record));
        records.extend(clusters.into_iter().map(cluster_record));
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    id: String,
    name: Option<String>,
    zone_id: Option<String>,
    platform_id: Option<String>,
    status: Option<String>,
    resources: InstanceResources,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceResources {
    memory: String,
    cores: String,
    core_fraction: Option<String>,
    gpus: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Disk {
    id: String,
    name: Option<String>,
    zone_id: Option<String>,
    type_id: Option<String>,
    size: String,
    status: Option<String>,
    #[serde(default)]
    instance_ids: Vec<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Network {
    id: String,
    name: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cluster {
    id: String,
    name: Option<String>,
    environment: Option<String>,
    status: Option<String>,
    config: Option<ClusterConfig>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfig {
    resources: Option<ClusterResources>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterResources {
    resource_preset_id: Option<String>,
    disk_size: Option<String>,
    disk_type_id: Option<String>,
}

fn instance_record(instance: Instance) -> NativeRecord {
    let mut record = NativeRecord::new("compute.instance", instance.id);
    record.name = instance.name;
    record.region = instance.zone_id;
    record.status = instance.status;
    record.labels = instance.labels;
    record
        .capacity
        .push(NativeQuantity::text("cores", instance.resources.cores, "count"));
    record
        .capacity
        .push(NativeQuantity::text("memory", instance.resources.memory, "B"));
    if let Some(gpus) = instance.resources.gpus.filter(|g| g != "0") {
        record.capacity.push(NativeQuantity::text("gpus", gpus, "count"));
    }
    if let Some(platform) = instance.platform_id {
        record
            .extra
            .insert("platform_id".to_string(), AttributeValue::Text(platform));
    }
    if let Some(fraction) = instance
        .resources
        .core_fraction
        .and_then(|f| f.parse::<i64>().ok())
    {
        record
            .extra
            .insert("core_fraction".to_string(), AttributeValue::Integer(fraction));
    }
    record
}

fn disk_record(disk: Disk) -> NativeRecord {
    let mut record = NativeRecord::new("compute.disk", disk.id);
    record.name = disk.name;
    record.region = disk.zone_id;
    record.status = disk.status;
    record.labels = disk.labels;
    record.attached_to = disk.instance_ids.into_iter().next();
    record
        .capacity
        .push(NativeQuantity::text("storage", disk.size, "B"));
    if let Some(disk_type) = disk.type_id {
        record
            .extra
            .insert("disk_type".to_string(), AttributeValue::Text(disk_type));
    }
    record
}

fn network_record(network: Network) -> NativeRecord {
    let mut record = NativeRecord::new("vpc.network", network.id);
    record.name = network.name;
    record.labels = network.labels;
    record
}

fn cluster_record(cluster: Cluster) -> NativeRecord {
    let mut record = NativeRecord::new("mdb.postgresql.cluster", cluster.id);
    record.name = cluster.name;
    record.status = cluster.status;
    record.labels = cluster.labels;
    record.extra.insert(
        "service_family".to_string(),
        AttributeValue::from("managed_postgresql"),
    );
    if let Some(environment) = cluster.environment {
        record
            .extra
            .insert("environment".to_string(), AttributeValue::Text(environment));
    }

    let resources = cluster.config.and_then(|c| c.resources);
    if let Some(resources) = resources {
        if let Some(preset) = resources.resource_preset_id {
            if let Some((_, cores, ram_gib)) = MDB_PRESETS.iter().find(|(id, _, _)| *id == preset)
            {
                record
                    .capacity
                    .push(NativeQuantity::number("cores", f64::from(*cores), "count"));
                record
                    .capacity
                    .push(NativeQuantity::number("memory", f64::from(*ram_gib), "GiB"));
            }
            record
                .extra
                .insert("resource_preset".to_string(), AttributeValue::Text(preset));
        }
        if let Some(size) = resources.disk_size {
            record.capacity.push(NativeQuantity::text("storage", size, "B"));
        }
        if let Some(disk_type) = resources.disk_type_id {
            record
                .extra
                .insert("disk_type".to_string(), AttributeValue::Text(disk_type));
        }
    }
    record
}

#[async_trait]
impl ProviderAdapter for YandexAdapter {
    async fn authenticate(&self, ctx: &ConnectionContext) -> Result<Session, ProviderError> {
        if let Some(session) = self.sessions.get_fresh(&ctx.connection_id).await {
            return Ok(session);
        }

        let session = self.exchange_token(ctx).await?;
        debug!(
            connection_id = %ctx.connection_id,
            expires_at = ?session.expires_at,
            "Issued Yandex IAM token"
        );
        self.sessions.put(ctx.connection_id, session.clone()).await;
        Ok(session)
    }

    /// A rejected token is re-issued once before the failure surfaces.
    async fn list_resources(
        &self,
        session: &Session,
        ctx: &ConnectionContext,
    ) -> Result<Vec<NativeRecord>, ProviderError> {
        match self.list_folder(session, ctx).await {
            Err(ProviderError::Authentication { details }) => {
                let session = self.reissue(session, ctx, &details).await?;
                self.list_folder(&session, ctx).await
            }
            other => other,
        }
    }

    async fn list_billing_records(
        &self,
        _session: &Session,
        _ctx: &ConnectionContext,
    ) -> Result<BillingRecords, ProviderError> {
        Ok(BillingRecords::NotSupported)
    }
}

/// Register the Yandex Cloud adapter
pub fn register_yandex_adapter(registry: &mut Registry, adapter: Arc<YandexAdapter>) {
    registry.register(
        adapter,
        ProviderMetadata::new(
            YANDEX_PROVIDER_SLUG,
            "Yandex Cloud",
            AuthType::OauthExchange,
            false,
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Credentials, QuantityValue};
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> YandexAdapter {
        YandexAdapter::new(
            Client::new(),
            YandexEndpoints::single_base(base),
            SessionCache::new(8, Duration::minutes(5)),
        )
    }

    fn context() -> ConnectionContext {
        ConnectionContext {
            connection_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider_slug: YANDEX_PROVIDER_SLUG.to_string(),
            credentials: Credentials::new(BTreeMap::from([(
                "oauth_token".to_string(),
                "y0_oauth".to_string(),
            )])),
            settings: json!({ "folder_id": "b1gfolder" }),
        }
    }

    async fn mount_iam(server: &MockServer, expect: u64) {
        Mock::given(method("POST"))
            .and(path("/iam/v1/tokens"))
            .and(body_json(json!({ "yandexPassportOauthToken": "y0_oauth" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "iamToken": "t1.iam",
                "expiresAt": (Utc::now() + Duration::hours(12)).to_rfc3339(),
            })))
            .expect(expect)
            .mount(server)
            .await;
    }

    async fn mount_empty(server: &MockServer, route: &str, field: &str) {
        let mut body = serde_json::Map::new();
        body.insert(field.to_string(), json!([]));
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Object(body)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn authenticate_caches_iam_token_per_connection() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let first = adapter.authenticate(&ctx).await.unwrap();
        let second = adapter.authenticate(&ctx).await.unwrap();

        assert_eq!(first.token().unwrap(), "t1.iam");
        assert_eq!(first, second);
        assert_eq!(first.scope.as_deref(), Some("b1gfolder"));
    }

    #[tokio::test]
    async fn rejected_oauth_token_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/iam/v1/tokens"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .authenticate(&context())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Authentication { .. }));
    }

    #[tokio::test]
    async fn lists_instances_and_attached_disks_across_pages() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/instances"))
            .and(header("authorization", "Bearer t1.iam"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instances": [{
                    "id": "vm-2",
                    "name": "worker",
                    "zoneId": "ru-central1-b",
                    "platformId": "standard-v3",
                    "status": "STOPPED",
                    "resources": { "memory": "2147483648", "cores": "2", "coreFraction": "20" }
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/instances"))
            .and(query_param("folderId", "b1gfolder"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instances": [{
                    "id": "vm-1",
                    "name": "web",
                    "zoneId": "ru-central1-a",
                    "platformId": "standard-v3",
                    "status": "RUNNING",
                    "resources": { "memory": "4294967296", "cores": "2", "coreFraction": "100" },
                    "labels": { "env": "prod" }
                }],
                "nextPageToken": "p2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/disks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "disks": [
                    { "id": "d-1", "typeId": "network-ssd", "size": "21474836480", "status": "READY", "instanceIds": ["vm-1"] },
                    { "id": "d-2", "typeId": "network-hdd", "size": "10737418240", "status": "READY" }
                ]
            })))
            .mount(&server)
            .await;
        mount_empty(&server, "/vpc/v1/networks", "networks").await;
        mount_empty(&server, "/managed-postgresql/v1/clusters", "clusters").await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let records = adapter.list_resources(&session, &ctx).await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.native_id.as_str()).collect();
        assert_eq!(ids, vec!["vm-1", "vm-2", "d-1", "d-2"]);

        let web = &records[0];
        assert_eq!(web.kind, "compute.instance");
        assert_eq!(web.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(
            web.capacity[1],
            NativeQuantity::text("memory", "4294967296", "B")
        );
        assert_eq!(
            web.extra.get("core_fraction"),
            Some(&AttributeValue::Integer(100))
        );

        assert_eq!(records[2].attached_to.as_deref(), Some("vm-1"));
        assert_eq!(records[3].attached_to, None);
    }

    #[tokio::test]
    async fn throttled_listing_reports_retry_after() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/instances"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let err = adapter.list_resources(&session, &ctx).await.unwrap_err();
        assert_eq!(err, ProviderError::RateLimited { retry_after: Some(7) });
    }

    #[tokio::test]
    async fn listing_that_never_ends_is_an_error() {
        let server = MockServer::start().await;
        mount_iam(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/instances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instances": [{
                    "id": "vm-1",
                    "resources": { "memory": "1073741824", "cores": "2" }
                }],
                "nextPageToken": "again"
            })))
            .expect(MAX_PAGES as u64)
            .mount(&server)
            .await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let session = adapter.authenticate(&ctx).await.unwrap();
        let err = adapter.list_resources(&session, &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn revoked_cached_token_is_reissued_once() {
        let server = MockServer::start().await;
        let expires_at = (Utc::now() + Duration::hours(12)).to_rfc3339();
        Mock::given(method("POST"))
            .and(path("/iam/v1/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "iamToken": "t1.revoked",
                "expiresAt": expires_at,
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/iam/v1/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "iamToken": "t1.renewed",
                "expiresAt": expires_at,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/instances"))
            .and(header("authorization", "Bearer t1.revoked"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/instances"))
            .and(header("authorization", "Bearer t1.renewed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instances": [{
                    "id": "vm-1",
                    "resources": { "memory": "1073741824", "cores": "2" }
                }]
            })))
            .mount(&server)
            .await;
        mount_empty(&server, "/compute/v1/disks", "disks").await;
        mount_empty(&server, "/vpc/v1/networks", "networks").await;
        mount_empty(&server, "/managed-postgresql/v1/clusters", "clusters").await;

        let adapter = adapter(&server.uri());
        let ctx = context();
        let cached = adapter.authenticate(&ctx).await.unwrap();
        assert_eq!(cached.token().unwrap(), "t1.revoked");

        let records = adapter.list_resources(&cached, &ctx).await.unwrap();
        assert_eq!(records.len(), 1);

        let current = adapter.authenticate(&ctx).await.unwrap();
        assert_eq!(current.token().unwrap(), "t1.renewed");
    }

    #[test]
    fn cluster_preset_expands_to_capacity() {
        let cluster: Cluster = serde_json::from_value(json!({
            "id": "c-1",
            "name": "orders",
            "status": "RUNNING",
            "config": { "resources": {
                "resourcePresetId": "s2.small",
                "diskSize": "107374182400",
                "diskTypeId": "network-ssd"
            }}
        }))
        .unwrap();

        let record = cluster_record(cluster);
        assert_eq!(record.kind, "mdb.postgresql.cluster");
        assert_eq!(record.capacity[0].value, QuantityValue::Number(4.0));
        assert_eq!(record.capacity[1].unit, "GiB");
        assert_eq!(
            record.extra.get("service_family"),
            Some(&AttributeValue::from("managed_postgresql"))
        );
    }

    #[tokio::test]
    async fn billing_is_not_supported() {
        let adapter = adapter("http://127.0.0.1:9");
        let billing = adapter
            .list_billing_records(&Session::anonymous(), &context())
            .await
            .unwrap();
        assert_eq!(billing, BillingRecords::NotSupported);
    }
}
