//! IP geolocation.
//!
//! Best-effort enrichment: lookups that fail, time out, or target private
//! addresses yield None and the event persists without location.

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Resolved location for an IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
}

/// Geo lookup seam. Resolved once per connection at accept time.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> Option<GeoInfo>;
}

/// Resolver that never resolves; used when no endpoint is configured.
pub struct DisabledGeoResolver;

#[async_trait]
impl GeoResolver for DisabledGeoResolver {
    async fn resolve(&self, _ip: &str) -> Option<GeoInfo> {
        None
    }
}

/// Private, loopback, and link-local addresses have no public location.
fn is_private_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        // fc00::/7 is the ULA range.
        Ok(IpAddr::V6(v6)) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
        Err(_) => true,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GeoResponse {
    country: Option<String>,
    #[serde(alias = "regionName")]
    region: Option<String>,
}

/// HTTP resolver with a response cache.
pub struct HttpGeoResolver {
    endpoint: String,
    http_client: reqwest::Client,
    cache: Cache<String, Option<GeoInfo>>,
}

impl HttpGeoResolver {
    /// `endpoint` is the lookup base URL; the IP is appended as a path
    /// segment.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .expect("Failed to create HTTP client"),
            cache: Cache::builder()
                .max_capacity(50_000)
                .time_to_live(Duration::from_secs(3600))
                .build(),
        }
    }

    async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), ip);
        let response = match self.http_client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(ip = %ip, error = %e, "Geo lookup failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(ip = %ip, status = %response.status(), "Geo lookup rejected");
            return None;
        }
        match response.json::<GeoResponse>().await {
            Ok(geo) => Some(GeoInfo {
                country: geo.country,
                region: geo.region,
            }),
            Err(e) => {
                debug!(ip = %ip, error = %e, "Geo response unparseable");
                None
            }
        }
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, ip: &str) -> Option<GeoInfo> {
        if is_private_ip(ip) {
            return None;
        }
        if let Some(cached) = self.cache.get(ip).await {
            return cached;
        }
        let result = self.lookup(ip).await;
        self.cache.insert(ip.to_string(), result.clone()).await;
        result
    }
}
