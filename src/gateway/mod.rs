pub mod cache;

use crate::cli_exec::CliExecutor;
use crate::error::{Error, Result};
use crate::state::OrgIdentity;
use cache::{ApiCache, CacheKey};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::validation(format!("unsupported HTTP method: {other}"))),
        }
    }

    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiType {
    Rest,
    Tooling,
    Ui,
    Apex,
    Agent,
}

impl ApiType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "REST" => Ok(ApiType::Rest),
            "TOOLING" => Ok(ApiType::Tooling),
            "UI" => Ok(ApiType::Ui),
            "APEX" => Ok(ApiType::Apex),
            "AGENT" => Ok(ApiType::Agent),
            other => Err(Error::validation(format!("unsupported API type: {other}"))),
        }
    }

    fn prefix(&self, api_version: &str) -> String {
        match self {
            ApiType::Rest => format!("/services/data/v{api_version}"),
            ApiType::Tooling => format!("/services/data/v{api_version}/tooling"),
            ApiType::Ui => format!("/services/data/v{api_version}/ui-api"),
            ApiType::Apex => "/services/apexrest".to_string(),
            ApiType::Agent => format!("/services/data/v{api_version}/agentforce"),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ApiType::Rest => "REST",
            ApiType::Tooling => "TOOLING",
            ApiType::Ui => "UI",
            ApiType::Apex => "APEX",
            ApiType::Agent => "AGENT",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub base_url: Option<String>,
    pub query_params: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub bypass_cache: bool,
    pub cache_ttl: Option<Duration>,
    pub cache_key_extra: Option<String>,
}

const INVALID_SESSION_SENTINEL: &str = "INVALID_SESSION_ID";

/// Supplies a fresh access token when the gateway sees `INVALID_SESSION_ID`.
/// Implemented by the initialization layer so the gateway doesn't need to
/// know how org identity gets (re)established.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<OrgIdentity>;
}

pub struct CliTokenRefresher {
    pub cli: std::sync::Arc<CliExecutor>,
    pub workspace: std::sync::Arc<parking_lot::RwLock<String>>,
    pub target_org: std::sync::Arc<parking_lot::RwLock<Option<String>>>,
}

#[async_trait::async_trait]
impl TokenRefresher for CliTokenRefresher {
    async fn refresh(&self) -> Result<OrgIdentity> {
        let cwd = self.workspace.read().clone();
        let target = self.target_org.read().clone();
        let raw = self.cli.display_org(&cwd, target.as_deref()).await?;
        serde_json::from_value(raw).map_err(|e| Error::Cli(format!("malformed display org result: {e}")))
    }
}

pub struct SfGateway {
    client: Client,
    cache: ApiCache,
    cache_enabled: AtomicBool,
    allow_insecure_tls: AtomicBool,
    org: std::sync::Arc<parking_lot::RwLock<OrgIdentity>>,
    refresher: std::sync::Arc<dyn TokenRefresher>,
}

impl SfGateway {
    pub fn new(
        cache_ttl_ms: u64,
        cache_max_entries: usize,
        allow_insecure_tls: bool,
        org: std::sync::Arc<parking_lot::RwLock<OrgIdentity>>,
        refresher: std::sync::Arc<dyn TokenRefresher>,
    ) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(allow_insecure_tls)
            .build()
            .map_err(Error::from)?;
        Ok(Self {
            client,
            cache: ApiCache::new(cache_ttl_ms, cache_max_entries),
            cache_enabled: AtomicBool::new(true),
            allow_insecure_tls: AtomicBool::new(allow_insecure_tls),
            org,
            refresher,
        })
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Prunes expired entries once the cache has grown past twice its
    /// configured capacity. Intended to be driven by a periodic background
    /// task; does nothing on a cache that hasn't overgrown.
    pub fn sweep_cache(&self) {
        self.cache.sweep_if_oversized();
    }

    /// TLS relaxation latches on; once enabled it is never tightened again
    /// for the lifetime of this gateway's `reqwest::Client` (/// "TLS", Open Question (c)).
    pub fn allows_insecure_tls(&self) -> bool {
        self.allow_insecure_tls.load(Ordering::Relaxed)
    }

    pub async fn call(
        &self,
        method: Method,
        api_type: ApiType,
        service: &str,
        body: Option<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        let org = self.org.read().clone();
        if org.instance_url.is_empty() || org.access_token.is_empty() || org.id.is_empty() {
            return Err(Error::NotInitialized(
                "gateway called before org identity is available".into(),
            ));
        }

        let endpoint = build_endpoint(&org, api_type, service, &options);
        let cache_key = CacheKey {
            org_id: org.id.clone(),
            method: method.as_str().into(),
            api_type: api_type.as_str().into(),
            endpoint: endpoint.clone(),
            extra: options.cache_key_extra.clone(),
        };

        let cacheable = method.is_read() && self.cache_enabled.load(Ordering::Relaxed) && !options.bypass_cache;
        if cacheable {
            if let Some(hit) = self.cache.get(&cache_key) {
                return Ok(hit);
            }
        }

        let mut access_token = org.access_token.clone();
        let mut last_err = None;
        for attempt in 0..2 {
            match self
                .execute(method, &endpoint, body.clone(), &options, &access_token)
                .await
            {
                Ok(value) => {
                    if cacheable {
                        self.cache.put(cache_key, value.clone(), options.cache_ttl);
                    } else if !method.is_read() {
                        self.cache.clear();
                    }
                    return Ok(value);
                }
                Err(Error::Auth(_)) if attempt == 0 => {
                    let refreshed = self.refresher.refresh().await?;
                    access_token = refreshed.access_token.clone();
                    *self.org.write() = refreshed;
                    last_err = Some(Error::Auth(INVALID_SESSION_SENTINEL.into()));
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Auth("session invalid after retry".into())))
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        options: &CallOptions,
        access_token: &str,
    ) -> Result<Value> {
        let mut req = self.client.request(method.as_reqwest(), endpoint);
        req = req.bearer_auth(access_token);
        req = req.header("Content-Type", "application/json");
        for (k, v) in &options.headers {
            req = req.header(k, v);
        }
        if !options.query_params.is_empty() {
            req = req.query(&options.query_params);
        }
        if let Some(b) = &body {
            req = req.json(b);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
        }

        if text.contains(INVALID_SESSION_SENTINEL) {
            return Err(Error::Auth(INVALID_SESSION_SENTINEL.into()));
        }
        Err(Error::Upstream(format!("{status}: {}", truncate(&text, 500))))
    }
}

fn build_endpoint(org: &OrgIdentity, api_type: ApiType, service: &str, options: &CallOptions) -> String {
    if let Some(base) = &options.base_url {
        return base.clone();
    }
    let instance = org.instance_url.trim_end_matches('/');
    let prefix = api_type.prefix(&org.api_version);
    let service = if service.starts_with('/') {
        service.to_string()
    } else {
        format!("/{service}")
    };
    format!("{instance}{prefix}{service}")
}

fn truncate(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_rejects_unknown() {
        assert!(Method::parse("HEAD").is_err());
        assert!(matches!(Method::parse("get").unwrap(), Method::Get));
    }

    #[test]
    fn api_type_prefixes_match_spec() {
        assert_eq!(ApiType::Rest.prefix("59.0"), "/services/data/v59.0");
        assert_eq!(ApiType::Tooling.prefix("59.0"), "/services/data/v59.0/tooling");
        assert_eq!(ApiType::Apex.prefix("59.0"), "/services/apexrest");
    }

    #[test]
    fn endpoint_strips_trailing_slash_and_enforces_leading_slash() {
        let org = OrgIdentity {
            instance_url: "https://example.my.salesforce.com/".into(),
            api_version: "59.0".into(),
            ..Default::default()
        };
        let endpoint = build_endpoint(&org, ApiType::Rest, "sobjects/Account", &CallOptions::default());
        assert_eq!(
            endpoint,
            "https://example.my.salesforce.com/services/data/v59.0/sobjects/Account"
        );
    }

    #[test]
    fn base_url_override_bypasses_prefix_construction() {
        let org = OrgIdentity::default();
        let opts = CallOptions {
            base_url: Some("https://override.example.com/x".into()),
            ..Default::default()
        };
        assert_eq!(
            build_endpoint(&org, ApiType::Rest, "ignored", &opts),
            "https://override.example.com/x"
        );
    }
}
