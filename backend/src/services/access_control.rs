//! Request gate consulted before any search runs: read-only mode, API key
//! validation and the rate-limit decision.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashSet;
use serde::Deserialize;

use crate::config::SearchConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequest {
    pub api_key: Option<String>,
    pub email: Option<String>,
    /// Explicit `ip` parameter, else `X-Forwarded-For`, else the peer address.
    pub ip: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny { status: u16, reason: String },
}

impl AccessDecision {
    fn deny(status: u16, reason: &str) -> Self {
        AccessDecision::Deny { status, reason: reason.to_string() }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn authorize(&self, request: &AccessRequest) -> AccessDecision;
}

/// An IPv4 or IPv6 network in `address/prefix` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    address: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let text = text.trim();
        let (address, prefix) = match text.split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (text, None),
        };
        let address: IpAddr = address.parse().with_context(|| format!("invalid network address {:?}", text))?;
        let max = if address.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().with_context(|| format!("invalid network prefix {:?}", text))?,
            None => max,
        };
        if prefix > max {
            anyhow::bail!("network prefix out of range: {:?}", text);
        }
        Ok(Self { address, prefix })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.address, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn parse_networks(networks: &[String]) -> Vec<IpNetwork> {
    networks
        .iter()
        .filter(|n| !n.trim().is_empty())
        .filter_map(|n| match IpNetwork::parse(n) {
            Ok(network) => Some(network),
            Err(e) => {
                tracing::warn!("ignoring rate limit network: {:#}", e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ApiKeyCheck {
    #[serde(default)]
    valid: bool,
}

pub struct ApiKeyGate {
    http: reqwest::Client,
    check_url: String,
    check_enabled: bool,
    known_keys: DashSet<String>,
    read_only: AtomicBool,
    include: Vec<IpNetwork>,
    exclude: Vec<IpNetwork>,
}

impl ApiKeyGate {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            check_url: config.apikey_check_url.clone(),
            check_enabled: config.apikey_check_enabled,
            known_keys: DashSet::new(),
            read_only: AtomicBool::new(false),
            include: parse_networks(&config.ratelimit_network_include),
            exclude: parse_networks(&config.ratelimit_network_exclude),
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    /// Marks `key` valid without asking the key service.
    pub fn remember_key(&self, key: impl Into<String>) {
        self.known_keys.insert(key.into());
    }

    /// True when checking is disabled or the key service accepts `key`.
    /// Accepted keys are cached; lookup failures count as invalid.
    pub async fn is_valid_key(&self, key: Option<&str>) -> bool {
        if !self.check_enabled {
            return true;
        }
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return false;
        };
        if self.known_keys.contains(key) {
            return true;
        }
        match self.check_key(key).await {
            Ok(valid) => {
                tracing::debug!("checked api key {}: valid = {}", redact_key(key), valid);
                if valid {
                    self.known_keys.insert(key.to_string());
                }
                valid
            }
            Err(e) => {
                tracing::error!("api key check failed: {:#}", e);
                false
            }
        }
    }

    async fn check_key(&self, key: &str) -> anyhow::Result<bool> {
        let url = key_check_url(&self.check_url, key)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json::<ApiKeyCheck>().await?.valid)
    }

    pub async fn should_perform_operation(&self, api_key: Option<&str>, check_read_only: bool) -> AccessDecision {
        if check_read_only && self.is_read_only() {
            return AccessDecision::deny(409, "Server is in read only mode.  Try again later.");
        }
        if !self.is_valid_key(api_key).await {
            return AccessDecision::deny(403, "An invalid API Key was provided.");
        }
        AccessDecision::Allow
    }

    /// Requests with an API key or email are never rate limited. Otherwise the
    /// address is limited when it lies outside every excluded network or
    /// inside any included one, so inclusion overrides exclusion.
    pub fn should_rate_limit(&self, request: &AccessRequest) -> bool {
        if request.api_key.is_some() || request.email.is_some() {
            return false;
        }
        let Some(ip) = request.ip else {
            return true;
        };
        let excluded = self.exclude.iter().any(|n| n.contains(ip));
        let included = self.include.iter().any(|n| n.contains(ip));
        !excluded || included
    }

    pub fn check_rate_limit(&self, request: &AccessRequest) -> AccessDecision {
        if self.should_rate_limit(request) {
            AccessDecision::deny(403, "API Key or email required")
        } else {
            AccessDecision::Allow
        }
    }
}

/// Key check address with `apikey` set to `key`, replacing any `apikey`
/// parameter already present in the configured address.
fn key_check_url(check_url: &str, key: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(check_url).with_context(|| format!("invalid api key check url {:?}", check_url))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "apikey")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut().clear().extend_pairs(kept).append_pair("apikey", key);
    Ok(url)
}

/// Enough of an API key to tell keys apart in logs.
fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}*** ({} chars)", prefix, key.chars().count())
}

#[async_trait]
impl AccessControl for ApiKeyGate {
    async fn authorize(&self, request: &AccessRequest) -> AccessDecision {
        self.should_perform_operation(request.api_key.as_deref(), true).await
    }
}
