//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! carry defaults, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::params::ParamContainer;
use crate::request::RequestDefaults;

/// Root configuration for a sender.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend selection and connection settings.
    pub transport: TransportConfig,

    /// Headers, parameters and charset applied to every request.
    pub defaults: DefaultsConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Which backend executes requests.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Hyper,
    Reqwest,
}

/// Transport configuration. Each transport instance owns its copy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,

    /// Base URLs relative paths resolve against, rotated round-robin.
    pub base_urls: Vec<String>,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time allowed for headers, and between body chunks, in milliseconds.
    pub read_timeout_ms: u64,

    /// Idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,

    /// Seconds an idle pooled connection is kept.
    pub pool_idle_timeout_secs: u64,

    /// Accept invalid TLS certificates (reqwest only).
    pub accept_invalid_certs: bool,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Hyper,
            base_urls: vec!["http://127.0.0.1:8080".to_string()],
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
            accept_invalid_certs: false,
        }
    }
}

/// Sender-level request defaults. Explicit request values win.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub headers: BTreeMap<String, String>,

    /// Parameter names keep their sigils: `{id}`, `;v`, `page`.
    pub params: BTreeMap<String, String>,

    /// Charset appended to request Content-Type.
    pub charset: String,

    /// Leave Content-Type without a charset parameter.
    pub omit_charset: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "User-Agent".to_string(),
            concat!("relay-client/", env!("CARGO_PKG_VERSION")).to_string(),
        );
        headers.insert("Accept-Encoding".to_string(), "gzip, deflate".to_string());
        Self {
            headers,
            params: BTreeMap::new(),
            charset: "utf-8".to_string(),
            omit_charset: false,
        }
    }
}

impl DefaultsConfig {
    /// Convert into the defaults a sender attaches to each builder.
    pub fn to_request_defaults(&self) -> Result<RequestDefaults> {
        let mut headers = ParamContainer::new();
        for (name, value) in &self.headers {
            headers.add_one(name, value.clone())?;
        }
        let mut params = ParamContainer::new();
        for (name, value) in &self.params {
            params.add_one(name, value.clone())?;
        }
        Ok(RequestDefaults {
            headers,
            params,
            charset: self.charset.clone(),
            omit_charset: self.omit_charset,
        })
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Maximum stored responses; the oldest is evicted first.
    pub max_entries: usize,

    /// Revalidation window for responses that only carry validators.
    pub fallback_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_024,
            fallback_ttl_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Total attempts including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Share of requests that may be retries, e.g. 0.1 for 10%.
    pub budget_ratio: f64,

    /// Retries always allowed per budget window.
    pub min_retries_per_window: u64,

    /// Response statuses that trigger a retry.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            budget_ratio: 0.1,
            min_retries_per_window: 10,
            retry_statuses: vec![502, 503, 504],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Stamp `x-request-id` on outgoing requests.
    pub request_ids: bool,

    /// Record request metrics.
    pub metrics_enabled: bool,

    /// Prometheus scrape endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "relay_client=info".to_string(),
            request_ids: true,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
