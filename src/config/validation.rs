//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. Every problem is
//! reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::schema::{ClientConfig, TransportKind};
use crate::media_type::charset_encoding;

/// A single semantic problem, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, returning every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let transport = &config.transport;
    if transport.base_urls.is_empty() {
        errors.push(ValidationError::new("transport.base_urls", "at least one base URL is required"));
    }
    for (i, raw) in transport.base_urls.iter().enumerate() {
        match Url::parse(raw) {
            Ok(url) if url.scheme() == "https" && transport.kind == TransportKind::Hyper => {
                errors.push(ValidationError::new(
                    format!("transport.base_urls[{i}]"),
                    "the hyper transport speaks plain http only; use kind = \"reqwest\" for https",
                ))
            }
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("transport.base_urls[{i}]"),
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(format!("transport.base_urls[{i}]"), e.to_string())),
        }
    }
    if transport.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("transport.connect_timeout_ms", "must be greater than 0"));
    }
    if transport.read_timeout_ms == 0 {
        errors.push(ValidationError::new("transport.read_timeout_ms", "must be greater than 0"));
    }

    let defaults = &config.defaults;
    if charset_encoding(&defaults.charset).is_none() {
        errors.push(ValidationError::new(
            "defaults.charset",
            format!("unsupported charset '{}'", defaults.charset),
        ));
    }
    for name in defaults.headers.keys() {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("defaults.headers", "header names must not be blank"));
        }
    }
    for name in defaults.params.keys() {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("defaults.params", "parameter names must not be blank"));
        }
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed max_delay_ms"));
    }
    if !(0.0..=1.0).contains(&retries.budget_ratio) {
        errors.push(ValidationError::new("retries.budget_ratio", "must be between 0.0 and 1.0"));
    }
    for status in &retries.retry_statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::new("retries.retry_statuses", format!("{status} is not an HTTP status")));
        }
    }

    let observability = &config.observability;
    if let Err(e) = EnvFilter::try_new(&observability.log_filter) {
        errors.push(ValidationError::new("observability.log_filter", e.to_string()));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
