//! Base URL rotation.

use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Base URLs a transport resolves relative request paths against,
/// selected round-robin.
#[derive(Debug)]
pub struct TargetSet {
    bases: Vec<Url>,
    counter: AtomicUsize,
}

impl TargetSet {
    pub fn new<S: AsRef<str>>(base_urls: &[S]) -> Result<Self, ConfigError> {
        if base_urls.is_empty() {
            return Err(ConfigError::InvalidTarget("at least one base URL is required".to_string()));
        }
        let bases = base_urls
            .iter()
            .map(|raw| {
                let url = Url::parse(raw.as_ref())
                    .map_err(|e| ConfigError::InvalidTarget(format!("'{}': {e}", raw.as_ref())))?;
                match url.scheme() {
                    "http" | "https" => Ok(url),
                    other => Err(ConfigError::InvalidTarget(format!(
                        "'{}': unsupported scheme '{other}'",
                        raw.as_ref()
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            bases,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn bases(&self) -> &[Url] {
        &self.bases
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Next base URL in rotation.
    pub fn next_base(&self) -> &Url {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.bases.len();
        &self.bases[index]
    }

    /// Absolute URL for a resolved path+query. Absolute inputs pass through.
    pub fn resolve(&self, path_query: &str) -> Result<Url, TransportError> {
        let joined = if path_query.starts_with("http://") || path_query.starts_with("https://") {
            path_query.to_string()
        } else {
            let base = self.next_base().as_str().trim_end_matches('/');
            if path_query.starts_with('/') {
                format!("{base}{path_query}")
            } else {
                format!("{base}/{path_query}")
            }
        };
        Url::parse(&joined)
            .map_err(|e| TransportError::RequestWrite(format!("invalid request URL '{joined}': {e}")))
    }
}
