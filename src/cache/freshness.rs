//! Freshness computation from response headers.
//!
//! # Precedence
//! ```text
//! Cache-Control present  → no-store / no-cache     ⇒ max-age 0, stop
//!                          must/proxy-revalidate   ⇒ max-age 0, keep scanning
//!                          max-age=N               ⇒ N, stop
//!                          (Expires is ignored)
//! otherwise              → Expires - Date, when Expires >= Date
//! soft_ttl <= 0 and no ETag / Last-Modified        ⇒ not cacheable
//! hard_ttl = soft_ttl, or the fallback window when soft_ttl is 0
//! ```

use bytes::Bytes;

use crate::cache::http_date::parse_http_date;
use crate::request::RequestDescriptor;
use crate::response::{ResponseDescriptor, ResponseHead, CONTENT_ENCODING};

pub const CACHE_CONTROL: &str = "Cache-Control";
pub const DEFAULT_FALLBACK_TTL_SECS: u64 = 10;

/// Validators used for conditional revalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_modified_epoch: Option<i64>,
}

impl Validator {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A buffered, already-decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub head: ResponseHead,
    pub body: Bytes,
}

impl CachedResponse {
    /// The body is stored decoded, so encoding and length headers go.
    pub fn new(mut head: ResponseHead, body: Bytes) -> Self {
        for name in [CONTENT_ENCODING, "Content-Length"] {
            if let Some((stored, _)) = head.headers.entry_ignore_case(name) {
                let stored = stored.to_string();
                head.headers.remove(&stored);
            }
        }
        Self { head, body }
    }

    pub fn to_response(&self) -> ResponseDescriptor {
        ResponseDescriptor::from_bytes(self.head.clone(), self.body.clone())
    }
}

/// A cacheable response and its lifetimes, fixed at arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: CachedResponse,
    pub soft_ttl_secs: u64,
    pub hard_ttl_secs: u64,
    pub validator: Validator,
}

/// Lifetimes derived from headers alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    pub soft_ttl_secs: u64,
    pub hard_ttl_secs: u64,
    pub validator: Validator,
}

/// Turns responses into cache entries.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessComputer {
    fallback_ttl_secs: u64,
}

impl Default for FreshnessComputer {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_TTL_SECS)
    }
}

impl FreshnessComputer {
    /// `fallback_ttl_secs` is the revalidation window for entries that only
    /// carry validators.
    pub fn new(fallback_ttl_secs: u64) -> Self {
        Self { fallback_ttl_secs }
    }

    pub fn fallback_ttl_secs(&self) -> u64 {
        self.fallback_ttl_secs
    }

    /// Cache entry for a response, or `None` when it must not be cached.
    /// A request sent with `Cache-Control: no-store` is never cached.
    pub fn compute(&self, request: &RequestDescriptor, head: &ResponseHead, body: Bytes) -> Option<CacheEntry> {
        if request
            .header(CACHE_CONTROL)
            .is_some_and(|value| tokens(value).any(|t| t == "no-store"))
        {
            return None;
        }
        let freshness = self.freshness(head)?;
        Some(CacheEntry {
            value: CachedResponse::new(head.clone(), body),
            soft_ttl_secs: freshness.soft_ttl_secs,
            hard_ttl_secs: freshness.hard_ttl_secs,
            validator: freshness.validator,
        })
    }

    /// Lifetimes and validators from the response headers.
    pub fn freshness(&self, head: &ResponseHead) -> Option<Freshness> {
        let soft_ttl = match head.headers.get_ignore_case(CACHE_CONTROL) {
            Some(values) => cache_control_max_age(values),
            None => expires_ttl(head),
        };

        let last_modified = head.header("Last-Modified").map(str::to_string);
        let validator = Validator {
            etag: head.header("ETag").map(str::to_string),
            last_modified_epoch: last_modified.as_deref().and_then(parse_http_date),
            last_modified,
        };

        if soft_ttl <= 0 && validator.is_empty() {
            return None;
        }
        let soft_ttl_secs = u64::try_from(soft_ttl).unwrap_or(0);
        let hard_ttl_secs = if soft_ttl_secs > 0 {
            soft_ttl_secs
        } else {
            self.fallback_ttl_secs
        };
        Some(Freshness {
            soft_ttl_secs,
            hard_ttl_secs,
            validator,
        })
    }
}

fn tokens(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
}

fn cache_control_max_age(values: &[String]) -> i64 {
    let mut max_age = 0;
    for token in values.iter().flat_map(|value| tokens(value)) {
        match token.as_str() {
            "no-store" | "no-cache" => return 0,
            "must-revalidate" | "proxy-revalidate" => max_age = 0,
            other => {
                if let Some(seconds) = other
                    .strip_prefix("max-age=")
                    .and_then(|v| v.trim_matches('"').parse::<i64>().ok())
                {
                    return seconds;
                }
            }
        }
    }
    max_age
}

fn expires_ttl(head: &ResponseHead) -> i64 {
    let date = head.header("Date").and_then(parse_http_date);
    let expires = head.header("Expires").and_then(parse_http_date);
    match (date, expires) {
        (Some(date), Some(expires)) if expires >= date => expires - date,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamContainer;
    use crate::request::{Method, RequestBuilder};

    const DATE: &str = "Sun, 06 Nov 1994 08:49:37 GMT";
    const PLUS_60: &str = "Sun, 06 Nov 1994 08:50:37 GMT";
    const MINUS_60: &str = "Sun, 06 Nov 1994 08:48:37 GMT";

    fn head(pairs: &[(&str, &str)]) -> ResponseHead {
        let mut headers = ParamContainer::new();
        for (name, value) in pairs {
            headers.add_one(name, *value).unwrap();
        }
        ResponseHead::new(200, "OK", headers)
    }

    fn request() -> RequestDescriptor {
        RequestBuilder::new(Method::Get, "/r").build().unwrap()
    }

    #[test]
    fn max_age_beats_expires() {
        let computer = FreshnessComputer::default();
        let h = head(&[("Cache-Control", "max-age=120"), ("Date", DATE), ("Expires", PLUS_60)]);
        let entry = computer.compute(&request(), &h, Bytes::new()).unwrap();
        assert_eq!(entry.soft_ttl_secs, 120);
        assert_eq!(entry.hard_ttl_secs, 120);
    }

    #[test]
    fn cache_control_without_max_age_ignores_expires() {
        let computer = FreshnessComputer::default();
        let h = head(&[("Cache-Control", "public"), ("Date", DATE), ("Expires", PLUS_60)]);
        assert!(computer.compute(&request(), &h, Bytes::new()).is_none());
    }

    #[test]
    fn expires_minus_date() {
        let computer = FreshnessComputer::default();
        let h = head(&[("Date", DATE), ("Expires", PLUS_60)]);
        assert_eq!(computer.freshness(&h).unwrap().soft_ttl_secs, 60);
    }

    #[test]
    fn etag_only_gets_fallback_window() {
        let computer = FreshnessComputer::default();
        let h = head(&[("ETag", "\"abc\"")]);
        let entry = computer.compute(&request(), &h, Bytes::from_static(b"x")).unwrap();
        assert_eq!(entry.soft_ttl_secs, 0);
        assert_eq!(entry.hard_ttl_secs, DEFAULT_FALLBACK_TTL_SECS);
        assert_eq!(entry.validator.etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn past_expires_without_validators_is_absent() {
        let computer = FreshnessComputer::default();
        let h = head(&[("Date", DATE), ("Expires", MINUS_60)]);
        assert!(computer.compute(&request(), &h, Bytes::new()).is_none());
    }

    #[test]
    fn directive_scanning() {
        let computer = FreshnessComputer::new(30);
        let h = head(&[("Cache-Control", "must-revalidate, max-age=60")]);
        assert_eq!(computer.freshness(&h).unwrap().soft_ttl_secs, 60);

        let h = head(&[("Cache-Control", "no-cache, max-age=60"), ("Last-Modified", DATE)]);
        let freshness = computer.freshness(&h).unwrap();
        assert_eq!((freshness.soft_ttl_secs, freshness.hard_ttl_secs), (0, 30));
        assert_eq!(freshness.validator.last_modified_epoch, Some(784_111_777));
    }

    #[test]
    fn no_store_request_is_never_cached() {
        let computer = FreshnessComputer::default();
        let req = RequestBuilder::new(Method::Get, "/r")
            .header("Cache-Control", "no-store")
            .build()
            .unwrap();
        let h = head(&[("Cache-Control", "max-age=60")]);
        assert!(computer.compute(&req, &h, Bytes::new()).is_none());
    }

    #[test]
    fn deterministic() {
        let computer = FreshnessComputer::default();
        let h = head(&[("Cache-Control", "max-age=5"), ("ETag", "\"v\"")]);
        assert_eq!(computer.freshness(&h), computer.freshness(&h));
    }

    #[test]
    fn stored_value_drops_encoding_headers() {
        let h = head(&[("Content-Encoding", "gzip"), ("content-length", "12"), ("ETag", "\"v\"")]);
        let cached = CachedResponse::new(h, Bytes::from_static(b"plain"));
        assert!(cached.head.header("Content-Encoding").is_none());
        assert!(cached.head.header("Content-Length").is_none());
        assert_eq!(cached.head.header("etag"), Some("\"v\""));
    }
}
