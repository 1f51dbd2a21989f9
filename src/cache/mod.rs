//! HTTP response caching.
//!
//! # Data Flow
//! ```text
//! CachingInterceptor (fingerprinted requests only)
//!     → store.rs lookup      Fresh ⇒ served, no network
//!                            Stale ⇒ served + background conditional request
//!                            Miss  ⇒ next.run()
//!     → freshness.rs         headers ⇒ soft/hard TTL + validators
//!     → store.rs insert
//! ```

pub mod freshness;
pub mod http_date;
pub mod interceptor;
pub mod store;

pub use freshness::{CacheEntry, CachedResponse, Freshness, FreshnessComputer, Validator};
pub use interceptor::{CachingInterceptor, IF_MODIFIED_SINCE, IF_NONE_MATCH};
pub use store::{CacheStore, Lookup};
