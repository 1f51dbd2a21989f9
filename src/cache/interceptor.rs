//! Response caching with stale-while-revalidate.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::freshness::{CacheEntry, CachedResponse, FreshnessComputer, Validator};
use crate::cache::store::{CacheStore, Lookup};
use crate::chain::{Interceptor, Next};
use crate::error::Result;
use crate::observability::metrics::record_cache_event;
use crate::request::{Fingerprint, RequestDescriptor};
use crate::response::ResponseDescriptor;

pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";

/// Serves cacheable requests (those with a fingerprint) from a `CacheStore`.
///
/// Fresh hits never reach the network. Stale hits are served immediately
/// while a conditional request refreshes the entry in the background; at
/// most one revalidation per key runs at a time.
#[derive(Debug, Clone)]
pub struct CachingInterceptor {
    store: CacheStore,
    computer: FreshnessComputer,
    revalidating: Arc<DashMap<Fingerprint, ()>>,
}

impl CachingInterceptor {
    pub fn new(store: CacheStore, computer: FreshnessComputer) -> Self {
        Self {
            store,
            computer,
            revalidating: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Buffer a 2xx response (206 excluded) and store it when cacheable.
    async fn store_response(
        &self,
        request: &RequestDescriptor,
        key: &Fingerprint,
        mut response: ResponseDescriptor,
    ) -> Result<ResponseDescriptor> {
        let status = response.status();
        if !response.head().is_success() || status == 206 {
            return Ok(response);
        }

        let body = response.bytes().await?;
        let head = response.head().clone();
        response.close();

        match self.computer.compute(request, &head, body.clone()) {
            Some(entry) => {
                tracing::debug!(
                    key = %key,
                    soft_ttl = entry.soft_ttl_secs,
                    hard_ttl = entry.hard_ttl_secs,
                    "Response cached"
                );
                record_cache_event("store");
                Ok(self.store.insert(key.clone(), entry).value.to_response())
            }
            None => Ok(CachedResponse::new(head, body).to_response()),
        }
    }

    fn spawn_revalidation(&self, request: &RequestDescriptor, key: Fingerprint, entry: Arc<CacheEntry>, next: Next) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Some(guard) = RevalidationGuard::acquire(&self.revalidating, &key) else {
            return;
        };
        let conditional = match conditional_request(request, &entry.validator) {
            Ok(conditional) => conditional,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Conditional request could not be built");
                return;
            }
        };

        let this = self.clone();
        runtime.spawn(async move {
            let _guard = guard;
            if let Err(err) = this.revalidate(&conditional, &key, &entry, next).await {
                tracing::warn!(key = %key, error = %err, "Cache revalidation failed");
                record_cache_event("revalidate_error");
            }
        });
    }

    async fn revalidate(
        &self,
        conditional: &RequestDescriptor,
        key: &Fingerprint,
        entry: &CacheEntry,
        next: Next,
    ) -> Result<()> {
        let mut response = next.run(conditional).await?;
        if response.status() != 304 {
            self.store_response(conditional, key, response).await?;
            return Ok(());
        }

        let mut head = entry.value.head.clone();
        for (name, values) in response.headers().iter() {
            if let Some((stored, _)) = head.headers.entry_ignore_case(name) {
                let stored = stored.to_string();
                head.headers.remove(&stored);
            }
            head.headers.set(name, values.iter().cloned())?;
        }
        response.close();

        match self.computer.compute(conditional, &head, entry.value.body.clone()) {
            Some(refreshed) => {
                self.store.insert(key.clone(), refreshed);
                tracing::debug!(key = %key, "Cache entry revalidated");
                record_cache_event("revalidated");
            }
            None => {
                self.store.remove(key);
            }
        }
        Ok(())
    }
}

/// Marks a key as being revalidated until dropped, including when the
/// revalidation task panics or is aborted.
struct RevalidationGuard {
    revalidating: Arc<DashMap<Fingerprint, ()>>,
    key: Fingerprint,
}

impl RevalidationGuard {
    fn acquire(revalidating: &Arc<DashMap<Fingerprint, ()>>, key: &Fingerprint) -> Option<Self> {
        if revalidating.insert(key.clone(), ()).is_some() {
            return None;
        }
        Some(Self {
            revalidating: Arc::clone(revalidating),
            key: key.clone(),
        })
    }
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.revalidating.remove(&self.key);
    }
}

/// The origin request plus `If-None-Match` / `If-Modified-Since`.
fn conditional_request(request: &RequestDescriptor, validator: &Validator) -> Result<RequestDescriptor> {
    let mut conditional = request.clone();
    if let Some(etag) = &validator.etag {
        conditional = conditional.with_header(IF_NONE_MATCH, etag.clone())?;
    }
    if let Some(last_modified) = &validator.last_modified {
        conditional = conditional.with_header(IF_MODIFIED_SINCE, last_modified.clone())?;
    }
    Ok(conditional)
}

#[async_trait]
impl Interceptor for CachingInterceptor {
    async fn intercept(&self, request: &RequestDescriptor, next: Next) -> Result<ResponseDescriptor> {
        let Some(key) = request.fingerprint().cloned() else {
            return next.run(request).await;
        };

        match self.store.lookup(&key) {
            Lookup::Fresh(entry) => {
                tracing::debug!(key = %key, "Cache hit");
                record_cache_event("hit");
                return Ok(entry.value.to_response());
            }
            Lookup::Stale(entry) => {
                tracing::debug!(key = %key, "Serving stale entry while revalidating");
                record_cache_event("stale");
                let response = entry.value.to_response();
                self.spawn_revalidation(request, key, entry, next);
                return Ok(response);
            }
            Lookup::Miss => record_cache_event("miss"),
        }

        let response = next.run(request).await?;
        self.store_response(request, &key, response).await
    }
}
