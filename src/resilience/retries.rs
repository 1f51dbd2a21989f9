//! Retry interceptor.
//!
//! # Design Decisions
//! - Only idempotent methods with replayable bodies are retried
//! - Connect failures and read timeouts are retryable; statuses are opt-in
//! - A retry budget caps retries to a share of recent traffic

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::chain::{Interceptor, Next};
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::observability::metrics::record_retry;
use crate::request::RequestDescriptor;
use crate::resilience::backoff::Backoff;
use crate::response::ResponseDescriptor;

const BUDGET_WINDOW: Duration = Duration::from_secs(10);

/// Limits retries to `ratio` of the requests seen in the current window,
/// with a floor of `min_retries`.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f64,
    min_retries: u64,
    requests: AtomicU64,
    retries: AtomicU64,
    window_start: Mutex<Instant>,
}

impl RetryBudget {
    pub fn new(ratio: f64, min_retries: u64) -> Self {
        Self {
            ratio,
            min_retries,
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            window_start: Mutex::new(Instant::now()),
        }
    }

    pub fn record_request(&self) {
        self.roll_window();
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Take one retry from the budget if any is left.
    pub fn try_acquire(&self) -> bool {
        self.roll_window();
        let requests = self.requests.load(Ordering::Relaxed);
        let allowed = ((requests as f64 * self.ratio) as u64).max(self.min_retries);
        self.retries
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| (used < allowed).then_some(used + 1))
            .is_ok()
    }

    fn roll_window(&self) {
        let Ok(mut start) = self.window_start.lock() else {
            return;
        };
        if start.elapsed() >= BUDGET_WINDOW {
            *start = Instant::now();
            self.requests.store(0, Ordering::Relaxed);
            self.retries.store(0, Ordering::Relaxed);
        }
    }
}

/// Whether an error is worth another attempt.
pub fn is_retryable_error(error: &Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Re-runs the rest of the chain on retryable failures.
#[derive(Debug)]
pub struct RetryInterceptor {
    max_attempts: u32,
    backoff: Backoff,
    retry_statuses: Vec<u16>,
    budget: RetryBudget,
}

impl RetryInterceptor {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::new(config.base_delay_ms, config.max_delay_ms),
            retry_statuses: config.retry_statuses.clone(),
            budget: RetryBudget::new(config.budget_ratio, config.min_retries_per_window),
        }
    }

    fn eligible(&self, request: &RequestDescriptor) -> bool {
        request.method().is_idempotent() && request.is_replayable()
    }

    fn should_retry(&self, attempt: u32, outcome: &Result<ResponseDescriptor>) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        let retryable = match outcome {
            Ok(response) => self.retry_statuses.contains(&response.status()),
            Err(err) => is_retryable_error(err),
        };
        retryable && self.budget.try_acquire()
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn intercept(&self, request: &RequestDescriptor, next: Next) -> Result<ResponseDescriptor> {
        self.budget.record_request();
        if !self.eligible(request) {
            return next.run(request).await;
        }

        let mut attempt = 1;
        loop {
            let outcome = next.run(request).await;
            if !self.should_retry(attempt, &outcome) {
                return outcome;
            }

            let delay = self.backoff.delay(attempt);
            match &outcome {
                Ok(response) => tracing::warn!(
                    method = %request.method(),
                    path = %request.path_query(),
                    attempt,
                    status = response.status(),
                    delay = ?delay,
                    "Retrying request"
                ),
                Err(err) => tracing::warn!(
                    method = %request.method(),
                    path = %request.path_query(),
                    attempt,
                    error = %err,
                    delay = ?delay,
                    "Retrying after transport error"
                ),
            }
            // Release the discarded response before sleeping.
            drop(outcome);
            record_retry();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
