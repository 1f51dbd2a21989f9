//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! RetryInterceptor
//!     → next.run(request)
//!     → on a retryable failure: backoff.rs delay, retry budget check
//!     → next.run(request) again (same descriptor)
//! ```
//!
//! # Design Decisions
//! - Retries live in the chain; transports never retry
//! - Non-idempotent methods and streaming bodies go through once
//! - Jittered backoff spreads retries from concurrent callers

pub mod backoff;
pub mod retries;

pub use backoff::Backoff;
pub use retries::{RetryBudget, RetryInterceptor};
