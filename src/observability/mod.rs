//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! sender / interceptors / transports produce:
//!     → logging.rs (tracing events, filtered by EnvFilter)
//!     → metrics.rs (counters and histograms via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The library only emits events; installing subscribers is up to the binary
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
