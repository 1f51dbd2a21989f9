//! Ordered multi-valued name/value containers.
//!
//! # Data Flow
//! ```text
//! builder.param("{id}", ..) / param(";v", ..) / param("q", ..)
//!     → kind.rs (classify sigil once: Path | Matrix | Query)
//!     → container.rs (ordered name → values storage)
//!     → request::path_query (placement into path and query)
//! ```
//!
//! # Design Decisions
//! - Names are case-sensitive and unique; values keep insertion order
//! - "Present without a value" is stored as a single blank placeholder
//! - Headers and parameters share the same container type

pub mod container;
pub mod kind;

pub use container::ParamContainer;
pub use kind::ParamKind;
