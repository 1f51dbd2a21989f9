//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → Sender::from_config (transport + interceptor stack)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a sender is built from it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{from_toml_str, load_config, ConfigError};
pub use schema::{
    CacheConfig, ClientConfig, DefaultsConfig, ObservabilityConfig, RetryConfig, TransportConfig, TransportKind,
};
pub use validation::{validate_config, ValidationError};
