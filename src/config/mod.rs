//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! runtime.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RuntimeConfig (validated, immutable)
//!     → Runtime::builder() at startup
//!
//! dynamic_headers.yaml (HEADER_CONFIG_PATH or fallbacks)
//!     → headers.rs → HeaderConfig → header parsing in every request
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → atomic swap of the message tables
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the message tables hot-reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod headers;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use headers::{HeaderConfig, HeaderField, HeaderSection};
pub use loader::{load_config, ConfigError};
pub use schema::{
    ApiAuth, ApiConfig, DatabaseConfig, LogFormat, LoggingConfig, RequestLogConfig,
    RequestLogStoreKind, RuntimeConfig, ServerConfig,
};
