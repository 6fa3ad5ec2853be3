//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, UPSTREAM_API_KEY, ...)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via AppState to all handlers
//!
//! On POST /admin/reload:
//!     loader.rs loads the file again
//!     → validation.rs validates
//!     → atomic swap of the token warning table only
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only soft thresholds are swappable
//! - All fields have defaults to allow minimal configs
//! - A missing upstream credential is fatal before any port is bound

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, read_config_file, ConfigError, CONFIG_PATH_VAR};
pub use schema::{
    AdminConfig, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    TelemetryConfig, TimeoutConfig, TokenWarningConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
