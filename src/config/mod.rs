//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → runtime::ConfigApplier (reconcile runtime topology)
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → applier reconciles registries, publishes new snapshots
//!     → request path observes new topology
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ActiveHealthCheckConfig, ClusterConfig, DestinationConfig, HealthCheckConfig, ListenerConfig,
    PassiveHealthCheckConfig, ProxyConfig, RouteConfig,
};
