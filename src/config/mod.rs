//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → copied into each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; listen ports cannot change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::GatewayConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProvisionerConfig;
pub use schema::ProvisionerKind;
pub use schema::ProxyConfig;
pub use schema::ProxyMode;
pub use schema::PublishConfig;
pub use schema::RenewalConfig;
pub use schema::TimeoutConfig;
