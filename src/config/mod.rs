//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → handed to GuardContext / provider factory at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets never live here; they go through the encrypted store

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::GuardConfig;
pub use schema::{
    CircuitBreakerConfig, EncryptionConfig, ObservabilityConfig, PromptConfig, ProviderConfig,
    RateLimitConfig, SigningConfig, StoreConfig, TimeoutConfig,
};
