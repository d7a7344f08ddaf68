//! AI backend guard: resilience and security around quiz generation calls.

pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod secrets;
pub mod validation;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
pub use pipeline::{GenerationRequest, GuardContext, QuizGenerator};
pub use provider::{create_provider, Provider};
