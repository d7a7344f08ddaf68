//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to backend:
//!     → circuit_breaker.rs (reject fast while open, admit one trial call when half-open)
//!     → transport + validation
//!     → circuit_breaker.rs (record success or failure)
//! ```
//!
//! # Design Decisions
//! - One breaker record per service name
//! - A response that fails validation counts as a failure
//! - No retries; the caller decides whether to try again

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerPermit, BreakerState, CircuitBreaker, ServiceHealthRecord};
