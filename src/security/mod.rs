//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Generation request:
//!     → rate_limit.rs (cooldown, per-window quota, concurrency slot)
//!     → signing.rs (request id, timestamp, HMAC signature)
//!     → Pass to transport
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any admission check failure
//! - Signature mismatches are indistinguishable to the caller
//! - Secrets never appear in diagnostics; use `signing::redact`

pub mod rate_limit;
pub mod signing;

pub use rate_limit::{ConcurrencySlot, RateLimitStatus, RateLimiter, ResourceKind};
pub use signing::{redact, RequestSignature, RequestSigner, SignedRequestMetadata};
