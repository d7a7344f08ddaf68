//! Secret protection subsystem.
//!
//! # Data Flow
//! ```text
//! EncryptionConfig + environment
//!     → keys.rs (PBKDF2 key derivation, salt priority)
//!     → encryption.rs (AES-256-CBC, base64(IV ‖ ciphertext))
//!     → store.rs (JSON settings file, secret keys encrypted on set/decrypted on get)
//! ```
//!
//! # Security Constraints
//! - Secrets and derived keys are never logged
//! - Decryption never fails; legacy plaintext passes through and is flagged
//! - Once encrypted, plaintext never re-enters storage

pub mod encryption;
pub mod keys;
pub mod store;

pub use encryption::{Decrypted, EncryptionService};
pub use store::{ConfigStore, SECRET_KEYS};
