//! Encryption key derivation.
//!
//! The key is PBKDF2-HMAC-SHA256(installation id, salt, 10 000 rounds, 32 bytes).
//! Salt priority:
//! 1. explicit override (config, or `AI_GUARD_ENCRYPTION_SALT`)
//! 2. host-provided installation secret (`AI_GUARD_INSTALLATION_SECRET`)
//! 3. SHA-256 of installation id, install path and hostname, each prefixed
//!    with its length so field boundaries cannot shift

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};

use crate::config::EncryptionConfig;

/// Environment variable holding an explicit salt override.
pub const SALT_OVERRIDE_ENV_VAR: &str = "AI_GUARD_ENCRYPTION_SALT";

/// Environment variable holding the host-provided installation secret.
pub const INSTALLATION_SECRET_ENV_VAR: &str = "AI_GUARD_INSTALLATION_SECRET";

pub const PBKDF2_ROUNDS: u32 = 10_000;
pub const KEY_LEN: usize = 32;

/// Where the salt came from; logged at startup, the salt itself never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaltSource {
    Override,
    InstallationSecret,
    Fallback,
}

/// Inputs for key derivation.
#[derive(Clone)]
pub struct KeyMaterial {
    pub installation_id: String,
    pub install_path: String,
    pub hostname: String,
    pub salt_override: Option<String>,
    pub installation_secret: Option<String>,
}

impl KeyMaterial {
    /// Gather inputs from configuration and the environment.
    pub fn from_config(config: &EncryptionConfig) -> Self {
        let env_nonempty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            installation_id: config.installation_id.clone(),
            install_path: config.install_path.clone(),
            hostname: hostname(),
            salt_override: config
                .salt_override
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| env_nonempty(SALT_OVERRIDE_ENV_VAR)),
            installation_secret: env_nonempty(INSTALLATION_SECRET_ENV_VAR),
        }
    }

    /// Pick the salt by priority.
    pub fn salt(&self) -> (String, SaltSource) {
        if let Some(salt) = &self.salt_override {
            return (salt.clone(), SaltSource::Override);
        }
        if let Some(secret) = &self.installation_secret {
            return (secret.clone(), SaltSource::InstallationSecret);
        }
        let mut hasher = Sha256::new();
        for field in [&self.installation_id, &self.install_path, &self.hostname] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        (hex::encode(hasher.finalize()), SaltSource::Fallback)
    }

    /// Derive the 32-byte cipher key.
    pub fn derive_key(&self) -> [u8; KEY_LEN] {
        let (salt, source) = self.salt();
        tracing::debug!(salt_source = ?source, rounds = PBKDF2_ROUNDS, "Deriving encryption key");
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(
            self.installation_id.as_bytes(),
            salt.as_bytes(),
            PBKDF2_ROUNDS,
            &mut key,
        );
        key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("KeyMaterial")
            .field("installation_id", &self.installation_id)
            .field("install_path", &self.install_path)
            .field("hostname", &self.hostname)
            .field("salt_override", &redacted(&self.salt_override))
            .field("installation_secret", &redacted(&self.installation_secret))
            .finish()
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}
