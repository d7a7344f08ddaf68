//! Durable key/value settings with transparent secret encryption.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{GuardError, GuardResult};
use crate::secrets::encryption::{Decrypted, EncryptionService};

/// Keys whose string values are encrypted at rest.
pub const SECRET_KEYS: &[&str] = &[
    "openai_api_key",
    "gemini_api_key",
    "openrouter_api_key",
    "request_signing_secret",
];

pub fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.contains(&key)
}

/// A JSON-file backed settings store.
#[derive(Debug)]
pub struct ConfigStore {
    inner: DashMap<String, Value>,
    persistence_path: Option<PathBuf>,
    encryption: EncryptionService,
}

impl ConfigStore {
    /// Create an empty in-memory store.
    pub fn new(encryption: EncryptionService, persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: DashMap::new(),
            persistence_path,
            encryption,
        }
    }

    /// Load from file if it exists; otherwise start empty.
    pub fn open(path: &Path, encryption: EncryptionService) -> GuardResult<Self> {
        let store = Self::new(encryption, Some(path.to_path_buf()));
        if path.exists() {
            let file = File::open(path).map_err(|e| storage_error(path, e))?;
            let map: BTreeMap<String, Value> = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| GuardError::Storage(format!("{}: {}", path.display(), e)))?;
            for (k, v) in map {
                store.inner.insert(k, v);
            }
            tracing::info!(path = %path.display(), entries = store.inner.len(), "Loaded settings");
        }
        Ok(store)
    }

    /// Read a value; secret keys come back decrypted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.inner.get(key).map(|r| r.value().clone())?;
        match value {
            Value::String(stored) if is_secret_key(key) => {
                let decrypted = self.encryption.decrypt_detailed(&stored);
                if decrypted.is_passthrough() {
                    tracing::warn!(key = %key, "Secret is stored unencrypted; run migrate-keys");
                }
                Some(Value::String(decrypted.into_inner()))
            }
            other => Some(other),
        }
    }

    /// Convenience accessor for string settings. Empty strings read as absent.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Write a value; secret keys are encrypted before they are stored.
    pub fn set(&self, key: &str, value: Value) {
        let value = match value {
            Value::String(plain) if is_secret_key(key) => Value::String(self.encryption.encrypt(&plain)),
            other => other,
        };
        self.inner.insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    /// The value exactly as persisted.
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Persist to disk atomically (temp file + rename).
    pub fn save(&self) -> GuardResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let map: BTreeMap<String, Value> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp).map_err(|e| storage_error(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &map)
                .map_err(|e| GuardError::Storage(format!("{}: {}", tmp.display(), e)))?;
            writer.flush().map_err(|e| storage_error(&tmp, e))?;
        }
        fs::rename(&tmp, path).map_err(|e| storage_error(path, e))?;
        tracing::debug!(path = %path.display(), entries = map.len(), "Saved settings");
        Ok(())
    }

    /// Encrypt any secret still stored in plaintext. Saves once if anything
    /// changed and returns how many values were migrated.
    pub fn migrate_api_keys(&self) -> GuardResult<usize> {
        let mut migrated = 0;
        for key in SECRET_KEYS {
            let Some(Value::String(stored)) = self.raw(key) else {
                continue;
            };
            if stored.is_empty() || EncryptionService::is_encrypted(&stored) {
                continue;
            }
            self.inner
                .insert(key.to_string(), Value::String(self.encryption.encrypt(&stored)));
            tracing::info!(key = %key, "Encrypted plaintext secret");
            migrated += 1;
        }

        if migrated > 0 {
            self.save()?;
        }
        Ok(migrated)
    }

    /// Decrypt a secret, reporting whether it was actually stored encrypted.
    pub fn audit_secret(&self, key: &str) -> Option<Decrypted> {
        match self.raw(key)? {
            Value::String(stored) => Some(self.encryption.decrypt_detailed(&stored)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> GuardError {
    GuardError::Storage(format!("{}: {}", path.display(), e))
}
