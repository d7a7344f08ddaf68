//! At-rest secret encryption.
//!
//! Storage format: `base64(IV ‖ ciphertext)`, AES-256-CBC with PKCS#7 padding
//! and a fresh random 16-byte IV per call.
//!
//! `decrypt` never fails. Anything that does not decode and decrypt cleanly
//! is handed back unchanged so plaintext values written before encryption was
//! enabled keep working. Use [`EncryptionService::decrypt_detailed`] when the
//! caller needs to tell the two cases apart.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::EncryptionConfig;
use crate::observability::metrics;
use crate::secrets::keys::{KeyMaterial, KEY_LEN};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Result of a decrypt attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// The value was ciphertext and decrypted cleanly.
    Plaintext(String),
    /// The value was not recognisable ciphertext and is returned as stored.
    Passthrough(String),
}

impl Decrypted {
    pub fn into_inner(self) -> String {
        match self {
            Decrypted::Plaintext(s) | Decrypted::Passthrough(s) => s,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Decrypted::Passthrough(_))
    }
}

/// Symmetric encryption for durable secrets.
#[derive(Clone)]
pub struct EncryptionService {
    key: [u8; KEY_LEN],
}

impl EncryptionService {
    /// Create a service from a raw 32-byte key.
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Derive the key from configuration and the host environment.
    pub fn from_config(config: &EncryptionConfig) -> Self {
        Self::new(KeyMaterial::from_config(config).derive_key())
    }

    /// Encrypt a secret. The empty string stays empty.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        BASE64.encode(out)
    }

    /// Decrypt a stored value, returning it unchanged if it is not ciphertext.
    pub fn decrypt(&self, stored: &str) -> String {
        self.decrypt_detailed(stored).into_inner()
    }

    /// Decrypt and report whether the passthrough fallback was taken.
    pub fn decrypt_detailed(&self, stored: &str) -> Decrypted {
        if stored.is_empty() {
            return Decrypted::Plaintext(String::new());
        }

        match self.try_decrypt(stored) {
            Some(plaintext) => Decrypted::Plaintext(plaintext),
            None => {
                metrics::record_decrypt_passthrough();
                Decrypted::Passthrough(stored.to_string())
            }
        }
    }

    fn try_decrypt(&self, stored: &str) -> Option<String> {
        let raw = BASE64.decode(stored.trim()).ok()?;
        if raw.len() < IV_LEN + BLOCK_LEN || (raw.len() - IV_LEN) % BLOCK_LEN != 0 {
            return None;
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv.try_into().ok()?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Heuristic: does the value look like our ciphertext format?
    ///
    /// Valid base64 whose payload holds an IV plus whole cipher blocks. This
    /// is classification, not proof.
    pub fn is_encrypted(value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        match BASE64.decode(value.trim()) {
            Ok(raw) => raw.len() >= IV_LEN + BLOCK_LEN && (raw.len() - IV_LEN) % BLOCK_LEN == 0,
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EncryptionService {
        EncryptionService::new([7u8; KEY_LEN])
    }

    #[test]
    fn test_roundtrip() {
        let svc = service();
        let long = "a".repeat(1000);
        for s in ["sk-test-123", "x", "ünïcödé secret ✓", long.as_str()] {
            let ct = svc.encrypt(s);
            assert_ne!(ct, s);
            assert!(EncryptionService::is_encrypted(&ct));
            assert_eq!(svc.decrypt(&ct), s);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let svc = service();
        let a = svc.encrypt("same secret");
        let b = svc.encrypt("same secret");
        assert_ne!(a, b);
        assert_eq!(svc.decrypt(&a), "same secret");
        assert_eq!(svc.decrypt(&b), "same secret");
    }

    #[test]
    fn test_empty_is_noop() {
        let svc = service();
        assert_eq!(svc.encrypt(""), "");
        assert_eq!(svc.decrypt(""), "");
        assert!(!EncryptionService::is_encrypted(""));
    }

    #[test]
    fn test_passthrough_for_non_ciphertext() {
        let svc = service();
        assert_eq!(svc.decrypt("not-ciphertext"), "not-ciphertext");
        // Valid base64 but too short to hold an IV.
        assert_eq!(svc.decrypt("c2hvcnQ="), "c2hvcnQ=");
        assert!(svc.decrypt_detailed("sk-proj-abc").is_passthrough());
    }

    #[test]
    fn test_bad_padding_passes_through() {
        let svc = service();
        let ct = svc.encrypt("secret");
        let mut raw = BASE64.decode(&ct).unwrap();
        assert_eq!(raw.len(), IV_LEN + BLOCK_LEN);

        // "secret" pads with ten 0x0a bytes. Flipping the IV turns the last
        // plaintext byte into 0x00, which is never valid PKCS7.
        raw[IV_LEN - 1] ^= 0x0a;
        let tampered = BASE64.encode(&raw);

        assert_eq!(
            svc.decrypt_detailed(&tampered),
            Decrypted::Passthrough(tampered.clone())
        );
        assert_eq!(svc.decrypt(&tampered), tampered);
    }

    #[test]
    fn test_wrong_key_never_yields_plaintext() {
        let ct = service().encrypt("secret");
        let other = EncryptionService::new([9u8; KEY_LEN]);
        assert_ne!(other.decrypt(&ct), "secret");
        if let Decrypted::Passthrough(s) = other.decrypt_detailed(&ct) {
            assert_eq!(s, ct);
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let text = format!("{:?}", service());
        assert!(text.contains("REDACTED"));
        assert!(!text.contains("7, 7"));
    }
}
