//! Key derivation and the authenticated envelope the knowledge store writes.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::StoreError;
use crate::config::StoreConfig;

const KEY_SALT: &[u8] = b"mimic.knowledge.salt.v1";
const NONCE_LEN: usize = 12;

/// Identity of the machine the store is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub platform: String,
    pub display: String,
    pub locale: String,
}

impl DeviceFingerprint {
    pub fn new(
        platform: impl Into<String>,
        display: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            display: display.into(),
            locale: locale.into(),
        }
    }

    /// Platform from the build target; display and locale from config, then the environment.
    pub fn detect(config: &StoreConfig) -> Self {
        let platform = format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH);
        let display = config
            .display
            .clone()
            .or_else(|| std::env::var("MIMIC_DISPLAY").ok())
            .unwrap_or_else(|| "unknown".to_string());
        let locale = config
            .locale
            .clone()
            .or_else(|| std::env::var("LANG").ok())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "C".to_string());
        Self::new(platform, display, locale)
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.platform, self.display, self.locale)
    }
}

/// PBKDF2-HMAC-SHA256 over `secret ‖ fingerprint` with the fixed salt.
pub fn derive_key(secret: &str, fingerprint: &DeviceFingerprint, iterations: u32) -> [u8; 32] {
    let mut password = secret.as_bytes().to_vec();
    password.extend_from_slice(fingerprint.to_string().as_bytes());

    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(&password, KEY_SALT, iterations.max(1), &mut key);
    key
}

/// Obfuscated substrate key for a store namespace.
///
/// Deterministic: the name depends on neither the secret nor the device
/// fingerprint, so a store opened with another key still finds the entry it
/// cannot decrypt and deletes it.
pub fn obfuscated_key_name(namespace: &str) -> String {
    let digest = Sha256::digest(namespace.as_bytes());
    format!("kb_{}", &hex::encode(digest)[..16])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the 96-bit nonce.
    pub nonce: String,
    /// Base64 of ciphertext plus tag.
    pub ciphertext: String,
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
}

pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Encrypt under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8], schema_version: u32) -> Result<Envelope, StoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| StoreError::Crypto(e.to_string()))?;

        Ok(Envelope {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
            schema_version,
            timestamp: Utc::now(),
        })
    }

    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, StoreError> {
        let nonce = STANDARD
            .decode(&envelope.nonce)
            .map_err(|e| StoreError::Crypto(format!("nonce: {}", e)))?;
        if nonce.len() != NONCE_LEN {
            return Err(StoreError::Crypto(format!(
                "nonce has {} bytes, expected {}",
                nonce.len(),
                NONCE_LEN
            )));
        }
        let ciphertext = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| StoreError::Crypto(format!("ciphertext: {}", e)))?;

        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| StoreError::Crypto("authentication failed".into()))
    }
}
