// src/security/crypto.rs — Secret encryption at rest (AES-256-GCM)

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::infra::errors::{FlywheelError, Result};

/// Wire prefix for encrypted values. Values without it pass through
/// `decrypt` unchanged, so plaintext stores keep working after enabling
/// encryption.
const WIRE_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;
const MIN_PASSPHRASE_LEN: usize = 8;

/// AES-256-GCM encryptor with a key derived from a passphrase via SHA-256.
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(passphrase: &str) -> Result<Self> {
        if passphrase.len() < MIN_PASSPHRASE_LEN {
            return Err(FlywheelError::Crypto(format!(
                "passphrase must be at least {MIN_PASSPHRASE_LEN} characters"
            )));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt to `enc:v1:` + base64(nonce ‖ ciphertext). A fresh random
    /// nonce per call means equal plaintexts encrypt differently.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| FlywheelError::Crypto(format!("encrypt failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{WIRE_PREFIX}{}", BASE64.encode(payload)))
    }

    /// Decrypt a wire value. Non-prefixed input is returned unchanged.
    pub fn decrypt(&self, value: &str) -> Result<String> {
        let Some(encoded) = value.strip_prefix(WIRE_PREFIX) else {
            return Ok(value.to_string());
        };

        let payload = BASE64
            .decode(encoded)
            .map_err(|e| FlywheelError::Crypto(format!("invalid base64: {e}")))?;
        if payload.len() < NONCE_LEN {
            return Err(FlywheelError::Crypto("payload too short".into()));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| FlywheelError::Crypto("decrypt failed: bad key or tampered data".into()))?;

        String::from_utf8(plaintext)
            .map_err(|e| FlywheelError::Crypto(format!("decrypted bytes not UTF-8: {e}")))
    }
}
