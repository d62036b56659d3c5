// SPDX-License-Identifier: MIT

//! Credential encryption at rest (AES-256-GCM).
//!
//! Ciphertext wire format: `nonce_hex:tag_hex:data_hex`. The key comes from
//! configuration and is validated once at service construction.

use crate::error::AppError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

const TAG_LENGTH: usize = 16;

/// Encryption service for CGM credential secrets.
#[derive(Clone)]
pub struct CryptoService {
    key: Key<Aes256Gcm>,
}

impl CryptoService {
    /// Create a new crypto service from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, AppError> {
        if key.len() != 32 {
            return Err(AppError::Config("APP_ENCRYPTION_KEY"));
        }
        Ok(Self {
            key: *Key::<Aes256Gcm>::from_slice(key),
        })
    }

    /// Encrypt a plaintext secret. Each call uses a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Encryption failed")))?;

        // aes-gcm appends the auth tag to the ciphertext; split it out to
        // keep the nonce:tag:data wire format.
        let tag = ciphertext.split_off(ciphertext.len() - TAG_LENGTH);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a secret produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encrypted: &str) -> Result<String, AppError> {
        let mut parts = encrypted.splitn(3, ':');
        let (nonce_hex, tag_hex, data_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(t), Some(d)) => (n, t, d),
            _ => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Invalid encrypted data format"
                )))
            }
        };

        let nonce = hex::decode(nonce_hex)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid nonce hex: {}", e)))?;
        if nonce.len() != 12 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Invalid nonce length: {}",
                nonce.len()
            )));
        }
        let tag = hex::decode(tag_hex)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid tag hex: {}", e)))?;
        let mut data = hex::decode(data_hex)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid data hex: {}", e)))?;

        // Reassemble data||tag as aes-gcm expects
        data.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), data.as_slice())
            .map_err(|_| {
                AppError::Internal(anyhow::anyhow!("Decryption failed (wrong key or tampered)"))
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

/// Helper to encrypt a credential pair before storing.
pub fn encrypt_pair(
    crypto: &CryptoService,
    first: &str,
    second: &str,
) -> Result<(String, String), AppError> {
    Ok((crypto.encrypt(first)?, crypto.encrypt(second)?))
}

/// Helper to decrypt a credential pair after retrieval.
pub fn decrypt_pair(
    crypto: &CryptoService,
    first: &str,
    second: &str,
) -> Result<(String, String), AppError> {
    Ok((crypto.decrypt(first)?, crypto.decrypt(second)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CryptoService {
        CryptoService::new(&[0x42; 32]).unwrap()
    }

    #[test]
    fn round_trip() {
        let crypto = service();
        let encrypted = crypto.encrypt("diabetic@example.com").unwrap();
        assert_eq!(crypto.decrypt(&encrypted).unwrap(), "diabetic@example.com");
    }

    #[test]
    fn distinct_nonce_per_call() {
        let crypto = service();
        let a = crypto.encrypt("secret").unwrap();
        let b = crypto.encrypt("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let crypto = service();
        let encrypted = crypto.encrypt("secret").unwrap();

        let mut tampered = encrypted.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert!(crypto.decrypt(&tampered).is_err());
    }

    #[test]
    fn malformed_input_fails() {
        let crypto = service();
        assert!(crypto.decrypt("no-colons-here").is_err());
        assert!(crypto.decrypt("zz:zz:zz").is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = service().encrypt("secret").unwrap();
        let other = CryptoService::new(&[0x43; 32]).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn short_key_rejected() {
        assert!(CryptoService::new(&[0x42; 16]).is_err());
    }
}
