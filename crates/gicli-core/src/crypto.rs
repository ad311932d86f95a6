// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secret-at-rest encryption for `ENC:`-prefixed configuration strings.
//!
//! Wire format: `ENC:` followed by base64 of `IV(16) || ciphertext || tag(16)`.
//! Cipher: AES-256-GCM with a 16-byte nonce. Key: scrypt over the master key
//! with a fixed salt (N=2^14, r=8, p=1, 32-byte output), so the same master
//! key always derives the same cipher key and configuration files stay
//! portable between hosts.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Nonce, aes::Aes256};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;

use crate::error::CoreError;

/// Marker prefix of encrypted configuration strings.
pub const ENC_PREFIX: &str = "ENC:";

/// Fixed key-derivation salt; part of the wire format.
const KDF_SALT: &[u8] = b"salt";

/// AES-256 key length.
const KEY_SIZE: usize = 32;

/// GCM nonce length used by the wire format.
const IV_SIZE: usize = 16;

/// GCM authentication tag length.
const TAG_SIZE: usize = 16;

type Cipher = AesGcm<Aes256, U16>;

/// Encrypts and decrypts `ENC:` strings with a key derived from the master
/// key.
pub struct SecretBox {
    key: [u8; KEY_SIZE],
}

impl SecretBox {
    /// Derive the cipher key from the master key via scrypt.
    pub fn new(master_key: &str) -> Result<Self, CoreError> {
        let params = scrypt::Params::new(14, 8, 1, KEY_SIZE).map_err(|e| CoreError::Crypto {
            reason: format!("invalid scrypt parameters: {e}"),
        })?;

        let mut key = [0u8; KEY_SIZE];
        scrypt::scrypt(master_key.as_bytes(), KDF_SALT, &params, &mut key).map_err(|e| {
            CoreError::Crypto {
                reason: format!("key derivation failed: {e}"),
            }
        })?;

        Ok(SecretBox { key })
    }

    /// Whether a string carries the `ENC:` prefix.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENC_PREFIX)
    }

    /// Encrypt a plaintext string into the `ENC:` wire format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let cipher = Cipher::new_from_slice(&self.key).map_err(|e| CoreError::Crypto {
            reason: format!("failed to initialize cipher: {e}"),
        })?;

        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        // encrypt() appends the tag to the ciphertext
        let sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CoreError::Crypto {
                reason: "encryption failed".to_string(),
            })?;

        let mut payload = Vec::with_capacity(IV_SIZE + sealed.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&sealed);

        Ok(format!(
            "{ENC_PREFIX}{}",
            general_purpose::STANDARD.encode(payload)
        ))
    }

    /// Decrypt an `ENC:` string back to its plaintext.
    pub fn decrypt(&self, value: &str) -> Result<String, CoreError> {
        let encoded = value.strip_prefix(ENC_PREFIX).ok_or_else(|| CoreError::Crypto {
            reason: "value does not carry the ENC: prefix".to_string(),
        })?;

        let payload = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::Crypto {
                reason: format!("invalid base64 payload: {e}"),
            })?;

        if payload.len() < IV_SIZE + TAG_SIZE {
            return Err(CoreError::Crypto {
                reason: "encrypted payload too short".to_string(),
            });
        }

        let cipher = Cipher::new_from_slice(&self.key).map_err(|e| CoreError::Crypto {
            reason: format!("failed to initialize cipher: {e}"),
        })?;

        let (iv, sealed) = payload.split_at(IV_SIZE);
        let plaintext = cipher
            .decrypt(Nonce::<U16>::from_slice(iv), sealed)
            .map_err(|_| CoreError::Crypto {
                reason: "decryption failed (wrong key or tampered payload)".to_string(),
            })?;

        String::from_utf8(plaintext).map_err(|_| CoreError::Crypto {
            reason: "decrypted payload is not valid UTF-8".to_string(),
        })
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random master key as 32 hex-encoded bytes.
pub fn generate_master_key() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
