//! Credential encryption using AES-256-GCM
//!
//! Tenant database connection strings are stored encrypted at rest and only
//! decrypted in memory when a connection must be established. The cipher key
//! is derived once at process start from the server secret via Argon2id,
//! never used raw.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty plaintext")]
    EmptyPlaintext,
}

/// Secure wrapper for the derived cipher key with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct ZeroizingKey(Vec<u8>);

/// Argon2id parameters for the startup key derivation. The work factor is
/// fixed per derivation call, so leaking these parameters does not weaken
/// brute-force resistance.
const ARGON2_MEMORY_KIB: u32 = 65536;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Symmetric cipher over tenant credentials.
///
/// Stored format is `<ivHex>:<cipherHex>` (both lowercase hex). The IV is
/// public; only IV reuse, not IV disclosure, must be avoided, and a fresh
/// random nonce is drawn per `encrypt` call.
pub struct CredentialCipher {
    key: ZeroizingKey,
}

impl CredentialCipher {
    /// Derive the cipher key from the server-held secret and salt.
    ///
    /// Runs Argon2id once; callers construct the cipher at startup and
    /// share it, not per request.
    pub fn from_secret(secret: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(KEY_LEN),
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = vec![0u8; KEY_LEN];
        argon2
            .hash_password_into(secret.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            key: ZeroizingKey(key),
        })
    }

    /// Encrypt a connection string for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Err(CryptoError::EmptyPlaintext);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.0));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    /// Decrypt a stored `<ivHex>:<cipherHex>` credential.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let (iv_hex, cipher_hex) = stored.split_once(':').ok_or(CryptoError::InvalidFormat)?;

        let nonce_bytes = hex::decode(iv_hex).map_err(|_| CryptoError::InvalidFormat)?;
        let ciphertext = hex::decode(cipher_hex).map_err(|_| CryptoError::InvalidFormat)?;
        if nonce_bytes.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
            return Err(CryptoError::InvalidFormat);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.0));
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}
