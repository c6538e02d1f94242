//! Key derivation and the content cipher.
//!
//! No per-record key is ever stored: the same `(content, user, version)`
//! inputs must always re-derive the same key at decrypt time, so the
//! derivation is a plain HMAC-SHA256 over the domain-separated inputs.
//! Encryption is ChaCha20-Poly1305 with a fresh random 96-bit nonce per
//! call and the 128-bit tag stored alongside the ciphertext.

use bytes::Bytes;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::error::{CryptoError, KeyDerivationError};
use crate::types::{ContentId, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Minimum master key length in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// The process-wide master secret.
///
/// Loaded once at startup and immutable afterwards. Never serialized,
/// never logged; `Debug` redacts the contents.
#[derive(Clone)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    /// Create from raw bytes, enforcing the minimum length.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyDerivationError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(KeyDerivationError::MissingMasterKey);
        }
        if bytes.len() < MIN_MASTER_KEY_LEN {
            return Err(KeyDerivationError::MasterKeyTooShort {
                got: bytes.len(),
                min: MIN_MASTER_KEY_LEN,
            });
        }
        Ok(Self(bytes))
    }

    /// Create from a hex-encoded string (the usual secret-store format).
    pub fn from_hex(s: &str) -> Result<Self, KeyDerivationError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| KeyDerivationError::InvalidHex(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Load from an environment variable holding a hex-encoded key.
    pub fn from_env(var: &str) -> Result<Self, KeyDerivationError> {
        match std::env::var(var) {
            Ok(v) if !v.is_empty() => Self::from_hex(&v),
            _ => Err(KeyDerivationError::MissingMasterKey),
        }
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey(<{} bytes redacted>)", self.0.len())
    }
}

/// A 256-bit symmetric key derived for one `(content, user, version)` triple.
#[derive(Clone)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey(<redacted>)")
    }
}

/// Deterministic per-(content, user) key derivation.
///
/// `algorithm_version` is part of the derivation input: rotating the
/// master parameters only requires bumping the version for new grants,
/// while old records keep decrypting under their stored version.
pub struct KeyDerivation {
    master: MasterKey,
}

impl KeyDerivation {
    /// Create the service. The master key is validated up front; a short
    /// or missing key refuses construction.
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Derive the AEAD key for one record.
    ///
    /// Inputs are length-prefixed so `("ab","c")` and `("a","bc")` can
    /// never collide.
    pub fn derive(
        &self,
        content_id: &ContentId,
        user_id: &UserId,
        algorithm_version: u32,
    ) -> DerivedKey {
        // Fully qualified: the AEAD's KeyInit also has new_from_slice.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.master.0)
            .expect("HMAC accepts keys of any length");

        mac.update(&algorithm_version.to_be_bytes());

        let content = content_id.as_str().as_bytes();
        mac.update(&(content.len() as u16).to_be_bytes());
        mac.update(content);

        let user = user_id.as_str().as_bytes();
        mac.update(&(user.len() as u16).to_be_bytes());
        mac.update(user);

        let digest = mac.finalize().into_bytes();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        DerivedKey(key)
    }
}

/// A 96-bit nonce, generated fresh for every encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherNonce(pub [u8; NONCE_LEN]);

impl CipherNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// The encrypted content locator triple.
///
/// The three components are written and read together, never partially
/// updated. The tag is held separately from the ciphertext so corruption
/// of either is independently visible in storage and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedLocator {
    /// Ciphertext without the trailing tag.
    pub cipher_text: Bytes,

    /// The per-encryption nonce.
    pub nonce: CipherNonce,

    /// The 128-bit Poly1305 authentication tag.
    pub auth_tag: [u8; TAG_LEN],
}

/// Authenticated encryption of content locators. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentCipher;

impl ContentCipher {
    /// Create the cipher.
    pub fn new() -> Self {
        Self
    }

    /// Encrypt a locator under the derived key.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key: &DerivedKey,
    ) -> Result<EncryptedLocator, CryptoError> {
        let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let nonce = CipherNonce::generate();
        let mut combined = cipher
            .encrypt(Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        // The AEAD appends the tag; split it off so the triple is explicit.
        let tag_start = combined.len() - TAG_LEN;
        let tag_vec = combined.split_off(tag_start);
        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&tag_vec);

        Ok(EncryptedLocator {
            cipher_text: Bytes::from(combined),
            nonce,
            auth_tag,
        })
    }

    /// Decrypt a locator.
    ///
    /// Verifies the tag before releasing anything; on failure no
    /// plaintext, partial or otherwise, is returned.
    pub fn decrypt(
        &self,
        locator: &EncryptedLocator,
        key: &DerivedKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::Integrity)?;

        let mut combined =
            Vec::with_capacity(locator.cipher_text.len() + TAG_LEN);
        combined.extend_from_slice(&locator.cipher_text);
        combined.extend_from_slice(&locator.auth_tag);

        cipher
            .decrypt(Nonce::from_slice(locator.nonce.as_bytes()), combined.as_slice())
            .map_err(|_| CryptoError::Integrity)
    }
}
