//! Error types for access operations.

use thiserror::Error;
use vaultgate_core::{CryptoError, KeyDerivationError, ValidationError};
use vaultgate_store::StoreError;

/// Errors surfaced by the access-control manager.
///
/// Decrypt failures are always the specific kind; callers can tell an
/// expired grant from a revoked one from a tampered record. Integrity
/// carries no detail about what failed verification.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A caller-supplied parameter was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No record exists for the key.
    #[error("no access record for {0}")]
    NotFound(String),

    /// The access window has passed. Recoverable via Extend.
    #[error("access expired")]
    Expired,

    /// The grant was revoked. Terminal for this lineage.
    #[error("access revoked")]
    Revoked,

    /// The record is inside a failed-attempt cooldown.
    #[error("access blocked until {retry_at}")]
    Blocked {
        /// When the cooldown ends (Unix ms).
        retry_at: i64,
    },

    /// AEAD verification failed: wrong key or tampered data.
    #[error("integrity check failed")]
    Integrity,

    /// Locator encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Master key missing or unusable. Fatal at startup.
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    /// Storage failure, propagated verbatim.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<CryptoError> for AccessError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Integrity => AccessError::Integrity,
            CryptoError::Encryption(msg) => AccessError::Encryption(msg),
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => AccessError::NotFound(key),
            other => AccessError::Store(other),
        }
    }
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
