//! Error types for Vaultgate core primitives.

use thiserror::Error;

/// Validation errors for identifiers and grant parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content id must not be empty")]
    EmptyContentId,

    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("identifier exceeds {max} bytes (got {got})")]
    IdentifierTooLong { max: usize, got: usize },

    #[error("identifier contains control characters")]
    ControlCharacters,

    #[error("content locator must not be empty")]
    EmptyLocator,

    #[error("content locator exceeds {max} bytes (got {got})")]
    LocatorTooLong { max: usize, got: usize },

    #[error("purchase transaction id must not be empty")]
    EmptyTransactionId,

    #[error("ttl must be positive (got {0} days)")]
    NonPositiveTtl(i64),

    #[error("ttl exceeds {max} days (got {got})")]
    TtlTooLong { max: i64, got: i64 },
}

/// Key-derivation failures. Fatal: raised at construction time, before
/// the process serves any request.
#[derive(Debug, Error)]
pub enum KeyDerivationError {
    #[error("master key is missing")]
    MissingMasterKey,

    #[error("master key below minimum length: got {got} bytes, need {min}")]
    MasterKeyTooShort { got: usize, min: usize },

    #[error("master key is not valid hex: {0}")]
    InvalidHex(String),
}

/// Cipher failures.
///
/// `Integrity` deliberately carries no detail: tag-verification failure
/// must be indistinguishable between tamper and wrong key, and no partial
/// plaintext ever escapes.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("authenticated decryption failed")]
    Integrity,

    #[error("encryption failed: {0}")]
    Encryption(String),
}
