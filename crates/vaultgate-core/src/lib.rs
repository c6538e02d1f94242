//! # Vaultgate Core
//!
//! Core primitives for time-bounded, cryptographically enforced content
//! access:
//!
//! - **Identifiers**: strongly typed content/user/record ids
//! - **AccessRecord**: the persisted grant with its four-state lifecycle
//! - **KeyDerivation**: deterministic HMAC-SHA256 per-(content, user) keys
//!   from a process-wide master secret
//! - **ContentCipher**: AEAD encryption of content locators with an
//!   explicit (ciphertext, nonce, tag) triple
//!
//! The crate is deliberately free of I/O and business logic; storage
//! lives in `vaultgate-store` and orchestration in `vaultgate`.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod record;
pub mod types;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AccessConfig;
pub use crypto::{
    CipherNonce, ContentCipher, DerivedKey, EncryptedLocator, KeyDerivation, MasterKey,
    MIN_MASTER_KEY_LEN, NONCE_LEN, TAG_LEN,
};
pub use error::{CryptoError, KeyDerivationError, ValidationError};
pub use record::{AccessRecord, AccessStatus, TemporaryToken, MS_PER_DAY, MS_PER_MINUTE};
pub use types::{AccessKey, ContentId, RecordId, UserId};
