//! # Vaultgate
//!
//! Time-bounded, cryptographically enforced access to paid digital
//! content. A grant encrypts the content locator under a key derived
//! deterministically from a process-wide master secret and the
//! `(content, user)` pair; possessing a database row is worthless
//! without the master key, and the record's state machine decides
//! whether decryption is even attempted.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultgate::{AccessControlManager, AccessKey};
//! use vaultgate_audit::{AuditLog, EventBus};
//! use vaultgate_core::{AccessConfig, ContentId, MasterKey, UserId};
//! use vaultgate_store::SqliteStore;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(SqliteStore::open("access.db")?);
//! let master = MasterKey::from_env("VAULTGATE_MASTER_KEY")?;
//! let (audit, bus) = AuditLog::start();
//!
//! let manager = AccessControlManager::new(store, master, AccessConfig::default(), bus);
//!
//! let content = ContentId::from("video-123");
//! let user = UserId::from("user-456");
//! manager
//!     .grant(content.clone(), user.clone(), "https://cdn.example/v/123.mp4", "tx-789", None)
//!     .await?;
//!
//! let access = manager.decrypt(&AccessKey::new(content, user)).await?;
//! println!("{}", access.url);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;

pub use error::{AccessError, Result};
pub use manager::{AccessControlManager, AccessVerdict, DecryptedAccess};

// Re-exported so callers need only this crate for common flows.
pub use vaultgate_core::{
    AccessConfig, AccessKey, AccessStatus, ContentId, MasterKey, RecordId, TemporaryToken, UserId,
};
