//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a manager over an in-memory
//! store with a fixed master key, a manual clock, and a live audit log.

use std::sync::Arc;

use vaultgate::AccessControlManager;
use vaultgate_audit::AuditLog;
use vaultgate_core::{AccessConfig, AccessKey, Clock, ContentId, ManualClock, MasterKey, UserId};
use vaultgate_store::MemoryStore;

/// The master key every fixture derives from. Deterministic so derived
/// keys are stable across test runs.
pub const FIXTURE_MASTER_KEY: [u8; 32] = [0xA5; 32];

/// A ready-to-use access-control setup over an in-memory store.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub manager: AccessControlManager<MemoryStore>,
    pub audit: AuditLog,
}

impl TestFixture {
    /// Create a fixture with default configuration, clock at zero.
    ///
    /// Must be called from within a tokio runtime (the audit log spawns
    /// its consumer task).
    pub fn new() -> Self {
        Self::with_config(AccessConfig::default())
    }

    /// Create a fixture with custom configuration.
    pub fn with_config(config: AccessConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let (audit, bus) = AuditLog::start();
        let manager = AccessControlManager::with_clock(
            Arc::clone(&store),
            MasterKey::from_bytes(FIXTURE_MASTER_KEY.to_vec())
                .expect("fixture key meets minimum length"),
            config,
            bus,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self {
            store,
            clock,
            manager,
            audit,
        }
    }

    /// A conventional test key.
    pub fn key(&self, content: &str, user: &str) -> AccessKey {
        AccessKey::new(ContentId::from(content), UserId::from(user))
    }

    /// Grant access for a key with a generated transaction id.
    pub async fn grant(&self, content: &str, user: &str, url: &str, ttl_days: i64) -> AccessKey {
        let key = self.key(content, user);
        self.manager
            .grant(
                key.content_id.clone(),
                key.user_id.clone(),
                url,
                &format!("tx-{content}-{user}"),
                Some(ttl_days),
            )
            .await
            .expect("fixture grant is valid");
        key
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
