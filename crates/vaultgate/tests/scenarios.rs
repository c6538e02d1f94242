//! End-to-end lifecycle scenarios for the access manager.
//!
//! Every test drives time through a manual clock; nothing here sleeps
//! to make a grant expire. The in-memory store doubles as a tampering
//! harness: tests corrupt stored records directly to exercise the
//! fail-closed paths.

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{sleep, Duration};
use vaultgate::{
    AccessControlManager, AccessError, AccessKey, AccessStatus, ContentId, MasterKey, UserId,
};
use vaultgate_audit::AuditLog;
use vaultgate_core::{AccessConfig, Clock, ManualClock, MS_PER_DAY, MS_PER_MINUTE};
use vaultgate_store::{AccessRecordStore, MemoryStore, SqliteStore};

const URL: &str = "https://cdn.example/v/123.mp4";

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    manager: AccessControlManager<MemoryStore>,
    audit: AuditLog,
}

fn fixture() -> Fixture {
    fixture_with(AccessConfig::default())
}

fn fixture_with(config: AccessConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let (audit, bus) = AuditLog::start();
    let manager = AccessControlManager::with_clock(
        Arc::clone(&store),
        MasterKey::from_bytes(vec![0xA5; 32]).unwrap(),
        config,
        bus,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    Fixture {
        store,
        clock,
        manager,
        audit,
    }
}

fn key() -> AccessKey {
    AccessKey::new(ContentId::from("video-123"), UserId::from("user-456"))
}

impl Fixture {
    async fn grant(&self, ttl_days: i64) {
        self.manager
            .grant(
                ContentId::from("video-123"),
                UserId::from("user-456"),
                URL,
                "tx-789",
                Some(ttl_days),
            )
            .await
            .unwrap();
    }
}

/// Let the audit consumer task catch up.
async fn settle() {
    sleep(Duration::from_millis(25)).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: grant then decrypt
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn grant_then_decrypt_returns_exact_url() {
    let fx = fixture();
    fx.grant(30).await;

    let access = fx.manager.decrypt(&key()).await.unwrap();
    assert_eq!(access.url, URL);
    assert_eq!(access.expires_at, 30 * MS_PER_DAY);

    let verdict = fx.manager.verify(&key()).await.unwrap();
    assert_eq!(verdict.status, AccessStatus::Active);
    assert_eq!(verdict.access_count, 1);

    settle().await;
    assert_eq!(fx.audit.entries_of_kind("granted").len(), 1);
    assert_eq!(fx.audit.entries_of_kind("decrypted").len(), 1);
}

#[tokio::test]
async fn stored_ciphertext_is_not_the_url() {
    let fx = fixture();
    fx.grant(30).await;

    let record = fx.store.find(&key()).await.unwrap().unwrap();
    assert_ne!(record.locator.cipher_text.as_ref(), URL.as_bytes());
    assert_eq!(record.locator.cipher_text.len(), URL.len());
}

#[tokio::test]
async fn decrypt_unknown_key_is_not_found() {
    let fx = fixture();
    let result = fx.manager.decrypt(&key()).await;
    assert!(matches!(result, Err(AccessError::NotFound(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: expiry and extension
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_grant_fails_then_extend_reactivates() {
    let fx = fixture();
    fx.grant(1).await;

    fx.clock.set(2 * MS_PER_DAY);
    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Expired)
    ));

    // Base for the extension is now, not the stale expiry.
    let new_expires_at = fx.manager.extend(&key(), 30).await.unwrap();
    assert_eq!(new_expires_at, 32 * MS_PER_DAY);

    let access = fx.manager.decrypt(&key()).await.unwrap();
    assert_eq!(access.url, URL);
}

#[tokio::test]
async fn extend_on_live_grant_stacks_onto_remainder() {
    let fx = fixture();
    fx.grant(30).await;

    fx.clock.set(10 * MS_PER_DAY);
    let new_expires_at = fx.manager.extend(&key(), 7).await.unwrap();
    assert_eq!(new_expires_at, 37 * MS_PER_DAY);
}

#[tokio::test]
async fn extend_rejects_non_positive_days() {
    let fx = fixture();
    fx.grant(30).await;

    assert!(matches!(
        fx.manager.extend(&key(), 0).await,
        Err(AccessError::Validation(_))
    ));
    assert!(matches!(
        fx.manager.extend(&key(), -3).await,
        Err(AccessError::Validation(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: tampering, threshold block, cooldown recovery
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tampered_tag_blocks_after_threshold_and_cooldown_recovers() {
    let fx = fixture();
    fx.grant(30).await;

    // Corrupt the stored tag; keep the original for repair later.
    let pristine = fx.store.find(&key()).await.unwrap().unwrap();
    let mut tampered = pristine.clone();
    tampered.locator.auth_tag[0] ^= 0x01;
    fx.store.upsert(&tampered).await.unwrap();

    // Five integrity failures; the fifth crosses the threshold.
    for _ in 0..5 {
        assert!(matches!(
            fx.manager.decrypt(&key()).await,
            Err(AccessError::Integrity)
        ));
    }

    let blocked = fx.store.find(&key()).await.unwrap().unwrap();
    assert_eq!(blocked.status, AccessStatus::Blocked);
    assert_eq!(blocked.failed_attempts, 5);
    let blocked_until = blocked.blocked_until.unwrap();
    assert_eq!(blocked_until, 15 * MS_PER_MINUTE);

    // The sixth call is rejected by the block itself.
    match fx.manager.decrypt(&key()).await {
        Err(AccessError::Blocked { retry_at }) => assert_eq!(retry_at, blocked_until),
        other => panic!("expected Blocked, got {:?}", other.map(|_| ())),
    }

    // Repair the tag without disturbing the block state.
    let mut repaired = fx.store.find(&key()).await.unwrap().unwrap();
    repaired.locator.auth_tag = pristine.locator.auth_tag;
    fx.store.upsert(&repaired).await.unwrap();

    // Still inside the cooldown: blocked.
    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Blocked { .. })
    ));

    // Past the cooldown the block self-clears, the counter resets, and
    // the intact record decrypts again.
    fx.clock.set(blocked_until + 1);
    let access = fx.manager.decrypt(&key()).await.unwrap();
    assert_eq!(access.url, URL);

    let recovered = fx.store.find(&key()).await.unwrap().unwrap();
    assert_eq!(recovered.status, AccessStatus::Active);
    assert_eq!(recovered.failed_attempts, 0);
    assert_eq!(recovered.blocked_until, None);

    settle().await;
    // The block transition fired exactly once.
    assert_eq!(fx.audit.entries_of_kind("blocked").len(), 1);
    assert!(fx.audit.entries_of_kind("failed_attempt").len() >= 5);
}

#[tokio::test]
async fn tampered_ciphertext_and_nonce_each_fail_closed() {
    let fx = fixture();
    fx.grant(30).await;
    let pristine = fx.store.find(&key()).await.unwrap().unwrap();

    let mut bad_ct = pristine.clone();
    let mut ct = bad_ct.locator.cipher_text.to_vec();
    ct[0] ^= 0x01;
    bad_ct.locator.cipher_text = Bytes::from(ct);
    fx.store.upsert(&bad_ct).await.unwrap();
    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Integrity)
    ));

    let mut bad_nonce = pristine.clone();
    bad_nonce.locator.nonce.0[0] ^= 0x01;
    fx.store.upsert(&bad_nonce).await.unwrap();
    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Integrity)
    ));
}

#[tokio::test]
async fn cross_pair_locators_fail_closed() {
    let fx = fixture();
    fx.grant(30).await;
    fx.manager
        .grant(
            ContentId::from("video-999"),
            UserId::from("user-456"),
            "https://cdn.example/v/999.mp4",
            "tx-other",
            Some(30),
        )
        .await
        .unwrap();

    let other_key = AccessKey::new(ContentId::from("video-999"), UserId::from("user-456"));
    let other = fx.store.find(&other_key).await.unwrap().unwrap();

    // Graft the other pair's perfectly valid triple onto this record:
    // the derived keys differ, so it must not decrypt.
    let mut grafted = fx.store.find(&key()).await.unwrap().unwrap();
    grafted.locator = other.locator;
    fx.store.upsert(&grafted).await.unwrap();

    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Integrity)
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: revocation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn revoke_beats_remaining_ttl_and_is_terminal() {
    let fx = fixture();
    fx.grant(30).await;

    fx.manager.revoke(&key(), Some("refund")).await.unwrap();

    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Revoked)
    ));
    assert!(matches!(
        fx.manager.extend(&key(), 30).await,
        Err(AccessError::Revoked)
    ));

    // Time does not resurrect it.
    fx.clock.set(365 * MS_PER_DAY);
    let verdict = fx.manager.get_status(&key()).await.unwrap();
    assert_eq!(verdict.status, AccessStatus::Revoked);
}

#[tokio::test]
async fn revoke_is_idempotent() {
    let fx = fixture();
    fx.grant(30).await;

    fx.manager.revoke(&key(), Some("refund")).await.unwrap();
    fx.manager.revoke(&key(), Some("again")).await.unwrap();

    let record = fx.store.find(&key()).await.unwrap().unwrap();
    assert_eq!(record.revocation_reason.as_deref(), Some("refund"));

    settle().await;
    assert_eq!(fx.audit.entries_of_kind("revoked").len(), 1);
}

#[tokio::test]
async fn hammering_a_revoked_grant_never_blocks_or_resurrects_it() {
    let fx = fixture();
    fx.grant(30).await;
    fx.manager.revoke(&key(), Some("refund")).await.unwrap();

    // Well past the failure threshold: every attempt must report
    // Revoked, and none may write a block over the terminal state.
    for _ in 0..8 {
        assert!(matches!(
            fx.manager.decrypt(&key()).await,
            Err(AccessError::Revoked)
        ));
    }

    let record = fx.store.find(&key()).await.unwrap().unwrap();
    assert_eq!(record.status, AccessStatus::Revoked);
    assert_eq!(record.blocked_until, None);
    assert_eq!(record.failed_attempts, 8);

    // A cooldown's worth of time later it is still revoked, not active.
    fx.clock.set(16 * MS_PER_MINUTE);
    assert!(matches!(
        fx.manager.decrypt(&key()).await,
        Err(AccessError::Revoked)
    ));
    let verdict = fx.manager.verify(&key()).await.unwrap();
    assert_eq!(verdict.status, AccessStatus::Revoked);

    settle().await;
    assert!(fx.audit.entries_of_kind("blocked").is_empty());
}

#[tokio::test]
async fn regrant_after_revoke_starts_a_new_lineage() {
    let fx = fixture();
    fx.grant(30).await;
    let first = fx.store.find(&key()).await.unwrap().unwrap().record_id;

    fx.manager.revoke(&key(), None).await.unwrap();

    fx.clock.set(MS_PER_DAY);
    let second = fx
        .manager
        .grant(
            ContentId::from("video-123"),
            UserId::from("user-456"),
            URL,
            "tx-new",
            Some(30),
        )
        .await
        .unwrap();
    assert_ne!(first, second);

    let access = fx.manager.decrypt(&key()).await.unwrap();
    assert_eq!(access.url, URL);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: sweep
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_deletes_only_records_past_grace() {
    let fx = fixture();
    fx.grant(1).await;
    fx.manager
        .grant(
            ContentId::from("video-live"),
            UserId::from("user-456"),
            URL,
            "tx-live",
            Some(365),
        )
        .await
        .unwrap();

    // Expired but inside the 60-day grace: retained.
    fx.clock.set(30 * MS_PER_DAY);
    assert_eq!(fx.manager.run_sweep().await.unwrap(), 0);

    // Past the grace: deleted. The live grant is untouched.
    fx.clock.set(62 * MS_PER_DAY);
    assert_eq!(fx.manager.run_sweep().await.unwrap(), 1);

    assert!(fx.store.find(&key()).await.unwrap().is_none());
    let live_key = AccessKey::new(ContentId::from("video-live"), UserId::from("user-456"));
    assert!(fx.store.find(&live_key).await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_removes_revoked_records_after_grace() {
    let fx = fixture();
    fx.grant(365).await;
    fx.manager.revoke(&key(), Some("refund")).await.unwrap();

    // Revoked records age from revocation, not from their distant expiry.
    fx.clock.set(61 * MS_PER_DAY);
    assert_eq!(fx.manager.run_sweep().await.unwrap(), 1);
    assert!(fx.store.find(&key()).await.unwrap().is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite end-to-end
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_on_sqlite() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let clock = Arc::new(ManualClock::new(0));
    let manager = AccessControlManager::with_clock(
        Arc::clone(&store),
        MasterKey::from_bytes(vec![0x5A; 32]).unwrap(),
        AccessConfig::default(),
        vaultgate_audit::EventBus::disconnected(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    manager
        .grant(
            ContentId::from("video-123"),
            UserId::from("user-456"),
            URL,
            "tx-789",
            Some(1),
        )
        .await
        .unwrap();

    let access = manager.decrypt(&key()).await.unwrap();
    assert_eq!(access.url, URL);

    clock.set(2 * MS_PER_DAY);
    assert!(matches!(
        manager.decrypt(&key()).await,
        Err(AccessError::Expired)
    ));

    manager.extend(&key(), 7).await.unwrap();
    let access = manager.decrypt(&key()).await.unwrap();
    assert_eq!(access.url, URL);

    manager.revoke(&key(), Some("chargeback")).await.unwrap();
    assert!(matches!(
        manager.decrypt(&key()).await,
        Err(AccessError::Revoked)
    ));
}
