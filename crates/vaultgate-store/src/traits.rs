//! Store trait: the abstract interface for access-record persistence.
//!
//! This trait allows the manager to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use vaultgate_core::{AccessKey, AccessRecord, AccessStatus, RecordId, TemporaryToken};

use crate::error::Result;

/// Result of upserting an access record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for the key; a new lineage starts.
    Created,
    /// A record existed and was replaced (last writer wins). The previous
    /// lineage's id is reported for audit.
    Replaced {
        /// The record id that was overwritten.
        previous: RecordId,
    },
}

/// Which monotonic counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    AccessCount,
    FailedAttempts,
}

/// The store trait: async interface for access-record persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Atomic upsert**: the whole record, cipher triple included, is
///   written in one statement; concurrent grants race safely with
///   last-writer-wins semantics.
/// - **Atomic counters**: `find_and_increment` and `mark_accessed` are
///   increment-and-fetch, never read-modify-write, so concurrent
///   decrypts cannot lose updates.
/// - **Sweep discipline**: `sweep_expired` re-checks logical status
///   immediately before deleting and is never called from a request.
#[async_trait]
pub trait AccessRecordStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the record for its `(content_id, user_id)` key.
    async fn upsert(&self, record: &AccessRecord) -> Result<UpsertOutcome>;

    /// Fetch the record for a key.
    async fn find(&self, key: &AccessKey) -> Result<Option<AccessRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Counter Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Atomically increment a counter and return the new value.
    ///
    /// Errors with `NotFound` if no record exists for the key.
    async fn find_and_increment(&self, key: &AccessKey, field: CounterField) -> Result<u64>;

    /// Record a successful decrypt: increments `access_count`, stamps
    /// `last_accessed_at`, resets `failed_attempts`. Returns the new
    /// access count. Atomic.
    async fn mark_accessed(&self, key: &AccessKey, now: i64) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Status Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Set the stored status (used for lazy active→expired
    /// reclassification).
    async fn set_status(&self, key: &AccessKey, status: AccessStatus, now: i64) -> Result<()>;

    /// Mark a record revoked, stamping `revoked_at` and the reason.
    async fn mark_revoked(
        &self,
        key: &AccessKey,
        now: i64,
        reason: Option<&str>,
    ) -> Result<()>;

    /// Update the expiry window and the status that accompanies it
    /// (Extend reactivates expired records in the same write).
    async fn set_expiry(
        &self,
        key: &AccessKey,
        expires_at: i64,
        status: AccessStatus,
        now: i64,
    ) -> Result<()>;

    /// Enter the blocked state until the given time.
    async fn set_block(&self, key: &AccessKey, blocked_until: i64, now: i64) -> Result<()>;

    /// Clear an elapsed block: resets `failed_attempts` to zero, drops
    /// `blocked_until` and restores the given logical status.
    async fn clear_block(&self, key: &AccessKey, status: AccessStatus, now: i64) -> Result<()>;

    /// Attach or replace the temporary access token.
    async fn set_temporary_token(
        &self,
        key: &AccessKey,
        token: &TemporaryToken,
        now: i64,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Background Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Records whose expiry falls in `(now, cutoff]` and are still
    /// active. Feeds expiring-soon notifications.
    async fn expiring_between(&self, now: i64, cutoff: i64) -> Result<Vec<AccessRecord>>;

    /// Physically delete records whose logical expiry or revocation is
    /// older than the grace period. Logical status is re-evaluated per
    /// record at deletion time, so a concurrent Extend or re-grant is
    /// never clobbered. Returns the number of records deleted.
    async fn sweep_expired(&self, grace_ms: i64, now: i64) -> Result<usize>;
}
