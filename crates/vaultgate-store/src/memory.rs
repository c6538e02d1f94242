//! In-memory implementation of the store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use vaultgate_core::{AccessKey, AccessRecord, AccessStatus, TemporaryToken};

use crate::error::{Result, StoreError};
use crate::traits::{AccessRecordStore, CounterField, UpsertOutcome};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock;
/// every mutation holds the write lock for its whole read-modify-write,
/// which gives the same atomicity the SQLite backend gets from its
/// serialized connection.
pub struct MemoryStore {
    records: RwLock<HashMap<AccessKey, AccessRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn with_record<T>(
        &self,
        key: &AccessKey,
        f: impl FnOnce(&mut AccessRecord) -> T,
    ) -> Result<T> {
        let mut records = self.records.write().expect("lock poisoned");
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(f(record))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessRecordStore for MemoryStore {
    async fn upsert(&self, record: &AccessRecord) -> Result<UpsertOutcome> {
        let mut records = self.records.write().expect("lock poisoned");
        let key = AccessKey::new(record.content_id.clone(), record.user_id.clone());

        match records.insert(key, record.clone()) {
            None => Ok(UpsertOutcome::Created),
            Some(previous) => Ok(UpsertOutcome::Replaced {
                previous: previous.record_id,
            }),
        }
    }

    async fn find(&self, key: &AccessKey) -> Result<Option<AccessRecord>> {
        let records = self.records.read().expect("lock poisoned");
        Ok(records.get(key).cloned())
    }

    async fn find_and_increment(&self, key: &AccessKey, field: CounterField) -> Result<u64> {
        self.with_record(key, |record| match field {
            CounterField::AccessCount => {
                record.access_count += 1;
                record.access_count
            }
            CounterField::FailedAttempts => {
                record.failed_attempts += 1;
                u64::from(record.failed_attempts)
            }
        })
    }

    async fn mark_accessed(&self, key: &AccessKey, now: i64) -> Result<u64> {
        self.with_record(key, |record| {
            record.access_count += 1;
            record.last_accessed_at = Some(now);
            record.failed_attempts = 0;
            record.updated_at = now;
            record.access_count
        })
    }

    async fn set_status(&self, key: &AccessKey, status: AccessStatus, now: i64) -> Result<()> {
        self.with_record(key, |record| {
            record.status = status;
            record.updated_at = now;
        })
    }

    async fn mark_revoked(
        &self,
        key: &AccessKey,
        now: i64,
        reason: Option<&str>,
    ) -> Result<()> {
        self.with_record(key, |record| {
            record.status = AccessStatus::Revoked;
            record.revoked_at = Some(now);
            record.revocation_reason = reason.map(String::from);
            record.updated_at = now;
        })
    }

    async fn set_expiry(
        &self,
        key: &AccessKey,
        expires_at: i64,
        status: AccessStatus,
        now: i64,
    ) -> Result<()> {
        self.with_record(key, |record| {
            record.expires_at = expires_at;
            record.status = status;
            record.updated_at = now;
        })
    }

    async fn set_block(&self, key: &AccessKey, blocked_until: i64, now: i64) -> Result<()> {
        self.with_record(key, |record| {
            record.status = AccessStatus::Blocked;
            record.blocked_until = Some(blocked_until);
            record.updated_at = now;
        })
    }

    async fn clear_block(&self, key: &AccessKey, status: AccessStatus, now: i64) -> Result<()> {
        self.with_record(key, |record| {
            record.status = status;
            record.blocked_until = None;
            record.failed_attempts = 0;
            record.updated_at = now;
        })
    }

    async fn set_temporary_token(
        &self,
        key: &AccessKey,
        token: &TemporaryToken,
        now: i64,
    ) -> Result<()> {
        self.with_record(key, |record| {
            record.temporary_access_token = Some(token.clone());
            record.updated_at = now;
        })
    }

    async fn expiring_between(&self, now: i64, cutoff: i64) -> Result<Vec<AccessRecord>> {
        let records = self.records.read().expect("lock poisoned");
        Ok(records
            .values()
            .filter(|r| {
                r.status == AccessStatus::Active && r.expires_at > now && r.expires_at <= cutoff
            })
            .cloned()
            .collect())
    }

    async fn sweep_expired(&self, grace_ms: i64, now: i64) -> Result<usize> {
        let mut records = self.records.write().expect("lock poisoned");
        let before = records.len();
        records.retain(|_, record| !record.sweepable(grace_ms, now));
        Ok(before - records.len())
    }
}
