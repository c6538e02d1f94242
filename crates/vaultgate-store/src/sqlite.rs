//! SQLite implementation of the store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. The connection is
//! serialized behind a mutex, so each closure runs atomically with
//! respect to every other store call; counter updates are single
//! `UPDATE ... SET x = x + 1` statements, never read-modify-write.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use vaultgate_core::{
    AccessKey, AccessRecord, AccessStatus, CipherNonce, ContentId, EncryptedLocator, RecordId,
    TemporaryToken, UserId, NONCE_LEN, TAG_LEN,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AccessRecordStore, CounterField, UpsertOutcome};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| internal_error(&format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| internal_error(&format!("spawn_blocking failed: {}", e)))?
    }
}

fn internal_error(msg: &str) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(msg.to_string()),
    ))
}

const RECORD_COLUMNS: &str = "content_id, user_id, record_id, cipher_text, nonce, auth_tag,
     algorithm_version, status, created_at, expires_at, last_accessed_at,
     access_count, failed_attempts, blocked_until, revoked_at, revocation_reason,
     purchase_transaction_id, temp_token, temp_token_expires_at, updated_at";

// Helper to convert a row to an AccessRecord.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessRecord> {
    let record_id_bytes: Vec<u8> = row.get("record_id")?;
    let cipher_text: Vec<u8> = row.get("cipher_text")?;
    let nonce_bytes: Vec<u8> = row.get("nonce")?;
    let tag_bytes: Vec<u8> = row.get("auth_tag")?;
    let status_int: i64 = row.get("status")?;
    let temp_token: Option<String> = row.get("temp_token")?;
    let temp_token_expires_at: Option<i64> = row.get("temp_token_expires_at")?;

    let blob_err =
        |name: &str| rusqlite::Error::InvalidColumnType(0, name.into(), rusqlite::types::Type::Blob);

    let nonce: [u8; NONCE_LEN] = nonce_bytes.try_into().map_err(|_| blob_err("nonce"))?;
    let auth_tag: [u8; TAG_LEN] = tag_bytes.try_into().map_err(|_| blob_err("auth_tag"))?;
    let record_id: [u8; 32] = record_id_bytes
        .try_into()
        .map_err(|_| blob_err("record_id"))?;

    let status = AccessStatus::from_i64(status_int)
        .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(7, status_int))?;

    Ok(AccessRecord {
        record_id: RecordId::from_bytes(record_id),
        content_id: ContentId::new(row.get::<_, String>("content_id")?),
        user_id: UserId::new(row.get::<_, String>("user_id")?),
        locator: EncryptedLocator {
            cipher_text: Bytes::from(cipher_text),
            nonce: CipherNonce::from_bytes(nonce),
            auth_tag,
        },
        algorithm_version: row.get("algorithm_version")?,
        status,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
        last_accessed_at: row.get("last_accessed_at")?,
        access_count: row.get::<_, i64>("access_count")? as u64,
        failed_attempts: row.get::<_, i64>("failed_attempts")? as u32,
        blocked_until: row.get("blocked_until")?,
        revoked_at: row.get("revoked_at")?,
        revocation_reason: row.get("revocation_reason")?,
        purchase_transaction_id: row.get("purchase_transaction_id")?,
        temporary_access_token: match (temp_token, temp_token_expires_at) {
            (Some(token), Some(expires_at)) => Some(TemporaryToken { token, expires_at }),
            _ => None,
        },
        updated_at: row.get("updated_at")?,
    })
}

/// Require that an UPDATE touched a row.
fn require_row(changed: usize, key: &AccessKey) -> Result<()> {
    if changed == 0 {
        Err(StoreError::NotFound(key.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl AccessRecordStore for SqliteStore {
    async fn upsert(&self, record: &AccessRecord) -> Result<UpsertOutcome> {
        let record = record.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let previous: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT record_id FROM access_records
                     WHERE content_id = ?1 AND user_id = ?2",
                    params![record.content_id.as_str(), record.user_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let (token, token_expires_at) = match &record.temporary_access_token {
                Some(t) => (Some(t.token.clone()), Some(t.expires_at)),
                None => (None, None),
            };

            // Whole-record write: the cipher triple can never be
            // partially updated.
            tx.execute(
                "INSERT INTO access_records (
                    content_id, user_id, record_id, cipher_text, nonce, auth_tag,
                    algorithm_version, status, created_at, expires_at, last_accessed_at,
                    access_count, failed_attempts, blocked_until, revoked_at,
                    revocation_reason, purchase_transaction_id, temp_token,
                    temp_token_expires_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                          ?15, ?16, ?17, ?18, ?19, ?20)
                ON CONFLICT(content_id, user_id) DO UPDATE SET
                    record_id = excluded.record_id,
                    cipher_text = excluded.cipher_text,
                    nonce = excluded.nonce,
                    auth_tag = excluded.auth_tag,
                    algorithm_version = excluded.algorithm_version,
                    status = excluded.status,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at,
                    last_accessed_at = excluded.last_accessed_at,
                    access_count = excluded.access_count,
                    failed_attempts = excluded.failed_attempts,
                    blocked_until = excluded.blocked_until,
                    revoked_at = excluded.revoked_at,
                    revocation_reason = excluded.revocation_reason,
                    purchase_transaction_id = excluded.purchase_transaction_id,
                    temp_token = excluded.temp_token,
                    temp_token_expires_at = excluded.temp_token_expires_at,
                    updated_at = excluded.updated_at",
                params![
                    record.content_id.as_str(),
                    record.user_id.as_str(),
                    record.record_id.as_bytes().as_slice(),
                    record.locator.cipher_text.as_ref(),
                    record.locator.nonce.as_bytes().as_slice(),
                    record.locator.auth_tag.as_slice(),
                    record.algorithm_version,
                    record.status.to_i64(),
                    record.created_at,
                    record.expires_at,
                    record.last_accessed_at,
                    record.access_count as i64,
                    i64::from(record.failed_attempts),
                    record.blocked_until,
                    record.revoked_at,
                    record.revocation_reason,
                    record.purchase_transaction_id,
                    token,
                    token_expires_at,
                    record.updated_at,
                ],
            )?;

            tx.commit()?;

            match previous {
                None => Ok(UpsertOutcome::Created),
                Some(bytes) => {
                    let previous: [u8; 32] = bytes
                        .try_into()
                        .map_err(|_| StoreError::InvalidData("record_id length".into()))?;
                    Ok(UpsertOutcome::Replaced {
                        previous: RecordId::from_bytes(previous),
                    })
                }
            }
        })
        .await
    }

    async fn find(&self, key: &AccessKey) -> Result<Option<AccessRecord>> {
        let key = key.clone();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM access_records
                     WHERE content_id = ?1 AND user_id = ?2"
                ),
                params![key.content_id.as_str(), key.user_id.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_and_increment(&self, key: &AccessKey, field: CounterField) -> Result<u64> {
        let key = key.clone();
        let column = match field {
            CounterField::AccessCount => "access_count",
            CounterField::FailedAttempts => "failed_attempts",
        };

        self.run(move |conn| {
            // Increment and read back under the serialized connection:
            // this is the atomic increment-and-fetch the contract needs.
            let changed = conn.execute(
                &format!(
                    "UPDATE access_records SET {column} = {column} + 1
                     WHERE content_id = ?1 AND user_id = ?2"
                ),
                params![key.content_id.as_str(), key.user_id.as_str()],
            )?;
            require_row(changed, &key)?;

            let value: i64 = conn.query_row(
                &format!(
                    "SELECT {column} FROM access_records
                     WHERE content_id = ?1 AND user_id = ?2"
                ),
                params![key.content_id.as_str(), key.user_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(value as u64)
        })
        .await
    }

    async fn mark_accessed(&self, key: &AccessKey, now: i64) -> Result<u64> {
        let key = key.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET
                    access_count = access_count + 1,
                    last_accessed_at = ?3,
                    failed_attempts = 0,
                    updated_at = ?3
                 WHERE content_id = ?1 AND user_id = ?2",
                params![key.content_id.as_str(), key.user_id.as_str(), now],
            )?;
            require_row(changed, &key)?;

            let count: i64 = conn.query_row(
                "SELECT access_count FROM access_records
                 WHERE content_id = ?1 AND user_id = ?2",
                params![key.content_id.as_str(), key.user_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn set_status(&self, key: &AccessKey, status: AccessStatus, now: i64) -> Result<()> {
        let key = key.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET status = ?3, updated_at = ?4
                 WHERE content_id = ?1 AND user_id = ?2",
                params![
                    key.content_id.as_str(),
                    key.user_id.as_str(),
                    status.to_i64(),
                    now
                ],
            )?;
            require_row(changed, &key)
        })
        .await
    }

    async fn mark_revoked(
        &self,
        key: &AccessKey,
        now: i64,
        reason: Option<&str>,
    ) -> Result<()> {
        let key = key.clone();
        let reason = reason.map(String::from);

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET
                    status = ?3, revoked_at = ?4, revocation_reason = ?5, updated_at = ?4
                 WHERE content_id = ?1 AND user_id = ?2",
                params![
                    key.content_id.as_str(),
                    key.user_id.as_str(),
                    AccessStatus::Revoked.to_i64(),
                    now,
                    reason,
                ],
            )?;
            require_row(changed, &key)
        })
        .await
    }

    async fn set_expiry(
        &self,
        key: &AccessKey,
        expires_at: i64,
        status: AccessStatus,
        now: i64,
    ) -> Result<()> {
        let key = key.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET expires_at = ?3, status = ?4, updated_at = ?5
                 WHERE content_id = ?1 AND user_id = ?2",
                params![
                    key.content_id.as_str(),
                    key.user_id.as_str(),
                    expires_at,
                    status.to_i64(),
                    now,
                ],
            )?;
            require_row(changed, &key)
        })
        .await
    }

    async fn set_block(&self, key: &AccessKey, blocked_until: i64, now: i64) -> Result<()> {
        let key = key.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET status = ?3, blocked_until = ?4, updated_at = ?5
                 WHERE content_id = ?1 AND user_id = ?2",
                params![
                    key.content_id.as_str(),
                    key.user_id.as_str(),
                    AccessStatus::Blocked.to_i64(),
                    blocked_until,
                    now,
                ],
            )?;
            require_row(changed, &key)
        })
        .await
    }

    async fn clear_block(&self, key: &AccessKey, status: AccessStatus, now: i64) -> Result<()> {
        let key = key.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET
                    status = ?3, blocked_until = NULL, failed_attempts = 0, updated_at = ?4
                 WHERE content_id = ?1 AND user_id = ?2",
                params![
                    key.content_id.as_str(),
                    key.user_id.as_str(),
                    status.to_i64(),
                    now,
                ],
            )?;
            require_row(changed, &key)
        })
        .await
    }

    async fn set_temporary_token(
        &self,
        key: &AccessKey,
        token: &TemporaryToken,
        now: i64,
    ) -> Result<()> {
        let key = key.clone();
        let token = token.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE access_records SET
                    temp_token = ?3, temp_token_expires_at = ?4, updated_at = ?5
                 WHERE content_id = ?1 AND user_id = ?2",
                params![
                    key.content_id.as_str(),
                    key.user_id.as_str(),
                    token.token,
                    token.expires_at,
                    now,
                ],
            )?;
            require_row(changed, &key)
        })
        .await
    }

    async fn expiring_between(&self, now: i64, cutoff: i64) -> Result<Vec<AccessRecord>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM access_records
                 WHERE status = ?1 AND expires_at > ?2 AND expires_at <= ?3
                 ORDER BY expires_at"
            ))?;

            let records = stmt
                .query_map(
                    params![AccessStatus::Active.to_i64(), now, cutoff],
                    row_to_record,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
        .await
    }

    async fn sweep_expired(&self, grace_ms: i64, now: i64) -> Result<usize> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0usize;

            {
                // Candidates: anything revoked or past its window. Logical
                // status is re-checked per record before deletion so a
                // concurrent Extend or re-grant is honored.
                let mut stmt = tx.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM access_records
                     WHERE status = ?1 OR expires_at < ?2"
                ))?;
                let candidates = stmt
                    .query_map(
                        params![AccessStatus::Revoked.to_i64(), now],
                        row_to_record,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                for record in candidates {
                    if record.sweepable(grace_ms, now) {
                        tx.execute(
                            "DELETE FROM access_records
                             WHERE content_id = ?1 AND user_id = ?2",
                            params![record.content_id.as_str(), record.user_id.as_str()],
                        )?;
                        deleted += 1;
                    }
                }
            }

            tx.commit()?;
            tracing::debug!(deleted, "sweep completed");
            Ok(deleted)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgate_core::MS_PER_DAY;

    fn test_key(content: &str, user: &str) -> AccessKey {
        AccessKey::new(ContentId::from(content), UserId::from(user))
    }

    fn test_record(key: &AccessKey, expires_at: i64) -> AccessRecord {
        AccessRecord {
            record_id: RecordId::derive(key, "tx1", 0),
            content_id: key.content_id.clone(),
            user_id: key.user_id.clone(),
            locator: EncryptedLocator {
                cipher_text: Bytes::from_static(b"opaque ciphertext"),
                nonce: CipherNonce::from_bytes([7u8; 12]),
                auth_tag: [9u8; 16],
            },
            algorithm_version: 1,
            status: AccessStatus::Active,
            created_at: 0,
            expires_at,
            last_accessed_at: None,
            access_count: 0,
            failed_attempts: 0,
            blocked_until: None,
            revoked_at: None,
            revocation_reason: None,
            purchase_transaction_id: "tx1".to_string(),
            temporary_access_token: None,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let key = test_key("c1", "u1");
        let record = test_record(&key, 1000);

        let outcome = store.upsert(&record).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let found = store.find(&key).await.unwrap().unwrap();
        assert_eq!(found, record);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = SqliteStore::open_memory().unwrap();
        let key = test_key("c1", "u1");
        let first = test_record(&key, 1000);
        store.upsert(&first).await.unwrap();

        let mut second = test_record(&key, 2000);
        second.record_id = RecordId::derive(&key, "tx2", 100);
        let outcome = store.upsert(&second).await.unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Replaced {
                previous: first.record_id
            }
        );
    }

    #[tokio::test]
    async fn test_find_missing() {
        let store = SqliteStore::open_memory().unwrap();
        let found = store.find(&test_key("nope", "nobody")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_increment_and_fetch() {
        let store = SqliteStore::open_memory().unwrap();
        let key = test_key("c1", "u1");
        store.upsert(&test_record(&key, 1000)).await.unwrap();

        for expected in 1..=3u64 {
            let n = store
                .find_and_increment(&key, CounterField::FailedAttempts)
                .await
                .unwrap();
            assert_eq!(n, expected);
        }

        let missing = store
            .find_and_increment(&test_key("x", "y"), CounterField::FailedAttempts)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_accessed_resets_failures() {
        let store = SqliteStore::open_memory().unwrap();
        let key = test_key("c1", "u1");
        store.upsert(&test_record(&key, 1000)).await.unwrap();

        store
            .find_and_increment(&key, CounterField::FailedAttempts)
            .await
            .unwrap();
        let count = store.mark_accessed(&key, 42).await.unwrap();
        assert_eq!(count, 1);

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.failed_attempts, 0);
        assert_eq!(record.last_accessed_at, Some(42));
        assert_eq!(record.updated_at, 42);
    }

    #[tokio::test]
    async fn test_revoke_and_block_fields() {
        let store = SqliteStore::open_memory().unwrap();
        let key = test_key("c1", "u1");
        store.upsert(&test_record(&key, 1000)).await.unwrap();

        store.set_block(&key, 900, 100).await.unwrap();
        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.status, AccessStatus::Blocked);
        assert_eq!(record.blocked_until, Some(900));

        store
            .clear_block(&key, AccessStatus::Active, 950)
            .await
            .unwrap();
        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.status, AccessStatus::Active);
        assert_eq!(record.blocked_until, None);

        store.mark_revoked(&key, 960, Some("refund")).await.unwrap();
        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.status, AccessStatus::Revoked);
        assert_eq!(record.revoked_at, Some(960));
        assert_eq!(record.revocation_reason.as_deref(), Some("refund"));
    }

    #[tokio::test]
    async fn test_temporary_token_persists() {
        let store = SqliteStore::open_memory().unwrap();
        let key = test_key("c1", "u1");
        store.upsert(&test_record(&key, 1000)).await.unwrap();

        let token = TemporaryToken {
            token: "deadbeef".to_string(),
            expires_at: 500,
        };
        store.set_temporary_token(&key, &token, 100).await.unwrap();

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.temporary_access_token, Some(token));
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_past_grace() {
        let store = SqliteStore::open_memory().unwrap();
        let grace = MS_PER_DAY;

        let live = test_key("live", "u1");
        store
            .upsert(&test_record(&live, 10 * MS_PER_DAY))
            .await
            .unwrap();

        let expired_recent = test_key("recent", "u1");
        store
            .upsert(&test_record(&expired_recent, 4 * MS_PER_DAY))
            .await
            .unwrap();

        let expired_old = test_key("old", "u1");
        store.upsert(&test_record(&expired_old, 100)).await.unwrap();

        // now = day 5: "old" expired at ~0 and is past the one-day grace,
        // "recent" expired at day 4 and is still within it.
        let now = 5 * MS_PER_DAY;
        let deleted = store.sweep_expired(grace, now).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find(&live).await.unwrap().is_some());
        assert!(store.find(&expired_recent).await.unwrap().is_some());
        assert!(store.find(&expired_old).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vaultgate.db");

        let key = test_key("c1", "u1");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert(&test_record(&key, 1000)).await.unwrap();
        }

        // Reopen and verify persistence.
        let store = SqliteStore::open(&path).unwrap();
        let found = store.find(&key).await.unwrap().unwrap();
        assert_eq!(found.expires_at, 1000);
    }
}
