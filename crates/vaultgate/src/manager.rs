//! The access-control manager: the only place business rules live.
//!
//! Every operation is keyed by `(content_id, user_id)`. Status is
//! time-driven and evaluated lazily: verify and decrypt reconcile the
//! stored status with the logical one (expiring active records,
//! clearing elapsed blocks) before acting. No timers anywhere.

use std::sync::Arc;

use rand::RngCore;
use vaultgate_audit::{AccessEvent, EventBus};
use vaultgate_core::{
    validation, AccessConfig, AccessKey, AccessRecord, AccessStatus, Clock, ContentCipher,
    ContentId, KeyDerivation, MasterKey, RecordId, SystemClock, TemporaryToken, UserId,
    MS_PER_DAY, MS_PER_MINUTE,
};
use vaultgate_store::{AccessRecordStore, CounterField, UpsertOutcome};

use crate::error::{AccessError, Result};

/// The outcome of a verify or status read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessVerdict {
    /// Logical status at evaluation time.
    pub status: AccessStatus,
    /// When the access window closes (Unix ms).
    pub expires_at: i64,
    /// Successful decrypts so far.
    pub access_count: u64,
}

/// The payload of a successful decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedAccess {
    /// The recovered content locator.
    pub url: String,
    /// When the access window closes (Unix ms).
    pub expires_at: i64,
}

/// Orchestrates grants, decryption, revocation and the state machine
/// over a pluggable store.
///
/// The master key is injected once at construction and is immutable for
/// the life of the process.
pub struct AccessControlManager<S> {
    store: Arc<S>,
    keys: KeyDerivation,
    cipher: ContentCipher,
    config: AccessConfig,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl<S: AccessRecordStore> AccessControlManager<S> {
    /// Create a manager using the system clock.
    pub fn new(store: Arc<S>, master: MasterKey, config: AccessConfig, events: EventBus) -> Self {
        Self::with_clock(store, master, config, events, Arc::new(SystemClock))
    }

    /// Create a manager with an injected clock. Tests use this with a
    /// manual clock to drive expiry and cooldowns deterministically.
    pub fn with_clock(
        store: Arc<S>,
        master: MasterKey,
        config: AccessConfig,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys: KeyDerivation::new(master),
            cipher: ContentCipher::new(),
            config,
            events,
            clock,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grant / Revoke / Extend
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant access: encrypt the locator and write an active record.
    ///
    /// Replaces any existing record for the key (last writer wins); a
    /// re-grant after revocation starts a fresh lineage with a new
    /// record id.
    pub async fn grant(
        &self,
        content_id: ContentId,
        user_id: UserId,
        url: &str,
        transaction_id: &str,
        ttl_days: Option<i64>,
    ) -> Result<RecordId> {
        let ttl_days = ttl_days.unwrap_or(self.config.default_ttl_days);
        validation::validate_grant(&content_id, &user_id, url, transaction_id, ttl_days)?;

        let now = self.clock.now_millis();
        let key = AccessKey::new(content_id, user_id);

        let derived = self
            .keys
            .derive(&key.content_id, &key.user_id, self.config.algorithm_version);
        let locator = self.cipher.encrypt(url.as_bytes(), &derived)?;

        let record_id = RecordId::derive(&key, transaction_id, now);
        let expires_at = now + ttl_days * MS_PER_DAY;

        let record = AccessRecord {
            record_id,
            content_id: key.content_id.clone(),
            user_id: key.user_id.clone(),
            locator,
            algorithm_version: self.config.algorithm_version,
            status: AccessStatus::Active,
            created_at: now,
            expires_at,
            last_accessed_at: None,
            access_count: 0,
            failed_attempts: 0,
            blocked_until: None,
            revoked_at: None,
            revocation_reason: None,
            purchase_transaction_id: transaction_id.to_string(),
            temporary_access_token: None,
            updated_at: now,
        };

        let outcome = self.store.upsert(&record).await?;
        let replaced = match outcome {
            UpsertOutcome::Created => None,
            UpsertOutcome::Replaced { previous } => Some(previous),
        };

        tracing::info!(%key, %record_id, expires_at, "access granted");
        self.events.publish(
            now,
            AccessEvent::Granted {
                key,
                record_id,
                expires_at,
                replaced,
            },
        );

        Ok(record_id)
    }

    /// Revoke access. Terminal for the lineage and idempotent: revoking
    /// an already-revoked record changes nothing and emits nothing.
    pub async fn revoke(&self, key: &AccessKey, reason: Option<&str>) -> Result<()> {
        let record = self.require(key).await?;
        if record.status == AccessStatus::Revoked {
            return Ok(());
        }

        let now = self.clock.now_millis();
        self.store.mark_revoked(key, now, reason).await?;

        tracing::info!(%key, reason, "access revoked");
        self.events.publish(
            now,
            AccessEvent::Revoked {
                key: key.clone(),
                reason: reason.map(String::from),
            },
        );
        Ok(())
    }

    /// Extend the access window by `additional_days`.
    ///
    /// The new expiry is `max(now, expires_at) + additional_days`: an
    /// expired record gains a full fresh window, a live one stacks onto
    /// its remainder. Reactivates `expired → active`; a record inside a
    /// block cooldown keeps its block. Fails on revoked records.
    pub async fn extend(&self, key: &AccessKey, additional_days: i64) -> Result<i64> {
        validation::validate_ttl(additional_days)?;

        let record = self.require(key).await?;
        if record.status == AccessStatus::Revoked {
            return Err(AccessError::Revoked);
        }

        let now = self.clock.now_millis();
        if record.block_elapsed(now) {
            let restored = record.logical_status(now);
            self.store.clear_block(key, restored, now).await?;
        }

        let new_expires_at = record.expires_at.max(now) + additional_days * MS_PER_DAY;
        let status = if record.status == AccessStatus::Blocked && !record.block_elapsed(now) {
            AccessStatus::Blocked
        } else {
            AccessStatus::Active
        };
        self.store.set_expiry(key, new_expires_at, status, now).await?;

        tracing::info!(%key, new_expires_at, "access extended");
        self.events.publish(
            now,
            AccessEvent::Extended {
                key: key.clone(),
                new_expires_at,
            },
        );
        Ok(new_expires_at)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verify / Decrypt
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluate the logical status, persisting any lazy transition
    /// (active → expired, or an elapsed block clearing).
    pub async fn verify(&self, key: &AccessKey) -> Result<AccessVerdict> {
        let mut record = self.require(key).await?;
        let now = self.clock.now_millis();
        let status = self.reconcile(key, &mut record, now).await?;

        Ok(AccessVerdict {
            status,
            expires_at: record.expires_at,
            access_count: record.access_count,
        })
    }

    /// Read the logical status without touching the record.
    pub async fn get_status(&self, key: &AccessKey) -> Result<AccessVerdict> {
        let record = self.require(key).await?;
        let now = self.clock.now_millis();

        Ok(AccessVerdict {
            status: record.logical_status(now),
            expires_at: record.expires_at,
            access_count: record.access_count,
        })
    }

    /// Decrypt the content locator.
    ///
    /// Only an active record decrypts. Every failure on an existing
    /// record, including attempts against expired or revoked grants and
    /// integrity failures, increments `failed_attempts`; crossing the
    /// threshold enters the blocked state for the configured cooldown.
    /// A missing record increments nothing.
    pub async fn decrypt(&self, key: &AccessKey) -> Result<DecryptedAccess> {
        let mut record = self.require(key).await?;
        let now = self.clock.now_millis();
        let status = self.reconcile(key, &mut record, now).await?;

        match status {
            AccessStatus::Active => {}
            AccessStatus::Expired => {
                self.record_failure(key, &record, now, "expired").await?;
                return Err(AccessError::Expired);
            }
            AccessStatus::Revoked => {
                self.record_failure(key, &record, now, "revoked").await?;
                return Err(AccessError::Revoked);
            }
            AccessStatus::Blocked => {
                self.record_failure(key, &record, now, "blocked").await?;
                return Err(AccessError::Blocked {
                    retry_at: record.blocked_until.unwrap_or(now),
                });
            }
        }

        // Derive under the record's stored version, not the current
        // config, so old grants survive a parameter rotation.
        let derived = self
            .keys
            .derive(&key.content_id, &key.user_id, record.algorithm_version);

        let plaintext = match self.cipher.decrypt(&record.locator, &derived) {
            Ok(p) => p,
            Err(_) => {
                self.record_failure(key, &record, now, "integrity").await?;
                return Err(AccessError::Integrity);
            }
        };
        let url = String::from_utf8(plaintext).map_err(|_| AccessError::Integrity)?;

        let access_count = self.store.mark_accessed(key, now).await?;
        tracing::debug!(%key, access_count, "decrypt succeeded");
        self.events.publish(
            now,
            AccessEvent::Decrypted {
                key: key.clone(),
                access_count,
            },
        );

        Ok(DecryptedAccess {
            url,
            expires_at: record.expires_at,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tokens / Background
    // ─────────────────────────────────────────────────────────────────────────

    /// Mint and store a short-TTL delegated-retrieval token. Requires an
    /// active record; does not count as an access.
    pub async fn issue_temporary_token(
        &self,
        key: &AccessKey,
        ttl_minutes: i64,
    ) -> Result<TemporaryToken> {
        let record = self.require(key).await?;
        let now = self.clock.now_millis();

        match record.logical_status(now) {
            AccessStatus::Active => {}
            AccessStatus::Expired => return Err(AccessError::Expired),
            AccessStatus::Revoked => return Err(AccessError::Revoked),
            AccessStatus::Blocked => {
                return Err(AccessError::Blocked {
                    retry_at: record.blocked_until.unwrap_or(now),
                })
            }
        }

        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = TemporaryToken {
            token: hex::encode(raw),
            expires_at: now + ttl_minutes * MS_PER_MINUTE,
        };
        self.store.set_temporary_token(key, &token, now).await?;

        self.events.publish(
            now,
            AccessEvent::TokenIssued {
                key: key.clone(),
                expires_at: token.expires_at,
            },
        );
        Ok(token)
    }

    /// Publish `expiring_soon` events for active records whose window
    /// closes within the given number of days. Returns how many.
    pub async fn notify_expiring(&self, within_days: i64) -> Result<usize> {
        let now = self.clock.now_millis();
        let cutoff = now + within_days * MS_PER_DAY;
        let records = self.store.expiring_between(now, cutoff).await?;

        for record in &records {
            self.events.publish(
                now,
                AccessEvent::ExpiringSoon {
                    key: AccessKey::new(record.content_id.clone(), record.user_id.clone()),
                    expires_at: record.expires_at,
                },
            );
        }
        Ok(records.len())
    }

    /// Run the physical-deletion sweep with the configured grace period.
    /// Never called from a request path.
    pub async fn run_sweep(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let deleted = self
            .store
            .sweep_expired(self.config.deletion_grace_ms(), now)
            .await?;

        if deleted > 0 {
            tracing::info!(deleted, "sweep removed records past grace period");
        }
        self.events.publish(
            now,
            AccessEvent::SweepCompleted {
                deleted: deleted as u64,
            },
        );
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn require(&self, key: &AccessKey) -> Result<AccessRecord> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| AccessError::NotFound(key.to_string()))
    }

    /// Persist any lazy status transition and return the logical status.
    ///
    /// The in-memory record is updated to match what was written.
    async fn reconcile(
        &self,
        key: &AccessKey,
        record: &mut AccessRecord,
        now: i64,
    ) -> Result<AccessStatus> {
        let logical = record.logical_status(now);

        if record.block_elapsed(now) {
            self.store.clear_block(key, logical, now).await?;
            record.status = logical;
            record.blocked_until = None;
            record.failed_attempts = 0;
        } else if record.status == AccessStatus::Active && logical == AccessStatus::Expired {
            self.store.set_status(key, logical, now).await?;
            record.status = logical;
        }

        Ok(logical)
    }

    /// Count a failed decrypt and enter the blocked state when the
    /// threshold is crossed. The block transition fires once: a record
    /// already inside a cooldown only accumulates the counter. A revoked
    /// record never transitions: writing `Blocked` over it would hand
    /// the terminal state back to the time-driven machinery once the
    /// cooldown elapsed.
    async fn record_failure(
        &self,
        key: &AccessKey,
        record: &AccessRecord,
        now: i64,
        cause: &str,
    ) -> Result<()> {
        let failed_attempts = self
            .store
            .find_and_increment(key, CounterField::FailedAttempts)
            .await?;

        tracing::warn!(%key, failed_attempts, cause, "decrypt failed");
        self.events.publish(
            now,
            AccessEvent::FailedAttempt {
                key: key.clone(),
                failed_attempts,
                cause: cause.to_string(),
            },
        );

        let revoked =
            record.status == AccessStatus::Revoked || record.revoked_at.is_some();
        let already_blocked =
            record.status == AccessStatus::Blocked && !record.block_elapsed(now);
        if !revoked
            && !already_blocked
            && failed_attempts >= u64::from(self.config.failed_attempt_threshold)
        {
            let blocked_until = now + self.config.block_cooldown_ms();
            self.store.set_block(key, blocked_until, now).await?;

            tracing::warn!(%key, blocked_until, "failure threshold crossed, record blocked");
            self.events.publish(
                now,
                AccessEvent::Blocked {
                    key: key.clone(),
                    blocked_until,
                },
            );
        }
        Ok(())
    }
}
