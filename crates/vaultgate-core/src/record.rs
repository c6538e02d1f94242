//! The access record: the sole persistent entity.
//!
//! Logical status is a computed property of the stored fields and the
//! current time. `active → expired` is never driven by a timer; it is
//! evaluated lazily on every verify/decrypt, and a threshold block clears
//! itself the same way once its cooldown has elapsed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::EncryptedLocator;
use crate::types::{ContentId, RecordId, UserId};

/// Milliseconds per day.
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Milliseconds per minute.
pub const MS_PER_MINUTE: i64 = 60 * 1000;

/// Lifecycle status of an access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Grant is live; decryption is permitted.
    Active,
    /// Access window has passed. Reversible via Extend.
    Expired,
    /// Terminal. No operation leaves this state.
    Revoked,
    /// Failed-attempt threshold crossed; time-limited, self-clearing.
    Blocked,
}

impl AccessStatus {
    /// Stable string form (audit lines, storage debugging).
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Active => "active",
            AccessStatus::Expired => "expired",
            AccessStatus::Revoked => "revoked",
            AccessStatus::Blocked => "blocked",
        }
    }

    /// Integer encoding for SQLite columns.
    pub fn to_i64(&self) -> i64 {
        match self {
            AccessStatus::Active => 0,
            AccessStatus::Expired => 1,
            AccessStatus::Revoked => 2,
            AccessStatus::Blocked => 3,
        }
    }

    /// Decode from the SQLite integer form.
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(AccessStatus::Active),
            1 => Some(AccessStatus::Expired),
            2 => Some(AccessStatus::Revoked),
            3 => Some(AccessStatus::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A short-lived token minted for delegated retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryToken {
    /// Opaque token value (hex).
    pub token: String,

    /// When the token stops being honored (Unix ms).
    pub expires_at: i64,
}

impl TemporaryToken {
    /// Whether the token is still within its window.
    pub fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// One grant of access to one piece of content for one user.
///
/// Keyed by `(content_id, user_id)`; `record_id` identifies the lineage
/// for audit and changes on every re-grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Opaque lineage handle.
    pub record_id: RecordId,

    pub content_id: ContentId,
    pub user_id: UserId,

    /// The encrypted content locator triple. Written atomically, never
    /// partially updated.
    pub locator: EncryptedLocator,

    /// Which derivation/encryption parameters were used. Stored so old
    /// records keep decrypting after a version bump for new grants.
    pub algorithm_version: u32,

    /// Stored status. Logical status may differ; see [`Self::logical_status`].
    pub status: AccessStatus,

    pub created_at: i64,
    pub expires_at: i64,

    /// Last successful decrypt (Unix ms).
    pub last_accessed_at: Option<i64>,

    /// Monotonic count of successful decrypts.
    pub access_count: u64,

    /// Monotonic count of failed decrypts; reset only on success or when
    /// a block cooldown clears.
    pub failed_attempts: u32,

    /// End of the block cooldown, when status is Blocked.
    pub blocked_until: Option<i64>,

    /// When the record was revoked, if it was.
    pub revoked_at: Option<i64>,

    /// Reason supplied at revocation (e.g. "refund").
    pub revocation_reason: Option<String>,

    /// The purchase that produced this grant.
    pub purchase_transaction_id: String,

    /// Optional short-TTL delegated-retrieval token.
    pub temporary_access_token: Option<TemporaryToken>,

    /// Last mutation time (Unix ms). Used by the physical-deletion sweep.
    pub updated_at: i64,
}

impl AccessRecord {
    /// Compute the logical status at `now`.
    ///
    /// - `Revoked` is terminal and never reclassified. A stamped
    ///   `revoked_at` wins over whatever the status field says, so a
    ///   revoked record stays revoked even if a later write clobbered
    ///   the field.
    /// - An elapsed block reverts to the pre-block logical value, which
    ///   is recomputed from `expires_at`.
    /// - `Active` lazily becomes `Expired` once `now > expires_at`.
    pub fn logical_status(&self, now: i64) -> AccessStatus {
        if self.status == AccessStatus::Revoked || self.revoked_at.is_some() {
            return AccessStatus::Revoked;
        }
        match self.status {
            AccessStatus::Blocked => match self.blocked_until {
                Some(until) if now < until => AccessStatus::Blocked,
                _ => self.time_status(now),
            },
            _ => self.time_status(now),
        }
    }

    /// Status as determined purely by the access window.
    fn time_status(&self, now: i64) -> AccessStatus {
        if now > self.expires_at {
            AccessStatus::Expired
        } else {
            AccessStatus::Active
        }
    }

    /// Whether an active block's cooldown has elapsed.
    pub fn block_elapsed(&self, now: i64) -> bool {
        self.status == AccessStatus::Blocked
            && self.blocked_until.map_or(true, |until| now >= until)
    }

    /// Whether the sweep may physically delete this record.
    ///
    /// True once logical expiry or revocation is older than the grace
    /// period. Independent of the stored status field: a revoked record
    /// ages from `revoked_at`, everything else from `expires_at`.
    pub fn sweepable(&self, grace_ms: i64, now: i64) -> bool {
        let reference = match (self.status, self.revoked_at) {
            (AccessStatus::Revoked, Some(at)) => at,
            _ => self.expires_at,
        };
        // A live (unexpired, unrevoked) record is never sweepable.
        if self.status != AccessStatus::Revoked && now <= self.expires_at {
            return false;
        }
        now - reference > grace_ms
    }
}
