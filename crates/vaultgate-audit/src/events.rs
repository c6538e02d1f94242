//! Audit event types for access operations.
//!
//! Every state transition in the access layer emits one of these events.
//! They are observational only: no business logic may depend on whether
//! an event was delivered.

use serde::{Deserialize, Serialize};
use vaultgate_core::{AccessKey, RecordId};

/// All auditable access operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccessEvent {
    /// A grant was created or re-created for a key.
    Granted {
        key: AccessKey,
        record_id: RecordId,
        expires_at: i64,
        /// Set when the grant replaced an existing lineage.
        #[serde(skip_serializing_if = "Option::is_none")]
        replaced: Option<RecordId>,
    },
    /// A decrypt succeeded.
    Decrypted { key: AccessKey, access_count: u64 },
    /// Access was revoked.
    Revoked {
        key: AccessKey,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The expiry window was extended.
    Extended { key: AccessKey, new_expires_at: i64 },
    /// A decrypt failed (integrity failure or non-active record).
    FailedAttempt {
        key: AccessKey,
        failed_attempts: u64,
        cause: String,
    },
    /// The failure threshold was crossed and the record entered the
    /// blocked state.
    Blocked { key: AccessKey, blocked_until: i64 },
    /// A temporary access token was issued.
    TokenIssued { key: AccessKey, expires_at: i64 },
    /// An active record falls inside an expiring-soon window.
    ExpiringSoon { key: AccessKey, expires_at: i64 },
    /// A physical-deletion sweep completed.
    SweepCompleted { deleted: u64 },
}

impl AccessEvent {
    /// Short name for log lines and filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Granted { .. } => "granted",
            Self::Decrypted { .. } => "decrypted",
            Self::Revoked { .. } => "revoked",
            Self::Extended { .. } => "extended",
            Self::FailedAttempt { .. } => "failed_attempt",
            Self::Blocked { .. } => "blocked",
            Self::TokenIssued { .. } => "token_issued",
            Self::ExpiringSoon { .. } => "expiring_soon",
            Self::SweepCompleted { .. } => "sweep_completed",
        }
    }
}

/// A timestamped audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the event was published (Unix ms).
    pub at: i64,
    /// The event itself.
    #[serde(flatten)]
    pub event: AccessEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgate_core::{ContentId, UserId};

    #[test]
    fn test_event_serializes_with_tag() {
        let event = AccessEvent::Decrypted {
            key: AccessKey::new(ContentId::from("c1"), UserId::from("u1")),
            access_count: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "decrypted");
        assert_eq!(json["access_count"], 3);
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = AuditEntry {
            at: 1234,
            event: AccessEvent::SweepCompleted { deleted: 7 },
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
