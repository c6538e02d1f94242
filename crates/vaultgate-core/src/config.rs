//! Access-control configuration.
//!
//! The master key is deliberately not part of this struct; it is injected
//! separately into the key-derivation service at construction so it never
//! travels through config plumbing or debug output.

use crate::record::{MS_PER_DAY, MS_PER_MINUTE};

/// Tunable policy for the access-control manager.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Derivation/encryption parameter version applied to new grants.
    pub algorithm_version: u32,

    /// TTL for grants that do not specify one.
    pub default_ttl_days: i64,

    /// How long past logical expiry/revocation a record is retained
    /// before the sweep physically deletes it.
    pub physical_deletion_grace_days: i64,

    /// Failed decrypts before a record is blocked.
    pub failed_attempt_threshold: u32,

    /// How long a block lasts before it self-clears.
    pub block_cooldown_minutes: i64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            algorithm_version: 1,
            default_ttl_days: 30,
            physical_deletion_grace_days: 60,
            failed_attempt_threshold: 5,
            block_cooldown_minutes: 15,
        }
    }
}

impl AccessConfig {
    /// Override the default TTL.
    pub fn with_default_ttl_days(mut self, days: i64) -> Self {
        self.default_ttl_days = days;
        self
    }

    /// Override the failed-attempt threshold.
    pub fn with_failed_attempt_threshold(mut self, threshold: u32) -> Self {
        self.failed_attempt_threshold = threshold;
        self
    }

    /// Override the block cooldown.
    pub fn with_block_cooldown_minutes(mut self, minutes: i64) -> Self {
        self.block_cooldown_minutes = minutes;
        self
    }

    /// Override the physical-deletion grace period.
    pub fn with_physical_deletion_grace_days(mut self, days: i64) -> Self {
        self.physical_deletion_grace_days = days;
        self
    }

    /// Override the algorithm version applied to new grants.
    pub fn with_algorithm_version(mut self, version: u32) -> Self {
        self.algorithm_version = version;
        self
    }

    /// Default TTL in milliseconds.
    pub fn default_ttl_ms(&self) -> i64 {
        self.default_ttl_days * MS_PER_DAY
    }

    /// Block cooldown in milliseconds.
    pub fn block_cooldown_ms(&self) -> i64 {
        self.block_cooldown_minutes * MS_PER_MINUTE
    }

    /// Sweep grace period in milliseconds.
    pub fn deletion_grace_ms(&self) -> i64 {
        self.physical_deletion_grace_days * MS_PER_DAY
    }
}
