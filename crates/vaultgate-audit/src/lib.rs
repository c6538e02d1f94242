//! Audit event pipeline for access operations.
//!
//! Operations publish [`AccessEvent`]s onto an [`EventBus`]; a detached
//! consumer task appends them to an [`AuditLog`] and emits them as
//! structured JSON log lines. Delivery is fire-and-forget by contract:
//! the outcome of an access operation never depends on whether its
//! audit event was delivered.

pub mod events;
pub mod log;

pub use events::{AccessEvent, AuditEntry};
pub use log::{AuditLog, EventBus};
