//! Event bus and audit log.
//!
//! The bus is fire-and-forget: `publish` never blocks and never fails
//! from the caller's point of view. If the consuming side is gone the
//! event is dropped with a debug log line. Access operations must not
//! change outcome because audit delivery failed.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::events::{AccessEvent, AuditEntry};

/// Sending half of the audit pipeline.
///
/// Cheap to clone; every manager operation holds one.
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<AuditEntry>,
}

impl EventBus {
    /// Publish an event. Never blocks, never errors.
    pub fn publish(&self, at: i64, event: AccessEvent) {
        let kind = event.kind();
        if self.sender.send(AuditEntry { at, event }).is_err() {
            tracing::debug!(kind, "audit consumer gone, event dropped");
        }
    }

    /// A bus with no consumer. Every publish is a silent drop.
    pub fn disconnected() -> Self {
        let (sender, _) = mpsc::unbounded_channel();
        Self { sender }
    }
}

/// In-memory audit log fed by a background consumer task.
///
/// The task drains the channel and appends to a shared vector, also
/// emitting each entry as a structured JSON log line. The task exits
/// when every `EventBus` clone has been dropped.
pub struct AuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl AuditLog {
    /// Start a consumer task and return the log plus its bus.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start() -> (Self, EventBus) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditEntry>();
        let entries = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&entries);
        tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                match serde_json::to_string(&entry) {
                    Ok(json) => tracing::info!(target: "vaultgate::audit", %json),
                    Err(e) => tracing::warn!(error = %e, "audit entry not serializable"),
                }
                sink.lock().expect("lock poisoned").push(entry);
            }
        });

        (Self { entries }, EventBus { sender })
    }

    /// Snapshot of all entries received so far, in arrival order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("lock poisoned").clone()
    }

    /// Entries of a given kind.
    pub fn entries_of_kind(&self, kind: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|e| e.event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of entries received so far.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    /// Whether no entries have been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
