//! Audit trait definitions.

use crate::{errors::Result, types::*};
use async_trait::async_trait;
use std::sync::Arc;

/// Sink every service writes its audit events into
///
/// Injected into the other services so they don't depend on the engine
/// directly.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Append an event to the log
    async fn record(&self, event: NewEvent) -> Result<AuditEvent>;
}

/// Windowed detector over a snapshot of recent events
#[async_trait]
pub trait AnomalyDetector: Send + Sync {
    /// Stable detector name used in fingerprints
    fn name(&self) -> &'static str;

    /// How far back this detector looks
    fn window_seconds(&self) -> u64;

    /// Inspect the events younger than the window and report candidates
    async fn detect(&self, snapshot: Arc<Vec<AuditEvent>>, now: u64) -> Vec<AlertCandidate>;
}
