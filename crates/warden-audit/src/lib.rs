//! # warden-audit
//!
//! Append-only, hash-chained audit log with:
//! - Range integrity verification
//! - Windowed anomaly detectors producing [`SecurityAlert`]s
//! - Read-only export to JSON, CSV and XML

#![warn(clippy::all)]

pub mod chain;
pub mod detectors;
pub mod errors;
pub mod events;
pub mod export;
pub mod guard;
pub mod service;
pub mod traits;
pub mod types;

#[cfg(test)]
mod tests;

pub use chain::{compute_event_hash, GENESIS_HASH};
pub use detectors::default_detectors;
pub use errors::{AuditError, Result};
pub use export::export_events;
pub use guard::authorize;
pub use service::AuditService;
pub use traits::{AnomalyDetector, AuditRecorder};
pub use types::*;
