//! Hash chain computation.

use crate::{errors::Result, types::*};
use serde::Serialize;
use uuid::Uuid;
use warden_crypto::sha256;

/// previous_hash of the first event
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Serialize)]
struct HashInput<'a> {
    sequence: u64,
    event_id: &'a Uuid,
    timestamp: u64,
    event_type: &'a str,
    severity: Severity,
    actor_id: &'a Option<Uuid>,
    target_id: &'a Option<Uuid>,
    ip_address: &'a Option<String>,
    outcome: Outcome,
    details: &'a str,
    previous_hash: &'a str,
}

/// SHA-256 (hex) over the canonical JSON of every field except
/// `event_hash`, with `previous_hash` last.
pub fn compute_event_hash(event: &AuditEvent) -> Result<String> {
    let input = HashInput {
        sequence: event.sequence,
        event_id: &event.event_id,
        timestamp: event.timestamp,
        event_type: &event.event_type,
        severity: event.severity,
        actor_id: &event.actor_id,
        target_id: &event.target_id,
        ip_address: &event.ip_address,
        outcome: event.outcome,
        details: &event.details,
        previous_hash: &event.previous_hash,
    };
    let bytes = serde_json::to_vec(&input)?;
    Ok(hex::encode(sha256(&bytes)))
}
