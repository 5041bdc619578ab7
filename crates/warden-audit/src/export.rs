//! Audit log export.

use crate::{errors::*, types::*};
use serde::Serialize;
use uuid::Uuid;

const CSV_COLUMNS: [&str; 11] = [
    "sequence",
    "event_id",
    "time",
    "event_type",
    "severity",
    "actor_id",
    "target_id",
    "ip_address",
    "outcome",
    "details",
    "event_hash",
];

/// Serialize `events` in the requested format
pub fn export_events(events: &[AuditEvent], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let views: Vec<AuditEventView> = events.iter().map(AuditEvent::view).collect();
            Ok(serde_json::to_string_pretty(&views)?)
        }
        ExportFormat::Csv => format_as_csv(events),
        ExportFormat::Xml => format_as_xml(events),
    }
}

fn opt_id(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

/// One CSV record; field order follows `CSV_COLUMNS`
#[derive(Serialize)]
struct CsvRow<'a> {
    sequence: u64,
    event_id: String,
    time: String,
    event_type: &'a str,
    severity: &'static str,
    actor_id: String,
    target_id: String,
    ip_address: &'a str,
    outcome: &'static str,
    details: &'a str,
    event_hash: &'a str,
}

fn format_as_csv(events: &[AuditEvent]) -> Result<String> {
    let export_error = |e: csv::Error| AuditError::Export(e.to_string());

    // Header written by hand so an empty export still names its columns
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).map_err(export_error)?;

    for event in events {
        writer
            .serialize(CsvRow {
                sequence: event.sequence,
                event_id: event.event_id.to_string(),
                time: rfc3339(event.timestamp),
                event_type: &event.event_type,
                severity: event.severity.as_str(),
                actor_id: opt_id(event.actor_id),
                target_id: opt_id(event.target_id),
                ip_address: event.ip_address.as_deref().unwrap_or(""),
                outcome: event.outcome.as_str(),
                details: &event.details,
                event_hash: &event.event_hash,
            })
            .map_err(export_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AuditError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AuditError::Export(e.to_string()))
}

#[derive(Serialize)]
#[serde(rename = "audit_log")]
struct XmlExport<'a> {
    #[serde(rename = "event")]
    events: Vec<XmlEvent<'a>>,
}

#[derive(Serialize)]
struct XmlEvent<'a> {
    sequence: u64,
    event_id: String,
    time: String,
    event_type: &'a str,
    severity: &'static str,
    actor_id: String,
    target_id: String,
    ip_address: &'a str,
    outcome: &'static str,
    /// JSON text
    details: &'a str,
    previous_hash: &'a str,
    event_hash: &'a str,
}

fn format_as_xml(events: &[AuditEvent]) -> Result<String> {
    let export = XmlExport {
        events: events
            .iter()
            .map(|e| XmlEvent {
                sequence: e.sequence,
                event_id: e.event_id.to_string(),
                time: rfc3339(e.timestamp),
                event_type: &e.event_type,
                severity: e.severity.as_str(),
                actor_id: opt_id(e.actor_id),
                target_id: opt_id(e.target_id),
                ip_address: e.ip_address.as_deref().unwrap_or(""),
                outcome: e.outcome.as_str(),
                details: &e.details,
                previous_hash: &e.previous_hash,
                event_hash: &e.event_hash,
            })
            .collect(),
    };

    quick_xml::se::to_string(&export).map_err(|e| AuditError::Export(e.to_string()))
}
