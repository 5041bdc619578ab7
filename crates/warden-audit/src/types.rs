//! Audit type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Severity taxonomy, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Emergency,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(Severity::Debug),
            "info" => Some(Severity::Info),
            "warning" | "warn" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "critical" => Some(Severity::Critical),
            "emergency" => Some(Severity::Emergency),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Denied,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Denied => "denied",
        }
    }
}

/// Stored audit event. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub sequence: u64,
    pub event_id: Uuid,
    pub timestamp: u64,
    pub event_type: String,
    pub severity: Severity,
    pub actor_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub outcome: Outcome,
    /// Canonical JSON text of the event details
    pub details: String,
    pub previous_hash: String,
    pub event_hash: String,
}

impl AuditEvent {
    /// Parsed details; `Null` when the stored text is not JSON
    pub fn details_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.details).unwrap_or(serde_json::Value::Null)
    }

    /// String field from the details object
    pub fn detail_str(&self, field: &str) -> Option<String> {
        self.details_value()
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Rendering with parsed details and an RFC 3339 timestamp
    pub fn view(&self) -> AuditEventView {
        AuditEventView {
            sequence: self.sequence,
            event_id: self.event_id,
            timestamp: self.timestamp,
            time: rfc3339(self.timestamp),
            event_type: self.event_type.clone(),
            severity: self.severity,
            actor_id: self.actor_id,
            target_id: self.target_id,
            ip_address: self.ip_address.clone(),
            outcome: self.outcome,
            details: self.details_value(),
            previous_hash: self.previous_hash.clone(),
            event_hash: self.event_hash.clone(),
        }
    }
}

/// Serializable rendering of an [`AuditEvent`]
#[derive(Debug, Clone, Serialize)]
pub struct AuditEventView {
    pub sequence: u64,
    pub event_id: Uuid,
    pub timestamp: u64,
    pub time: String,
    pub event_type: String,
    pub severity: Severity,
    pub actor_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub outcome: Outcome,
    pub details: serde_json::Value,
    pub previous_hash: String,
    pub event_hash: String,
}

/// Event submitted for recording
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub severity: Severity,
    pub actor_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub outcome: Outcome,
    pub details: serde_json::Value,
}

impl NewEvent {
    pub fn new(event_type: &str, severity: Severity) -> Self {
        Self {
            event_type: event_type.to_string(),
            severity,
            actor_id: None,
            target_id: None,
            ip_address: None,
            outcome: Outcome::Success,
            details: serde_json::Value::Null,
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn maybe_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn target(mut self, target_id: Uuid) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Last appended event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// 0 before the first event
    pub sequence: u64,
    pub event_hash: String,
    pub timestamp: u64,
}

/// What went wrong at one position of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Stored hash differs from the recomputed one
    HashMismatch,
    /// previous_hash does not point at the prior event
    BrokenLink,
    /// Sequence number absent
    MissingEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub sequence: u64,
    pub kind: DivergenceKind,
    pub expected: String,
    pub found: String,
}

/// Result of verifying a range of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub from_sequence: u64,
    pub to_sequence: u64,
    pub checked: u64,
    pub divergences: Vec<Divergence>,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Filters for [`crate::AuditService::query`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Inclusive lower bound (unix seconds)
    pub from: Option<u64>,
    /// Inclusive upper bound (unix seconds)
    pub to: Option<u64>,
    pub min_severity: Option<Severity>,
    pub actor_id: Option<Uuid>,
    pub event_type: Option<String>,
    /// Case-insensitive match against type, details and IP
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 10_000;

    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        if self.from.is_some_and(|from| event.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| event.timestamp > to) {
            return false;
        }
        if self.min_severity.is_some_and(|min| event.severity < min) {
            return false;
        }
        if self.actor_id.is_some() && event.actor_id != self.actor_id {
            return false;
        }
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let haystack = format!(
                "{} {} {}",
                event.event_type,
                event.details,
                event.ip_address.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Export serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Xml,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "xml" => Some(ExportFormat::Xml),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xml => "application/xml",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Xml => "xml",
        }
    }
}

/// Alert raised by an anomaly detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_id: Uuid,
    /// detector + subject + window bucket; one alert per fingerprint
    pub fingerprint: String,
    pub detector: String,
    pub severity: Severity,
    /// Actor, actor+IP, or "system"
    pub subject: String,
    pub description: String,
    /// Sequences of the supporting events
    pub evidence: Vec<u64>,
    pub window_seconds: u64,
    pub detected_at: u64,
}

/// Detector output before de-duplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCandidate {
    pub detector: &'static str,
    pub severity: Severity,
    pub subject: String,
    pub description: String,
    pub evidence: Vec<u64>,
    pub window_seconds: u64,
}

impl AlertCandidate {
    pub fn fingerprint(&self, now: u64) -> String {
        let bucket = now / self.window_seconds.max(1);
        format!("{}:{}:{}", self.detector, self.subject, bucket)
    }
}

/// Aggregated security posture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub generated_at: u64,
    pub head_sequence: u64,
    pub events_last_24h: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub failed_logins_last_24h: u64,
    pub alerts_last_24h: u64,
}

pub(crate) fn rfc3339(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
