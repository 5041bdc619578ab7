//! Windowed anomaly detectors.

use crate::{events, traits::AnomalyDetector, types::*};
use async_trait::async_trait;
use chrono::Timelike;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The standard detector set with production thresholds
pub fn default_detectors() -> Vec<Arc<dyn AnomalyDetector>> {
    vec![
        Arc::new(BruteForceDetector::default()),
        Arc::new(PrivilegeEscalationDetector::default()),
        Arc::new(ExfiltrationDetector::default()),
        Arc::new(OffHoursDetector::default()),
        Arc::new(ConfigChangeDetector::default()),
    ]
}

fn in_window(snapshot: &[AuditEvent], now: u64, window: u64) -> impl Iterator<Item = &AuditEvent> {
    let since = now.saturating_sub(window);
    snapshot.iter().filter(move |e| e.timestamp >= since)
}

/// Group matching events by subject; keep groups strictly above `threshold`
fn over_threshold<'a, I, F>(events: I, threshold: usize, subject: F) -> BTreeMap<String, Vec<u64>>
where
    I: Iterator<Item = &'a AuditEvent>,
    F: Fn(&AuditEvent) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for event in events {
        if let Some(key) = subject(event) {
            groups.entry(key).or_default().push(event.sequence);
        }
    }
    groups.retain(|_, evidence| evidence.len() > threshold);
    groups
}

fn actor_label(event: &AuditEvent) -> String {
    event
        .actor_id
        .map(|id| id.to_string())
        .or_else(|| event.detail_str("username"))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Failed logins per actor+IP
#[derive(Debug, Clone)]
pub struct BruteForceDetector {
    pub threshold: usize,
    pub window_seconds: u64,
}

impl Default for BruteForceDetector {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_seconds: 15 * 60,
        }
    }
}

#[async_trait]
impl AnomalyDetector for BruteForceDetector {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    async fn detect(&self, snapshot: Arc<Vec<AuditEvent>>, now: u64) -> Vec<AlertCandidate> {
        let failures = in_window(&snapshot, now, self.window_seconds)
            .filter(|e| e.event_type == events::LOGIN_FAILURE);

        over_threshold(failures, self.threshold, |e| {
            let ip = e.ip_address.as_deref().unwrap_or("unknown");
            Some(format!("{}@{}", actor_label(e), ip))
        })
        .into_iter()
        .map(|(subject, evidence)| AlertCandidate {
            detector: self.name(),
            severity: Severity::Critical,
            description: format!(
                "{} failed logins for {} within {} minutes",
                evidence.len(),
                subject,
                self.window_seconds / 60
            ),
            subject,
            evidence,
            window_seconds: self.window_seconds,
        })
        .collect()
    }
}

/// Denied admin-tier authorizations and role changes per actor
#[derive(Debug, Clone)]
pub struct PrivilegeEscalationDetector {
    pub threshold: usize,
    pub window_seconds: u64,
}

impl Default for PrivilegeEscalationDetector {
    fn default() -> Self {
        Self {
            threshold: 3,
            window_seconds: 60 * 60,
        }
    }
}

impl PrivilegeEscalationDetector {
    fn relevant(event: &AuditEvent) -> bool {
        let denied_admin_action = event.event_type == events::AUTHZ_DENIED
            && event
                .details_value()
                .get("admin_tier")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
        let role_change = matches!(
            event.event_type.as_str(),
            events::PROMOTION_INITIATED | events::ROLE_DEMOTED
        );
        denied_admin_action || role_change
    }
}

#[async_trait]
impl AnomalyDetector for PrivilegeEscalationDetector {
    fn name(&self) -> &'static str {
        "privilege_escalation"
    }

    fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    async fn detect(&self, snapshot: Arc<Vec<AuditEvent>>, now: u64) -> Vec<AlertCandidate> {
        let relevant = in_window(&snapshot, now, self.window_seconds).filter(|e| Self::relevant(e));

        over_threshold(relevant, self.threshold, |e| e.actor_id.map(|id| id.to_string()))
            .into_iter()
            .map(|(subject, evidence)| AlertCandidate {
                detector: self.name(),
                severity: Severity::Critical,
                description: format!(
                    "{} denied admin-tier actions or role changes by {} within an hour",
                    evidence.len(),
                    subject
                ),
                subject,
                evidence,
                window_seconds: self.window_seconds,
            })
            .collect()
    }
}

/// Exports and bulk reads per actor
#[derive(Debug, Clone)]
pub struct ExfiltrationDetector {
    pub threshold: usize,
    pub window_seconds: u64,
}

impl Default for ExfiltrationDetector {
    fn default() -> Self {
        Self {
            threshold: 10,
            window_seconds: 60 * 60,
        }
    }
}

#[async_trait]
impl AnomalyDetector for ExfiltrationDetector {
    fn name(&self) -> &'static str {
        "data_exfiltration"
    }

    fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    async fn detect(&self, snapshot: Arc<Vec<AuditEvent>>, now: u64) -> Vec<AlertCandidate> {
        let reads = in_window(&snapshot, now, self.window_seconds).filter(|e| {
            e.event_type == events::AUDIT_EXPORT || e.event_type == events::DATA_BULK_READ
        });

        over_threshold(reads, self.threshold, |e| Some(actor_label(e)))
            .into_iter()
            .map(|(subject, evidence)| AlertCandidate {
                detector: self.name(),
                severity: Severity::Critical,
                description: format!(
                    "{} export or bulk-read operations by {} within an hour",
                    evidence.len(),
                    subject
                ),
                subject,
                evidence,
                window_seconds: self.window_seconds,
            })
            .collect()
    }
}

/// Admin-tier logins outside business hours (UTC)
#[derive(Debug, Clone)]
pub struct OffHoursDetector {
    /// First allowed hour (inclusive)
    pub start_hour: u32,
    /// Last allowed hour (exclusive)
    pub end_hour: u32,
    pub window_seconds: u64,
}

impl Default for OffHoursDetector {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 22,
            window_seconds: 60 * 60,
        }
    }
}

impl OffHoursDetector {
    fn is_off_hours(&self, timestamp: u64) -> bool {
        let hour = i64::try_from(timestamp)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.hour());
        match hour {
            Some(hour) => hour < self.start_hour || hour >= self.end_hour,
            None => false,
        }
    }
}

#[async_trait]
impl AnomalyDetector for OffHoursDetector {
    fn name(&self) -> &'static str {
        "off_hours_access"
    }

    fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    async fn detect(&self, snapshot: Arc<Vec<AuditEvent>>, now: u64) -> Vec<AlertCandidate> {
        let logins = in_window(&snapshot, now, self.window_seconds).filter(|e| {
            e.event_type == events::LOGIN_SUCCESS
                && matches!(e.detail_str("role").as_deref(), Some("admin" | "site_admin"))
                && self.is_off_hours(e.timestamp)
        });

        over_threshold(logins, 0, |e| e.actor_id.map(|id| id.to_string()))
            .into_iter()
            .map(|(subject, evidence)| AlertCandidate {
                detector: self.name(),
                severity: Severity::Warning,
                description: format!(
                    "Admin-tier login by {} outside {:02}:00-{:02}:00 UTC",
                    subject, self.start_hour, self.end_hour
                ),
                subject,
                evidence,
                window_seconds: self.window_seconds,
            })
            .collect()
    }
}

/// Configuration change volume
#[derive(Debug, Clone)]
pub struct ConfigChangeDetector {
    pub threshold: usize,
    pub window_seconds: u64,
}

impl Default for ConfigChangeDetector {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_seconds: 60 * 60,
        }
    }
}

#[async_trait]
impl AnomalyDetector for ConfigChangeDetector {
    fn name(&self) -> &'static str {
        "configuration_change"
    }

    fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    async fn detect(&self, snapshot: Arc<Vec<AuditEvent>>, now: u64) -> Vec<AlertCandidate> {
        let changes = in_window(&snapshot, now, self.window_seconds)
            .filter(|e| events::is_configuration_change(&e.event_type));

        over_threshold(changes, self.threshold, |_| Some("system".to_string()))
            .into_iter()
            .map(|(subject, evidence)| AlertCandidate {
                detector: self.name(),
                severity: Severity::Warning,
                description: format!("{} configuration changes within an hour", evidence.len()),
                subject,
                evidence,
                window_seconds: self.window_seconds,
            })
            .collect()
    }
}
