//! Audit service implementation.

use crate::{
    chain::{compute_event_hash, GENESIS_HASH},
    detectors::default_detectors,
    errors::*,
    events,
    export::export_events,
    traits::{AnomalyDetector, AuditRecorder},
    types::*,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_crypto::{Clock, DAY};
use warden_storage::{
    sequence_key, BatchExt, Storage, CF_AUDIT_CRITICAL_EVENTS, CF_AUDIT_HEAD, CF_AUDIT_LOG,
    CF_SECURITY_ALERTS,
};

const HEAD_KEY: &str = "head";
const HEAD_LOCK: &str = "audit:head";
/// Rows read per storage scan on whole-log walks
pub(crate) const SCAN_PAGE: usize = 512;

/// Audit & anomaly engine
///
/// The only write path is [`AuditRecorder::record`]; there is no API to
/// update or delete an event.
pub struct AuditService<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    detectors: Vec<Arc<dyn AnomalyDetector>>,
}

impl<S: Storage + 'static> AuditService<S> {
    /// Create a new audit service with the default detectors
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            detectors: default_detectors(),
        }
    }

    /// Replace the detector set
    pub fn with_detectors(mut self, detectors: Vec<Arc<dyn AnomalyDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    /// Current chain head
    pub async fn head(&self) -> Result<ChainHead> {
        Ok(self
            .storage
            .get(CF_AUDIT_HEAD, &HEAD_KEY.to_string())
            .await?
            .unwrap_or_else(|| ChainHead {
                sequence: 0,
                event_hash: GENESIS_HASH.to_string(),
                timestamp: 0,
            }))
    }

    /// Get event by sequence number
    pub async fn get_event(&self, sequence: u64) -> Result<AuditEvent> {
        self.storage
            .get(CF_AUDIT_LOG, &sequence_key(sequence))
            .await?
            .ok_or(AuditError::NotFound(sequence))
    }

    /// Sequence of the first event at or after `since`.
    ///
    /// Timestamps never decrease along the chain, so this is a binary search.
    async fn first_sequence_since(&self, since: u64, head: &ChainHead) -> Result<u64> {
        let (mut lo, mut hi) = (1u64, head.sequence + 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let event: Option<AuditEvent> =
                self.storage.get(CF_AUDIT_LOG, &sequence_key(mid)).await?;
            match event {
                Some(e) if e.timestamp >= since => hi = mid,
                _ => lo = mid + 1,
            }
        }
        Ok(lo)
    }

    async fn scan(&self, start: u64, limit: usize) -> Result<Vec<AuditEvent>> {
        let rows: Vec<(Vec<u8>, AuditEvent)> = self
            .storage
            .scan_from(CF_AUDIT_LOG, &sequence_key(start), limit)
            .await?;
        Ok(rows.into_iter().map(|(_, e)| e).collect())
    }

    /// All events with `timestamp >= since`, oldest first
    pub async fn events_since(&self, since: u64) -> Result<Vec<AuditEvent>> {
        let head = self.head().await?;
        let start = self.first_sequence_since(since, &head).await?;
        self.scan(start, usize::MAX).await
    }

    /// Filtered events, newest first
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let head = self.head().await?;
        let start = match filter.from {
            Some(from) => self.first_sequence_since(from, &head).await?,
            None => 1,
        };

        // Only the newest `limit` matches are held while walking forward
        let limit = filter.effective_limit();
        let mut newest: VecDeque<AuditEvent> = VecDeque::with_capacity(limit.min(SCAN_PAGE));
        let mut next = start;
        'pages: loop {
            let page = self.scan(next, SCAN_PAGE).await?;
            let Some(last) = page.last() else {
                break;
            };
            next = last.sequence + 1;
            let full = page.len() == SCAN_PAGE;

            for event in page {
                if filter.to.is_some_and(|to| event.timestamp > to) {
                    break 'pages;
                }
                if filter.matches(&event) {
                    if newest.len() == limit {
                        newest.pop_front();
                    }
                    newest.push_back(event);
                }
            }
            if !full {
                break;
            }
        }
        Ok(newest.into_iter().rev().collect())
    }

    /// Serialize filtered events (oldest first). Read-only.
    pub async fn export(&self, filter: &AuditFilter, format: ExportFormat) -> Result<String> {
        let mut events = self.query(filter).await?;
        events.reverse();
        export_events(&events, format)
    }

    /// Recompute the chain over `[from, to]` (defaults: whole log)
    pub async fn verify_integrity(&self, from: Option<u64>, to: Option<u64>) -> Result<IntegrityReport> {
        let head = self.head().await?;
        let from = from.unwrap_or(1).max(1);
        let to = to.unwrap_or(head.sequence).min(head.sequence);

        let mut report = IntegrityReport {
            from_sequence: from,
            to_sequence: to,
            checked: 0,
            divergences: Vec::new(),
        };
        if head.sequence == 0 || from > to {
            return Ok(report);
        }

        let mut expected_previous = if from == 1 {
            GENESIS_HASH.to_string()
        } else {
            match self.get_event(from - 1).await {
                Ok(prior) => prior.event_hash,
                Err(AuditError::NotFound(_)) => {
                    report.divergences.push(Divergence {
                        sequence: from - 1,
                        kind: DivergenceKind::MissingEvent,
                        expected: format!("event {}", from - 1),
                        found: "nothing".to_string(),
                    });
                    String::new()
                }
                Err(e) => return Err(e),
            }
        };

        let mut expected_sequence = from;
        let mut next = from;

        'pages: while next <= to {
            let page = self.scan(next, SCAN_PAGE).await?;
            let Some(last) = page.last() else {
                break;
            };
            next = last.sequence + 1;
            let full = page.len() == SCAN_PAGE;

            for event in page {
                if event.sequence > to {
                    break 'pages;
                }
                while expected_sequence < event.sequence {
                    report.divergences.push(missing(expected_sequence));
                    expected_sequence += 1;
                }

                if !expected_previous.is_empty() && event.previous_hash != expected_previous {
                    report.divergences.push(Divergence {
                        sequence: event.sequence,
                        kind: DivergenceKind::BrokenLink,
                        expected: expected_previous.clone(),
                        found: event.previous_hash.clone(),
                    });
                }

                let recomputed = compute_event_hash(&event)?;
                if recomputed != event.event_hash {
                    report.divergences.push(Divergence {
                        sequence: event.sequence,
                        kind: DivergenceKind::HashMismatch,
                        expected: recomputed,
                        found: event.event_hash.clone(),
                    });
                }

                expected_previous = event.event_hash;
                expected_sequence = event.sequence + 1;
                report.checked += 1;
            }
            if !full {
                break;
            }
        }

        while expected_sequence <= to {
            report.divergences.push(missing(expected_sequence));
            expected_sequence += 1;
        }

        // Truncation or a rewritten tail shows up as a head that no longer
        // matches the last stored event.
        if to == head.sequence && !expected_previous.is_empty() && head.event_hash != expected_previous {
            report.divergences.push(Divergence {
                sequence: head.sequence,
                kind: DivergenceKind::HashMismatch,
                expected: head.event_hash.clone(),
                found: expected_previous,
            });
        }

        for d in &report.divergences {
            error!(
                sequence = d.sequence,
                kind = ?d.kind,
                "Audit chain divergence"
            );
        }
        info!(
            from = report.from_sequence,
            to = report.to_sequence,
            checked = report.checked,
            intact = report.is_intact(),
            "Audit integrity check finished"
        );

        Ok(report)
    }

    /// Like [`Self::verify_integrity`] but fails on the first divergence
    pub async fn ensure_integrity(&self, from: Option<u64>, to: Option<u64>) -> Result<IntegrityReport> {
        let report = self.verify_integrity(from, to).await?;
        if let Some(d) = report.divergences.first() {
            return Err(AuditError::Integrity {
                sequence: d.sequence,
                reason: format!("{:?}", d.kind),
            });
        }
        Ok(report)
    }

    /// Run every detector over one snapshot, joined under `deadline`, and
    /// persist alerts whose fingerprint has not been seen.
    pub async fn run_detection(&self, deadline: Duration) -> Result<Vec<SecurityAlert>> {
        let now = self.clock.now();
        let lookback = self
            .detectors
            .iter()
            .map(|d| d.window_seconds())
            .max()
            .unwrap_or(0);
        let snapshot = Arc::new(self.events_since(now.saturating_sub(lookback)).await?);

        let runs = self.detectors.iter().map(|detector| {
            let detector = Arc::clone(detector);
            let snapshot = Arc::clone(&snapshot);
            async move { detector.detect(snapshot, now).await }
        });
        let candidates = tokio::time::timeout(deadline, join_all(runs))
            .await
            .map_err(|_| AuditError::DeadlineExceeded(deadline))?;

        let mut raised = Vec::new();
        for candidate in candidates.into_iter().flatten() {
            let fingerprint = candidate.fingerprint(now);
            if self.storage.exists(CF_SECURITY_ALERTS, &fingerprint).await? {
                continue;
            }

            let alert = SecurityAlert {
                alert_id: Uuid::new_v4(),
                fingerprint,
                detector: candidate.detector.to_string(),
                severity: candidate.severity,
                subject: candidate.subject,
                description: candidate.description,
                evidence: candidate.evidence,
                window_seconds: candidate.window_seconds,
                detected_at: now,
            };
            self.storage
                .put(CF_SECURITY_ALERTS, &alert.fingerprint, &alert)
                .await?;

            self.record(
                NewEvent::new(events::SECURITY_ALERT, alert.severity)
                    .outcome(Outcome::Failure)
                    .details(serde_json::json!({
                        "alert_id": alert.alert_id,
                        "detector": alert.detector,
                        "subject": alert.subject,
                        "description": alert.description,
                        "evidence": alert.evidence,
                    })),
            )
            .await?;

            warn!(
                detector = %alert.detector,
                subject = %alert.subject,
                severity = %alert.severity,
                "Security alert raised"
            );
            raised.push(alert);
        }

        debug!(
            detectors = self.detectors.len(),
            snapshot = snapshot.len(),
            raised = raised.len(),
            "Anomaly detection finished"
        );
        Ok(raised)
    }

    /// Alerts, newest first
    pub async fn list_alerts(&self, limit: Option<usize>) -> Result<Vec<SecurityAlert>> {
        let rows: Vec<(Vec<u8>, SecurityAlert)> = self.storage.scan_all(CF_SECURITY_ALERTS).await?;
        let mut alerts: Vec<SecurityAlert> = rows.into_iter().map(|(_, a)| a).collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        if let Some(limit) = limit {
            alerts.truncate(limit);
        }
        Ok(alerts)
    }

    /// Last-24h posture, gathered concurrently under `deadline`
    pub async fn security_summary(&self, deadline: Duration) -> Result<SecuritySummary> {
        let now = self.clock.now();
        let since = now.saturating_sub(DAY);

        let gather = async {
            tokio::try_join!(self.head(), self.events_since(since), self.list_alerts(None))
        };
        let (head, recent, alerts) = tokio::time::timeout(deadline, gather)
            .await
            .map_err(|_| AuditError::DeadlineExceeded(deadline))??;

        let mut by_severity: BTreeMap<String, u64> = BTreeMap::new();
        for event in &recent {
            *by_severity.entry(event.severity.to_string()).or_default() += 1;
        }

        Ok(SecuritySummary {
            generated_at: now,
            head_sequence: head.sequence,
            events_last_24h: recent.len() as u64,
            by_severity,
            failed_logins_last_24h: recent
                .iter()
                .filter(|e| e.event_type == events::LOGIN_FAILURE)
                .count() as u64,
            alerts_last_24h: alerts.iter().filter(|a| a.detected_at >= since).count() as u64,
        })
    }
}

fn missing(sequence: u64) -> Divergence {
    Divergence {
        sequence,
        kind: DivergenceKind::MissingEvent,
        expected: format!("event {}", sequence),
        found: "nothing".to_string(),
    }
}

fn mirror_to_log(event: &AuditEvent) {
    match event.severity {
        Severity::Debug => debug!(
            sequence = event.sequence,
            event_type = %event.event_type,
            "audit"
        ),
        Severity::Info => info!(
            sequence = event.sequence,
            event_type = %event.event_type,
            actor = ?event.actor_id,
            "audit"
        ),
        Severity::Warning => warn!(
            sequence = event.sequence,
            event_type = %event.event_type,
            actor = ?event.actor_id,
            target = ?event.target_id,
            "audit"
        ),
        Severity::Error | Severity::Critical | Severity::Emergency => error!(
            sequence = event.sequence,
            event_type = %event.event_type,
            severity = %event.severity,
            actor = ?event.actor_id,
            target = ?event.target_id,
            "audit"
        ),
    }
}

#[async_trait]
impl<S: Storage + 'static> AuditRecorder for AuditService<S> {
    async fn record(&self, new: NewEvent) -> Result<AuditEvent> {
        let details = serde_json::to_string(&new.details)?;

        let _guard = self.storage.lock(HEAD_LOCK).await;
        let head = self.head().await?;

        let mut event = AuditEvent {
            sequence: head.sequence + 1,
            event_id: Uuid::new_v4(),
            // Never earlier than the previous event
            timestamp: self.clock.now().max(head.timestamp),
            event_type: new.event_type,
            severity: new.severity,
            actor_id: new.actor_id,
            target_id: new.target_id,
            ip_address: new.ip_address,
            outcome: new.outcome,
            details,
            previous_hash: head.event_hash,
            event_hash: String::new(),
        };
        event.event_hash = compute_event_hash(&event)?;

        let new_head = ChainHead {
            sequence: event.sequence,
            event_hash: event.event_hash.clone(),
            timestamp: event.timestamp,
        };
        let key = sequence_key(event.sequence);

        let mut batch = self.storage.batch();
        batch.put(CF_AUDIT_LOG, &key, &event)?;
        batch.put(CF_AUDIT_HEAD, &HEAD_KEY.to_string(), &new_head)?;
        if event.severity >= Severity::Critical {
            batch.put(CF_AUDIT_CRITICAL_EVENTS, &key, &())?;
        }
        batch.commit().await?;

        mirror_to_log(&event);
        Ok(event)
    }
}
