//! Scheduled maintenance loops spawned by `serve`.
//!
//! Every task claims its unit of work atomically inside the services, so a
//! retried run never applies an effect twice.

use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use warden_audit::{events, AuditRecorder, NewEvent, Severity};

use crate::state::AppState;

/// Upper bound on one detector pass
const DETECTION_DEADLINE: Duration = Duration::from_secs(10);

/// Retry schedule for a failed run
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            attempts: 5,
        }
    }
}

/// Run `task` until it succeeds or the attempts are spent
pub async fn with_backoff<F, Fut>(name: &str, backoff: Backoff, task: &F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut delay = backoff.initial;
    let mut attempt = 1;
    loop {
        match task().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < backoff.attempts => {
                warn!(job = name, attempt, error = %e, "Job failed, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(backoff.max);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Spawn a loop that runs `task` every `period`
pub fn run_job<F, Fut>(name: &'static str, period: Duration, task: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, period_secs = period.as_secs(), "Background job started");

        loop {
            interval.tick().await;
            if let Err(e) = with_backoff(name, Backoff::default(), &task).await {
                error!(job = name, error = %e, "Job failed after retries");
            }
        }
    })
}

/// Purge due deletions, then deliver pending reminders
pub async fn deletion_sweep(state: &AppState) -> Result<()> {
    let report = state.deletions.process_due_deletions().await?;
    let reminders = state.deletions.send_due_reminders().await?;
    if report.claimed > 0 || reminders > 0 {
        info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            reminders,
            "Deletion sweep finished"
        );
    }
    if report.failed > 0 {
        anyhow::bail!("{} deletions failed", report.failed);
    }
    Ok(())
}

pub async fn expire_promotions(state: &AppState) -> Result<()> {
    let expired = state.roles.expire_stale_requests().await?;
    if expired > 0 {
        info!(expired, "Expired stale promotion requests");
    }
    Ok(())
}

/// Drop expired sessions and spent credential tokens
pub async fn purge_expired(state: &AppState) -> Result<()> {
    let sessions = state.sessions.purge_expired().await?;
    let tokens = state.credentials.purge_stale_tokens().await?;
    debug!(sessions, tokens, "Purged expired records");
    Ok(())
}

pub async fn detect_anomalies(state: &AppState) -> Result<()> {
    let alerts = state.audit.run_detection(DETECTION_DEADLINE).await?;
    for alert in &alerts {
        warn!(
            detector = %alert.detector,
            subject = %alert.subject,
            severity = alert.severity.as_str(),
            "{}",
            alert.description
        );
    }
    Ok(())
}

/// Re-verify the whole chain; a divergence is recorded once per first bad
/// sequence.
pub async fn check_integrity(state: &AppState, last_reported: &AtomicU64) -> Result<()> {
    let report = state.audit.verify_integrity(None, None).await?;
    let Some(first) = report.divergences.first() else {
        last_reported.store(0, Ordering::SeqCst);
        return Ok(());
    };

    error!(
        divergences = report.divergences.len(),
        first_sequence = first.sequence,
        "AUDIT CHAIN INTEGRITY FAILURE"
    );
    if last_reported.swap(first.sequence, Ordering::SeqCst) == first.sequence {
        return Ok(());
    }
    state
        .audit
        .record(
            NewEvent::new(events::AUDIT_INTEGRITY_FAILURE, Severity::Emergency).details(
                serde_json::json!({
                    "first_sequence": first.sequence,
                    "divergences": report.divergences.len(),
                    "checked": report.checked,
                }),
            ),
        )
        .await?;
    Ok(())
}

/// Start every maintenance loop; abort the handles on shutdown
pub fn spawn_background_jobs(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let sweep = state.config.sweep_interval;
    let detection = state.config.detection_interval;
    let last_reported = Arc::new(AtomicU64::new(0));

    vec![
        run_job("deletion_sweep", sweep, {
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move { deletion_sweep(&state).await }
            }
        }),
        run_job("promotion_expiry", sweep, {
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move { expire_promotions(&state).await }
            }
        }),
        run_job("purge_expired", sweep, {
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move { purge_expired(&state).await }
            }
        }),
        run_job("anomaly_detection", detection, {
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move { detect_anomalies(&state).await }
            }
        }),
        run_job("integrity_check", detection, {
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                let last_reported = Arc::clone(&last_reported);
                async move { check_integrity(&state, &last_reported).await }
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast() -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(4),
            attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_backoff_retries_transient_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let task = move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("transient");
            }
            Ok(())
        };

        with_backoff("test", fast(), &task).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backoff_gives_up() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let task = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("down"))
        };

        assert!(with_backoff("test", fast(), &task).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
