//! Audit service tests.

use crate::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use warden_crypto::ManualClock;
use warden_storage::{sequence_key, RocksDbStorage, Storage, CF_AUDIT_CRITICAL_EVENTS, CF_AUDIT_LOG};

// 2024-01-15 12:00:00 UTC
const START: u64 = 1_705_320_000;

fn service() -> (AuditService<RocksDbStorage>, Arc<RocksDbStorage>, Arc<ManualClock>) {
    let storage = Arc::new(RocksDbStorage::open_test().unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let service = AuditService::new(Arc::clone(&storage), clock.clone());
    (service, storage, clock)
}

async fn record_n(service: &AuditService<RocksDbStorage>, n: usize) -> Vec<AuditEvent> {
    let mut out = Vec::new();
    for i in 0..n {
        out.push(
            service
                .record(
                    NewEvent::new(events::LOGIN_SUCCESS, Severity::Info)
                        .actor(Uuid::new_v4())
                        .details(serde_json::json!({ "n": i })),
                )
                .await
                .unwrap(),
        );
    }
    out
}

#[tokio::test]
async fn test_chain_links_events() {
    let (service, _storage, _clock) = service();
    let events = record_n(&service, 3).await;

    assert_eq!(events[0].sequence, 1);
    assert_eq!(events[0].previous_hash, GENESIS_HASH);
    assert_eq!(events[1].previous_hash, events[0].event_hash);
    assert_eq!(events[2].previous_hash, events[1].event_hash);

    let head = service.head().await.unwrap();
    assert_eq!(head.sequence, 3);
    assert_eq!(head.event_hash, events[2].event_hash);

    let report = service.verify_integrity(None, None).await.unwrap();
    assert!(report.is_intact());
    assert_eq!(report.checked, 3);
}

#[tokio::test]
async fn test_empty_log_is_intact() {
    let (service, _storage, _clock) = service();
    let report = service.verify_integrity(None, None).await.unwrap();
    assert!(report.is_intact());
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn test_mutated_row_is_detected() {
    let (service, storage, _clock) = service();
    let events = record_n(&service, 5).await;

    let mut tampered = events[2].clone();
    tampered.details = r#"{"n":999}"#.to_string();
    storage
        .put(CF_AUDIT_LOG, &sequence_key(3), &tampered)
        .await
        .unwrap();

    let report = service.verify_integrity(None, None).await.unwrap();
    assert!(!report.is_intact());
    assert_eq!(report.divergences[0].sequence, 3);
    assert_eq!(report.divergences[0].kind, DivergenceKind::HashMismatch);

    // A range that excludes the row still verifies
    assert!(service
        .verify_integrity(Some(4), Some(5))
        .await
        .unwrap()
        .is_intact());

    assert!(matches!(
        service.ensure_integrity(Some(2), Some(4)).await,
        Err(AuditError::Integrity { sequence: 3, .. })
    ));
}

#[tokio::test]
async fn test_rehashed_row_breaks_link() {
    let (service, storage, _clock) = service();
    let events = record_n(&service, 3).await;

    // Attacker recomputes the row's own hash, but the successor still points
    // at the original
    let mut tampered = events[1].clone();
    tampered.details = r#"{"n":"forged"}"#.to_string();
    tampered.event_hash = compute_event_hash(&tampered).unwrap();
    storage
        .put(CF_AUDIT_LOG, &sequence_key(2), &tampered)
        .await
        .unwrap();

    let report = service.verify_integrity(None, None).await.unwrap();
    assert!(report
        .divergences
        .iter()
        .any(|d| d.sequence == 3 && d.kind == DivergenceKind::BrokenLink));
}

#[tokio::test]
async fn test_deleted_row_is_detected() {
    let (service, storage, _clock) = service();
    record_n(&service, 4).await;
    storage.delete(CF_AUDIT_LOG, &sequence_key(2)).await.unwrap();

    let report = service.verify_integrity(None, None).await.unwrap();
    assert!(report
        .divergences
        .iter()
        .any(|d| d.sequence == 2 && d.kind == DivergenceKind::MissingEvent));
}

#[tokio::test]
async fn test_critical_events_indexed() {
    let (service, storage, _clock) = service();
    let info = service
        .record(NewEvent::new(events::LOGIN_SUCCESS, Severity::Info))
        .await
        .unwrap();
    let critical = service
        .record(NewEvent::new(events::AUDIT_INTEGRITY_FAILURE, Severity::Emergency))
        .await
        .unwrap();

    assert!(!storage
        .exists(CF_AUDIT_CRITICAL_EVENTS, &sequence_key(info.sequence))
        .await
        .unwrap());
    assert!(storage
        .exists(CF_AUDIT_CRITICAL_EVENTS, &sequence_key(critical.sequence))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_concurrent_records_keep_chain_intact() {
    let (service, _storage, _clock) = service();
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .record(NewEvent::new(events::DATA_BULK_READ, Severity::Info))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(service.head().await.unwrap().sequence, 20);
    assert!(service.verify_integrity(None, None).await.unwrap().is_intact());
}

#[tokio::test]
async fn test_query_filters() {
    let (service, _storage, clock) = service();
    let actor = Uuid::new_v4();

    service
        .record(NewEvent::new(events::LOGIN_SUCCESS, Severity::Info).actor(actor))
        .await
        .unwrap();
    clock.advance(100);
    service
        .record(
            NewEvent::new(events::LOGIN_FAILURE, Severity::Warning)
                .ip(Some("192.168.7.7".to_string()))
                .details(serde_json::json!({ "username": "mallory" })),
        )
        .await
        .unwrap();
    clock.advance(100);
    service
        .record(NewEvent::new(events::ROLE_DEMOTED, Severity::Warning).actor(actor))
        .await
        .unwrap();

    let all = service.query(&AuditFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    // Newest first
    assert_eq!(all[0].event_type, events::ROLE_DEMOTED);

    let by_actor = service
        .query(&AuditFilter {
            actor_id: Some(actor),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_actor.len(), 2);

    let warnings = service
        .query(&AuditFilter {
            min_severity: Some(Severity::Warning),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(warnings.len(), 2);

    let text = service
        .query(&AuditFilter {
            text: Some("MALLORY".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(text.len(), 1);

    let ranged = service
        .query(&AuditFilter {
            from: Some(START + 50),
            to: Some(START + 150),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ranged.len(), 1);
    assert_eq!(ranged[0].event_type, events::LOGIN_FAILURE);

    let limited = service
        .query(&AuditFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].sequence, 3);
}

#[tokio::test]
async fn test_export_does_not_touch_log() {
    let (service, _storage, _clock) = service();
    record_n(&service, 2).await;
    let before = service.head().await.unwrap();

    for format in [ExportFormat::Json, ExportFormat::Csv, ExportFormat::Xml] {
        let out = service.export(&AuditFilter::default(), format).await.unwrap();
        assert!(!out.is_empty());
    }

    assert_eq!(service.head().await.unwrap(), before);
}

#[tokio::test]
async fn test_detection_raises_and_dedupes() {
    let (service, _storage, clock) = service();
    for _ in 0..6 {
        service
            .record(
                NewEvent::new(events::LOGIN_FAILURE, Severity::Warning)
                    .ip(Some("10.1.1.1".to_string()))
                    .outcome(Outcome::Failure)
                    .details(serde_json::json!({ "username": "victim" })),
            )
            .await
            .unwrap();
        clock.advance(5);
    }

    let raised = service.run_detection(Duration::from_secs(5)).await.unwrap();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].detector, "brute_force");
    assert_eq!(raised[0].subject, "victim@10.1.1.1");

    // Same burst in the same window bucket is reported once
    clock.advance(5);
    let again = service.run_detection(Duration::from_secs(5)).await.unwrap();
    assert!(again.is_empty());

    let alerts = service.list_alerts(None).await.unwrap();
    assert_eq!(alerts.len(), 1);

    // The alert itself is on the chain
    let logged = service
        .query(&AuditFilter {
            event_type: Some(events::SECURITY_ALERT.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_security_summary() {
    let (service, _storage, clock) = service();
    service
        .record(NewEvent::new(events::LOGIN_FAILURE, Severity::Warning))
        .await
        .unwrap();
    clock.advance(25 * 3600);
    service
        .record(NewEvent::new(events::LOGIN_FAILURE, Severity::Warning))
        .await
        .unwrap();
    service
        .record(NewEvent::new(events::LOGIN_SUCCESS, Severity::Info))
        .await
        .unwrap();

    let summary = service
        .security_summary(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(summary.head_sequence, 3);
    assert_eq!(summary.events_last_24h, 2);
    assert_eq!(summary.failed_logins_last_24h, 1);
    assert_eq!(summary.by_severity.get("info"), Some(&1));
}

#[tokio::test]
async fn test_authorize_records_denials_only() {
    use warden_policy::{Action, Actor, Resource, Role};

    let (service, _storage, _clock) = service();
    let user = Actor {
        user_id: Uuid::new_v4(),
        role: Role::User,
    };
    let target = Uuid::new_v4();

    let allowed = authorize(&service, &user, Action::ManageAccount, &Resource::Own, None)
        .await
        .unwrap();
    assert!(allowed.is_allowed());
    assert_eq!(service.head().await.unwrap().sequence, 0);

    let denied = authorize(
        &service,
        &user,
        Action::RequestDeletion,
        &Resource::User {
            id: target,
            role: Role::User,
        },
        Some("10.0.0.1".to_string()),
    )
    .await
    .unwrap();
    assert!(!denied.is_allowed());

    let logged = service.get_event(1).await.unwrap();
    assert_eq!(logged.event_type, events::AUTHZ_DENIED);
    assert_eq!(logged.outcome, Outcome::Denied);
    assert_eq!(logged.target_id, Some(target));
    assert_eq!(logged.details_value()["admin_tier"], serde_json::json!(true));
}

#[tokio::test]
async fn test_reads_span_several_pages() {
    let (service, storage, _clock) = service();
    let total = crate::service::SCAN_PAGE * 2 + 3;
    let events = record_n(&service, total).await;

    let report = service.verify_integrity(None, None).await.unwrap();
    assert!(report.is_intact());
    assert_eq!(report.checked, total as u64);

    let limited = service
        .query(&AuditFilter {
            limit: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    let sequences: Vec<u64> = limited.iter().map(|e| e.sequence).collect();
    let last = total as u64;
    assert_eq!(sequences, vec![last, last - 1, last - 2, last - 3, last - 4]);

    // A row on the second page links the walk across the page boundary
    let victim = crate::service::SCAN_PAGE as u64 + 1;
    let mut tampered = events[victim as usize - 1].clone();
    tampered.details = r#"{"n":-1}"#.to_string();
    storage
        .put(CF_AUDIT_LOG, &sequence_key(victim), &tampered)
        .await
        .unwrap();

    let report = service.verify_integrity(None, None).await.unwrap();
    assert_eq!(report.checked, total as u64);
    assert_eq!(report.divergences[0].sequence, victim);
    assert_eq!(report.divergences[0].kind, DivergenceKind::HashMismatch);
}
