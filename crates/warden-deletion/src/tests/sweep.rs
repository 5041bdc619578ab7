//! Purge sweep and reminder tests.

use super::helpers::*;
use crate::*;
use warden_audit::events;
use warden_crypto::{DAY, MINUTE};
use warden_identity::UserDirectory;
use warden_policy::Role;
use warden_storage::{Storage, CF_USER_DELETION_QUEUE};

#[tokio::test]
async fn test_sweep_purges_due_accounts_once() {
    let h = harness();
    let (user, actor) = user_with_password(&h, "alice").await;
    let (bystander, _) = create(&h, "bobby", Role::User).await;
    h.service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();

    h.clock.advance(7 * DAY - 1);
    assert_eq!(
        h.service.process_due_deletions().await.unwrap(),
        SweepReport::default()
    );

    h.clock.advance(1);
    let report = h.service.process_due_deletions().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    assert!(h.directory.get_user(user.user_id).await.is_err());
    assert!(h
        .credentials
        .password_record(user.user_id)
        .await
        .unwrap()
        .is_none());
    assert!(h.directory.get_user(bystander.user_id).await.is_ok());

    let request = h
        .service
        .latest_for_user(user.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, DeletionStatus::Completed);
    assert_eq!(request.claimed_by.as_deref(), Some("worker-test"));

    // The audit trail outlives the account
    let completed = events_of(&h, events::DELETION_COMPLETED).await;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].target_id, Some(user.user_id));

    assert_eq!(h.service.process_due_deletions().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn test_concurrent_sweeps_never_double_process() {
    let h = harness();
    for name in ["alice", "bobby", "carol"] {
        let (user, actor) = create(&h, name, Role::User).await;
        h.service
            .request_deletion(&actor, user.user_id, None, false, None)
            .await
            .unwrap();
    }
    h.clock.advance(7 * DAY);

    let (a, b) = tokio::join!(
        h.service.process_due_deletions(),
        h.service.process_due_deletions()
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.claimed + b.claimed, 3);
    assert_eq!(a.completed + b.completed, 3);
    assert_eq!(events_of(&h, events::DELETION_COMPLETED).await.len(), 3);
}

#[tokio::test]
async fn test_abandoned_claim_is_taken_over() {
    let h = harness();
    let (user, actor) = create(&h, "alice", Role::User).await;
    let mut request = h
        .service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap()
        .request;

    // A worker claimed the request and died before purging
    h.clock.advance(7 * DAY);
    request.claimed_by = Some("worker-gone".to_string());
    request.claimed_at = Some(START + 7 * DAY);
    h.storage
        .put(CF_USER_DELETION_QUEUE, &request.request_id, &request)
        .await
        .unwrap();

    assert_eq!(h.service.process_due_deletions().await.unwrap().claimed, 0);
    assert!(h.directory.get_user(user.user_id).await.is_ok());

    h.clock.advance(10 * MINUTE);
    let report = h.service.process_due_deletions().await.unwrap();
    assert_eq!(report.completed, 1);
    assert!(h.directory.get_user(user.user_id).await.is_err());
}

#[tokio::test]
async fn test_cancelled_requests_are_left_alone() {
    let h = harness();
    let (user, actor) = create(&h, "alice", Role::User).await;
    let token = h
        .service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap()
        .cancellation_token
        .unwrap();
    h.service
        .cancel_deletion(user.user_id, &token, None)
        .await
        .unwrap();

    h.clock.advance(8 * DAY);
    assert_eq!(h.service.process_due_deletions().await.unwrap().claimed, 0);
    assert!(h.directory.get_user(user.user_id).await.unwrap().is_active());
}

#[tokio::test]
async fn test_reminders_go_out_once() {
    let h = harness();
    let (user, actor) = create(&h, "alice", Role::User).await;
    h.service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();

    assert_eq!(h.service.send_due_reminders().await.unwrap(), 0);

    h.clock.advance(DAY);
    assert_eq!(h.service.send_due_reminders().await.unwrap(), 1);
    assert_eq!(h.service.send_due_reminders().await.unwrap(), 0);

    // Day 3 and day 6 both overdue: one notice, both flags set
    h.clock.advance(5 * DAY);
    assert_eq!(h.service.send_due_reminders().await.unwrap(), 1);
    assert_eq!(
        *h.notifier.reminders.lock().unwrap(),
        vec![Reminder::Day1, Reminder::Day6]
    );

    let request = h
        .service
        .latest_for_user(user.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(request.reminder_1_sent && request.reminder_3_sent && request.reminder_6_sent);
    assert_eq!(events_of(&h, events::DELETION_REMINDER).await.len(), 2);
}

#[tokio::test]
async fn test_purge_closes_pending_promotions() {
    use warden_roles::{PromotionStatus, RoleError, VoteDecision};

    let h = harness();
    let (user, actor) = user_with_password(&h, "alice").await;
    let (_, admin1) = create(&h, "admin1", Role::Admin).await;
    let (_, admin2) = create(&h, "admin2", Role::Admin).await;

    let promotion = h
        .roles
        .initiate_promotion(&admin1, user.user_id, Role::User, Role::Admin, None)
        .await
        .unwrap();
    h.roles
        .vote(&admin1, promotion.request_id, VoteDecision::Approve, None)
        .await
        .unwrap();

    h.service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();
    h.clock.advance(7 * DAY);
    assert_eq!(h.service.process_due_deletions().await.unwrap().completed, 1);

    let closed = h.roles.get_promotion(promotion.request_id).await.unwrap();
    assert_eq!(closed.status, PromotionStatus::Expired);
    assert!(matches!(
        h.roles
            .vote(&admin2, promotion.request_id, VoteDecision::Approve, None)
            .await,
        Err(RoleError::Conflict(_))
    ));
    assert!(h
        .directory
        .role_assignments(user.user_id)
        .await
        .unwrap()
        .is_empty());
}
