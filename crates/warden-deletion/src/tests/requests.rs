//! Request and cancellation tests.

use super::helpers::*;
use crate::*;
use warden_audit::events;
use warden_credentials::CredentialError;
use warden_crypto::DAY;
use warden_identity::{UserDirectory, UserStatus};
use warden_policy::Role;
use warden_sessions::{LoginOutcome, SessionError};

#[tokio::test]
async fn test_self_deletion_then_cancel_on_day_two() {
    let h = harness();
    let (user, actor) = user_with_password(&h, "alice").await;

    let receipt = h
        .service
        .request_deletion(&actor, user.user_id, Some("testing".to_string()), false, None)
        .await
        .unwrap();
    assert!(!receipt.existing);
    assert_eq!(receipt.request.status, DeletionStatus::Pending);
    assert_eq!(receipt.request.requested_at, START);
    assert_eq!(receipt.request.scheduled_for, START + 7 * DAY);
    assert_eq!(receipt.request.reason.as_deref(), Some("testing"));
    let token = receipt.cancellation_token.unwrap();

    assert_eq!(
        h.directory.get_user(user.user_id).await.unwrap().status,
        UserStatus::PendingDeletion
    );
    assert!(matches!(
        login(&h, &user).await,
        Err(SessionError::Credential(CredentialError::AccountUnavailable))
    ));

    h.clock.advance(2 * DAY);
    let cancelled = h
        .service
        .cancel_deletion(user.user_id, &token, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, DeletionStatus::Cancelled);
    assert_eq!(cancelled.cancelled_at, Some(START + 2 * DAY));

    assert!(matches!(
        login(&h, &user).await.unwrap(),
        LoginOutcome::Authenticated(_)
    ));
    assert_eq!(events_of(&h, events::DELETION_CANCELLED).await.len(), 1);
}

#[tokio::test]
async fn test_duplicate_request_returns_existing() {
    let h = harness();
    let (user, actor) = create(&h, "alice", Role::User).await;

    let first = h
        .service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();
    h.clock.advance(60);
    let second = h
        .service
        .request_deletion(&actor, user.user_id, Some("again".to_string()), false, None)
        .await
        .unwrap();

    assert!(second.existing);
    assert!(second.cancellation_token.is_none());
    assert_eq!(second.request.request_id, first.request.request_id);
    assert_eq!(second.request.scheduled_for, first.request.scheduled_for);
    assert_eq!(events_of(&h, events::DELETION_REQUESTED).await.len(), 1);
}

#[tokio::test]
async fn test_request_ends_sessions() {
    let h = harness();
    let (user, actor) = user_with_password(&h, "alice").await;
    let LoginOutcome::Authenticated(signed_in) = login(&h, &user).await.unwrap() else {
        panic!("unexpected MFA step");
    };

    h.service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();

    assert!(matches!(
        h.sessions
            .verify_access_token(&signed_in.tokens.access_token)
            .await,
        Err(SessionError::SessionExpired)
    ));
}

#[tokio::test]
async fn test_cancellation_token_is_single_use_and_bound() {
    let h = harness();
    let (alice, alice_actor) = create(&h, "alice", Role::User).await;
    let (bob, bob_actor) = create(&h, "bobby", Role::User).await;

    let alice_token = h
        .service
        .request_deletion(&alice_actor, alice.user_id, None, false, None)
        .await
        .unwrap()
        .cancellation_token
        .unwrap();
    h.service
        .request_deletion(&bob_actor, bob.user_id, None, false, None)
        .await
        .unwrap();

    // Another user's token, and garbage, are refused without side effects
    assert!(matches!(
        h.service.cancel_deletion(bob.user_id, &alice_token, None).await,
        Err(DeletionError::InvalidToken)
    ));
    assert!(matches!(
        h.service.cancel_deletion(alice.user_id, "not-a-token", None).await,
        Err(DeletionError::InvalidToken)
    ));

    h.service
        .cancel_deletion(alice.user_id, &alice_token, None)
        .await
        .unwrap();
    assert!(matches!(
        h.service.cancel_deletion(alice.user_id, &alice_token, None).await,
        Err(DeletionError::Conflict(_))
    ));

    // A fresh request gets a fresh token; the old one stays dead
    let renewed = h
        .service
        .request_deletion(&alice_actor, alice.user_id, None, false, None)
        .await
        .unwrap();
    assert!(!renewed.existing);
    assert!(matches!(
        h.service.cancel_deletion(alice.user_id, &alice_token, None).await,
        Err(DeletionError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_cannot_cancel_after_cooling_off() {
    let h = harness();
    let (user, actor) = create(&h, "alice", Role::User).await;
    let token = h
        .service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap()
        .cancellation_token
        .unwrap();

    h.clock.advance(7 * DAY);
    assert!(matches!(
        h.service.cancel_deletion(user.user_id, &token, None).await,
        Err(DeletionError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_admin_request_keeps_cooling_off() {
    let h = harness();
    let (_, admin) = create(&h, "admin1", Role::Admin).await;
    let (user, _) = create(&h, "alice", Role::User).await;

    let receipt = h
        .service
        .request_deletion(&admin, user.user_id, None, false, None)
        .await
        .unwrap();
    assert_eq!(receipt.request.scheduled_for, START + 7 * DAY);
    assert_eq!(receipt.request.requested_by, admin.user_id);

    // The owner is told how to cancel
    let scheduled = h.notifier.scheduled.lock().unwrap().clone();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0, user.user_id);
    assert_eq!(Some(scheduled[0].1.clone()), receipt.cancellation_token);
}

#[tokio::test]
async fn test_user_cannot_delete_others() {
    let h = harness();
    let (_, mallory) = create(&h, "mallory", Role::User).await;
    let (victim, _) = create(&h, "victim", Role::User).await;

    assert!(matches!(
        h.service
            .request_deletion(&mallory, victim.user_id, None, false, None)
            .await,
        Err(DeletionError::Forbidden(_))
    ));
    assert!(h.service.latest_for_user(victim.user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_override_requires_site_admin() {
    let h = harness();
    let (_, admin) = create(&h, "admin1", Role::Admin).await;
    let (_, root) = create(&h, "root", Role::SiteAdmin).await;
    let (user, _) = create(&h, "alice", Role::User).await;

    assert!(matches!(
        h.service
            .request_deletion(&admin, user.user_id, None, true, None)
            .await,
        Err(DeletionError::Forbidden(_))
    ));

    let receipt = h
        .service
        .request_deletion(&root, user.user_id, Some("abuse".to_string()), true, None)
        .await
        .unwrap();
    assert_eq!(receipt.request.status, DeletionStatus::Completed);
    assert!(receipt.request.override_applied);
    assert!(receipt.cancellation_token.is_none());
    assert!(h.directory.get_user(user.user_id).await.is_err());
    assert!(h
        .credentials
        .password_record(user.user_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_override_completes_pending_request() {
    let h = harness();
    let (_, root) = create(&h, "root", Role::SiteAdmin).await;
    let (user, actor) = create(&h, "alice", Role::User).await;

    let pending = h
        .service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();
    h.clock.advance(DAY);
    let forced = h
        .service
        .request_deletion(&root, user.user_id, None, true, None)
        .await
        .unwrap();

    assert_eq!(forced.request.request_id, pending.request.request_id);
    assert_eq!(forced.request.status, DeletionStatus::Completed);
    assert_eq!(forced.request.completed_at, Some(START + DAY));
    let completed = events_of(&h, events::DELETION_COMPLETED).await;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].actor_id, Some(root.user_id));
}

#[tokio::test]
async fn test_admin_cancels_on_behalf() {
    let h = harness();
    let (_, admin) = create(&h, "admin1", Role::Admin).await;
    let (user, actor) = create(&h, "alice", Role::User).await;
    h.service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();

    let cancelled = h
        .service
        .cancel_deletion_for(&admin, user.user_id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, DeletionStatus::Cancelled);
    assert!(h.directory.get_user(user.user_id).await.unwrap().is_active());
}

#[tokio::test]
async fn test_deletion_status_visibility() {
    let h = harness();
    let (_, admin) = create(&h, "admin1", Role::Admin).await;
    let (_, other) = create(&h, "bobby", Role::User).await;
    let (user, actor) = create(&h, "alice", Role::User).await;

    assert!(matches!(
        h.service.deletion_status(&actor, user.user_id, None).await,
        Err(DeletionError::NotFound(_))
    ));

    h.service
        .request_deletion(&actor, user.user_id, None, false, None)
        .await
        .unwrap();
    let own = h
        .service
        .deletion_status(&actor, user.user_id, None)
        .await
        .unwrap();
    assert_eq!(own.status, DeletionStatus::Pending);
    assert!(h
        .service
        .deletion_status(&admin, user.user_id, None)
        .await
        .is_ok());
    assert!(matches!(
        h.service.deletion_status(&other, user.user_id, None).await,
        Err(DeletionError::Forbidden(_))
    ));
}
