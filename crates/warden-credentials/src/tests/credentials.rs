//! Temporary credentials, authentication and password change.

use super::helpers::*;
use crate::*;
use warden_audit::{events, AuditFilter};
use warden_crypto::{client_password_hash, DAY, HOUR};
use warden_identity::{UserDirectory, UserStatus};
use warden_policy::Role;

#[tokio::test]
async fn test_temporary_credential_retrieved_once() {
    let h = harness();
    let user = create_user(&h, "alice", Role::User).await;

    let issued = h
        .service
        .provision_temporary_credential(user.user_id, None, None)
        .await
        .unwrap();
    assert_eq!(issued.expires_at, START + DAY);

    let credential = h
        .service
        .retrieve_credential(&issued.retrieval_token, None)
        .await
        .unwrap();
    assert_eq!(credential.username, "alice");
    assert_eq!(credential.temporary_password.len(), 14);
    assert_eq!(credential.expires_at, START + DAY);

    let again = h
        .service
        .retrieve_credential(&issued.retrieval_token, None)
        .await;
    assert!(matches!(again, Err(CredentialError::InvalidToken)));

    let outcome = login(&h, &user, &credential.temporary_password).await.unwrap();
    assert!(outcome.must_change);
    assert_eq!(outcome.role, Role::User);
}

#[tokio::test]
async fn test_concurrent_retrieval_single_winner() {
    let h = harness();
    let user = create_user(&h, "bob", Role::User).await;
    let issued = h
        .service
        .provision_temporary_credential(user.user_id, None, None)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.service.retrieve_credential(&issued.retrieval_token, None),
        h.service.retrieve_credential(&issued.retrieval_token, None),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

#[tokio::test]
async fn test_concurrent_issuance_leaves_one_live_token() {
    let h = harness();
    let user = create_user(&h, "bianca", Role::User).await;

    let (a, b) = tokio::join!(
        h.service.provision_temporary_credential(user.user_id, None, None),
        h.service.provision_temporary_credential(user.user_id, None, None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let (first, second) = tokio::join!(
        h.service.retrieve_credential(&a.retrieval_token, None),
        h.service.retrieve_credential(&b.retrieval_token, None),
    );
    let revealed: Vec<_> = [first, second].into_iter().filter_map(|r| r.ok()).collect();
    assert_eq!(revealed.len(), 1);

    // The one password that can be learned is the one in force
    let outcome = login(&h, &user, &revealed[0].temporary_password).await.unwrap();
    assert!(outcome.must_change);
}

#[tokio::test]
async fn test_password_stored_only_as_slow_hash() {
    let h = harness();
    let user = create_user(&h, "carol", Role::Admin).await;
    let password = temporary_password(&h, &user).await;
    assert_eq!(password.len(), 18);

    let record = h.service.password_record(user.user_id).await.unwrap().unwrap();
    assert!(record.hash.starts_with("$argon2id$"));
    assert!(!record.hash.contains(&password));
    assert!(record.must_change);
}

#[tokio::test]
async fn test_issue_requires_capability_and_tier() {
    let h = harness();
    let admin = create_user(&h, "admin1", Role::Admin).await;
    let site = create_user(&h, "root", Role::SiteAdmin).await;
    let user = create_user(&h, "dave", Role::User).await;

    let admin_actor = h.directory.actor(admin.user_id).await.unwrap();
    let user_actor = h.directory.actor(user.user_id).await.unwrap();

    assert!(h
        .service
        .issue_temporary_credential(&admin_actor, user.user_id, None)
        .await
        .is_ok());

    let upward = h
        .service
        .issue_temporary_credential(&admin_actor, site.user_id, None)
        .await;
    assert!(matches!(upward, Err(CredentialError::Forbidden(_))));

    let own = h
        .service
        .issue_temporary_credential(&admin_actor, admin.user_id, None)
        .await;
    assert!(matches!(own, Err(CredentialError::Forbidden(_))));

    let by_user = h
        .service
        .issue_temporary_credential(&user_actor, admin.user_id, None)
        .await;
    assert!(matches!(by_user, Err(CredentialError::Forbidden(_))));

    let denials = h
        .audit
        .query(&AuditFilter {
            event_type: Some(events::AUTHZ_DENIED.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(denials.len(), 3);
}

#[tokio::test]
async fn test_authentication_failures_are_generic() {
    let h = harness();
    let user = create_user(&h, "erin", Role::User).await;
    let password = temporary_password(&h, &user).await;

    let unknown = h
        .service
        .authenticate("nobody", "deadbeef", "00", None)
        .await;
    assert!(matches!(unknown, Err(CredentialError::InvalidCredentials)));

    let wrong_password = login(&h, &user, "not-the-password").await;
    assert!(matches!(wrong_password, Err(CredentialError::InvalidCredentials)));

    let wrong_salt = h
        .service
        .authenticate(
            "erin",
            &client_password_hash(&password, &user.client_salt),
            "ffffffffffffffffffffffffffffffff",
            None,
        )
        .await;
    assert!(matches!(wrong_salt, Err(CredentialError::InvalidCredentials)));

    let failures = h
        .audit
        .query(&AuditFilter {
            event_type: Some(events::LOGIN_FAILURE.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().any(|e| e.actor_id.is_none()));
}

#[tokio::test]
async fn test_decoy_salt_is_stable() {
    let h = harness();
    let user = create_user(&h, "frank", Role::User).await;

    assert_eq!(h.service.client_salt_for("Frank").await.unwrap(), user.client_salt);

    let decoy = h.service.client_salt_for("ghost").await.unwrap();
    assert_eq!(decoy.len(), user.client_salt.len());
    assert_eq!(decoy, h.service.client_salt_for("GHOST ").await.unwrap());
    assert_ne!(decoy, h.service.client_salt_for("phantom").await.unwrap());
}

#[tokio::test]
async fn test_expired_temporary_password_rejected() {
    let h = harness();
    let user = create_user(&h, "gina", Role::User).await;
    let password = temporary_password(&h, &user).await;

    h.clock.advance(DAY - 1);
    assert!(login(&h, &user, &password).await.is_ok());

    h.clock.advance(1);
    assert!(matches!(
        login(&h, &user, &password).await,
        Err(CredentialError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_unavailable_account_only_after_verification() {
    let h = harness();
    let user = create_user(&h, "hank", Role::User).await;
    let password = temporary_password(&h, &user).await;
    h.directory
        .set_status(user.user_id, UserStatus::PendingDeletion)
        .await
        .unwrap();

    assert!(matches!(
        login(&h, &user, &password).await,
        Err(CredentialError::AccountUnavailable)
    ));
    assert!(matches!(
        login(&h, &user, "guess").await,
        Err(CredentialError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_change_password_enforces_policy_and_revokes_sessions() {
    let h = harness();
    let user = create_user(&h, "ivan", Role::User).await;
    let temporary = temporary_password(&h, &user).await;
    let current = client_password_hash(&temporary, &user.client_salt);
    let revocations = h.revoker.count();

    let weak = h
        .service
        .change_password(user.user_id, &current, &new_password(&user, "short"), None)
        .await;
    match weak {
        Err(CredentialError::WeakPassword(errors)) => assert!(!errors.is_empty()),
        other => panic!("expected WeakPassword, got {:?}", other.map(|_| ())),
    }

    let same = h
        .service
        .change_password(user.user_id, &current, &new_password(&user, &temporary), None)
        .await;
    assert!(matches!(same, Err(CredentialError::PasswordReused)));

    let wrong = h
        .service
        .change_password(
            user.user_id,
            "bogus",
            &new_password(&user, "Correcthorse42"),
            None,
        )
        .await;
    assert!(matches!(wrong, Err(CredentialError::InvalidCredentials)));

    let record = h
        .service
        .change_password(
            user.user_id,
            &current,
            &new_password(&user, "Correcthorse42"),
            None,
        )
        .await
        .unwrap();
    assert!(!record.must_change);
    assert_eq!(record.expires_at, START + 180 * DAY);
    assert_eq!(h.revoker.count(), revocations + 1);

    assert!(login(&h, &user, &temporary).await.is_err());
    let outcome = login(&h, &user, "Correcthorse42").await.unwrap();
    assert!(!outcome.must_change);
}

#[tokio::test]
async fn test_history_blocks_recent_passwords() {
    let h = harness();
    let user = create_user(&h, "judy", Role::User).await;
    let temporary = temporary_password(&h, &user).await;

    let steps = ["Firstpassword1", "Secondpassword2"];
    let mut current = client_password_hash(&temporary, &user.client_salt);
    for step in steps {
        h.clock.advance(HOUR);
        h.service
            .change_password(user.user_id, &current, &new_password(&user, step), None)
            .await
            .unwrap();
        current = client_password_hash(step, &user.client_salt);
    }

    for reused in [temporary.as_str(), "Firstpassword1"] {
        let result = h
            .service
            .change_password(user.user_id, &current, &new_password(&user, reused), None)
            .await;
        assert!(matches!(result, Err(CredentialError::PasswordReused)));
    }

    assert!(h
        .service
        .change_password(
            user.user_id,
            &current,
            &new_password(&user, "Thirdpassword3"),
            None,
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn test_purge_removes_credentials() {
    let h = harness();
    let user = create_user(&h, "kim", Role::User).await;
    let password = temporary_password(&h, &user).await;

    h.service.purge_user(user.user_id).await.unwrap();
    h.service.purge_user(user.user_id).await.unwrap();

    assert!(h.service.password_record(user.user_id).await.unwrap().is_none());
    assert!(matches!(
        login(&h, &user, &password).await,
        Err(CredentialError::InvalidCredentials)
    ));
}
