//! Password reset flow.

use super::helpers::*;
use crate::*;
use warden_crypto::HOUR;
use warden_policy::Role;

#[tokio::test]
async fn test_reset_same_outcome_for_unknown_email() {
    let h = harness();
    h.service
        .request_password_reset("nobody@example.com", None)
        .await
        .unwrap();
    assert!(h.notifier.last().is_none());

    let user = create_user(&h, "lena", Role::User).await;
    h.service
        .request_password_reset("LENA@example.com", None)
        .await
        .unwrap();
    assert!(h.notifier.last().is_some());
    assert_eq!(h.notifier.tokens.lock().unwrap()[0].0, user.user_id);
}

#[tokio::test]
async fn test_reset_consumes_token_on_success_only() {
    let h = harness();
    let user = create_user(&h, "mona", Role::User).await;
    temporary_password(&h, &user).await;
    let revocations = h.revoker.count();

    h.service
        .request_password_reset(&user.email, None)
        .await
        .unwrap();
    let token = h.notifier.last().unwrap();

    let weak = h
        .service
        .reset_password(&token, &new_password(&user, "weak"), None)
        .await;
    assert!(matches!(weak, Err(CredentialError::WeakPassword(_))));

    let user_id = h
        .service
        .reset_password(&token, &new_password(&user, "Resetpassword9"), None)
        .await
        .unwrap();
    assert_eq!(user_id, user.user_id);
    assert_eq!(h.revoker.count(), revocations + 1);

    let replay = h
        .service
        .reset_password(&token, &new_password(&user, "Anotherpassword9"), None)
        .await;
    assert!(matches!(replay, Err(CredentialError::InvalidToken)));

    assert!(login(&h, &user, "Resetpassword9").await.is_ok());
}

#[tokio::test]
async fn test_reset_token_expires_and_is_superseded() {
    let h = harness();
    let user = create_user(&h, "nina", Role::User).await;

    h.service.request_password_reset(&user.email, None).await.unwrap();
    let first = h.notifier.last().unwrap();
    h.service.request_password_reset(&user.email, None).await.unwrap();
    let second = h.notifier.last().unwrap();

    let superseded = h
        .service
        .reset_password(&first, &new_password(&user, "Resetpassword9"), None)
        .await;
    assert!(matches!(superseded, Err(CredentialError::InvalidToken)));

    h.clock.advance(HOUR);
    let expired = h
        .service
        .reset_password(&second, &new_password(&user, "Resetpassword9"), None)
        .await;
    assert!(matches!(expired, Err(CredentialError::InvalidToken)));
}
