//! Test harness for session service tests.

use crate::*;
use std::sync::Arc;
use warden_audit::{AuditEvent, AuditFilter, AuditService};
use warden_credentials::{CredentialConfig, CredentialService, SessionRevoker};
use warden_crypto::{client_password_hash, ManualClock, SlowHashParams};
use warden_identity::{CreateUserRequest, User, UserDirectory, UserDirectoryService};
use warden_policy::{EphemeralStore, InMemoryStore, RateLimiter, Role};
use warden_storage::RocksDbStorage;

// 2024-01-15 12:00:00 UTC
pub const START: u64 = 1_705_320_000;

pub type TestDirectory = UserDirectoryService<RocksDbStorage>;
pub type TestAudit = AuditService<RocksDbStorage>;
pub type TestCredentials = CredentialService<RocksDbStorage, TestDirectory, TestAudit>;
pub type TestSessionService = SessionService<RocksDbStorage, TestDirectory, TestAudit>;

pub struct Harness {
    pub service: TestSessionService,
    pub credentials: Arc<TestCredentials>,
    pub directory: Arc<TestDirectory>,
    pub audit: Arc<TestAudit>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    let storage = Arc::new(RocksDbStorage::open_test().unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let directory = Arc::new(UserDirectoryService::new(Arc::clone(&storage), clock.clone()));
    let audit = Arc::new(AuditService::new(Arc::clone(&storage), clock.clone()));
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&storage),
        Arc::clone(&audit),
        clock.clone(),
    ));

    let master_key = [5u8; 32];
    let revoker: Arc<dyn SessionRevoker> = registry.clone();
    let credentials = Arc::new(CredentialService::new(
        Arc::clone(&storage),
        Arc::clone(&directory),
        Arc::clone(&audit),
        revoker,
        clock.clone(),
        CredentialConfig::new(&master_key)
            .unwrap()
            .with_slow_hash(SlowHashParams::minimal()),
    ));

    let store: Arc<dyn EphemeralStore> = Arc::new(InMemoryStore::new());
    let service = SessionService::new(
        storage,
        Arc::clone(&directory),
        Arc::clone(&audit),
        Arc::clone(&credentials),
        registry,
        Arc::new(RateLimiter::new(store)),
        clock.clone(),
        SessionConfig::new(b"session-test-secret", &master_key),
    );

    Harness {
        service,
        credentials,
        directory,
        audit,
        clock,
    }
}

/// A user holding a freshly retrieved temporary password
pub async fn user_with_password(h: &Harness, username: &str) -> (User, String) {
    let user = h
        .directory
        .create_user(CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            role: Role::User,
            created_by: None,
        })
        .await
        .unwrap();
    let issued = h
        .credentials
        .provision_temporary_credential(user.user_id, None, None)
        .await
        .unwrap();
    let credential = h
        .credentials
        .retrieve_credential(&issued.retrieval_token, None)
        .await
        .unwrap();
    (user, credential.temporary_password.clone())
}

pub async fn login(h: &Harness, user: &User, password: &str) -> Result<LoginOutcome> {
    h.service
        .login(
            &user.username,
            &client_password_hash(password, &user.client_salt),
            &user.client_salt,
            Some("198.51.100.4".to_string()),
        )
        .await
}

/// Log in a user without MFA
pub async fn signed_in(h: &Harness, user: &User, password: &str) -> AuthenticatedLogin {
    match login(h, user, password).await.unwrap() {
        LoginOutcome::Authenticated(login) => login,
        LoginOutcome::MfaRequired { .. } => panic!("unexpected MFA step"),
    }
}

pub async fn events_of(h: &Harness, event_type: &str) -> Vec<AuditEvent> {
    h.audit
        .query(&AuditFilter {
            event_type: Some(event_type.to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
}
