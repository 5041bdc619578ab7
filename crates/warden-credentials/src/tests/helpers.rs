//! Test helpers and mocks for credential service tests.

use crate::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use warden_audit::AuditService;
use warden_crypto::{client_password_hash, ManualClock, SlowHashParams};
use warden_identity::{CreateUserRequest, User, UserDirectory, UserDirectoryService};
use warden_policy::Role;
use warden_storage::RocksDbStorage;

pub const START: u64 = 1_705_320_000;

/// Counts revocation requests
#[derive(Default)]
pub struct MockSessionRevoker {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SessionRevoker for MockSessionRevoker {
    async fn revoke_all_for_user(&self, _user_id: Uuid, _reason: &str) -> Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }
}

impl MockSessionRevoker {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Captures reset tokens instead of delivering them
#[derive(Default)]
pub struct CapturingNotifier {
    pub tokens: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl CredentialNotifier for CapturingNotifier {
    async fn password_reset_requested(&self, user: &User, raw_token: &str, _expires_at: u64) -> Result<()> {
        self.tokens
            .lock()
            .unwrap()
            .push((user.user_id, raw_token.to_string()));
        Ok(())
    }
}

impl CapturingNotifier {
    pub fn last(&self) -> Option<String> {
        self.tokens.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

pub type TestDirectory = UserDirectoryService<RocksDbStorage>;
pub type TestAudit = AuditService<RocksDbStorage>;
pub type TestCredentialService = CredentialService<RocksDbStorage, TestDirectory, TestAudit>;

pub struct Harness {
    pub service: TestCredentialService,
    pub directory: Arc<TestDirectory>,
    pub audit: Arc<TestAudit>,
    pub revoker: Arc<MockSessionRevoker>,
    pub notifier: Arc<CapturingNotifier>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    let storage = Arc::new(RocksDbStorage::open_test().unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let directory = Arc::new(UserDirectoryService::new(Arc::clone(&storage), clock.clone()));
    let audit = Arc::new(AuditService::new(Arc::clone(&storage), clock.clone()));
    let revoker = Arc::new(MockSessionRevoker::default());
    let notifier = Arc::new(CapturingNotifier::default());

    let config = CredentialConfig::new(&[9u8; 32])
        .unwrap()
        .with_slow_hash(SlowHashParams::minimal());
    let service = CredentialService::new(
        storage,
        Arc::clone(&directory),
        Arc::clone(&audit),
        revoker.clone(),
        clock.clone(),
        config,
    )
    .with_notifier(notifier.clone());

    Harness {
        service,
        directory,
        audit,
        revoker,
        notifier,
        clock,
    }
}

pub async fn create_user(h: &Harness, username: &str, role: Role) -> User {
    h.directory
        .create_user(CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            role,
            created_by: None,
        })
        .await
        .unwrap()
}

/// Provision and retrieve a temporary password
pub async fn temporary_password(h: &Harness, user: &User) -> String {
    let issued = h
        .service
        .provision_temporary_credential(user.user_id, None, None)
        .await
        .unwrap();
    let credential = h
        .service
        .retrieve_credential(&issued.retrieval_token, None)
        .await
        .unwrap();
    credential.temporary_password.clone()
}

pub fn new_password(user: &User, password: &str) -> NewPassword {
    NewPassword {
        client_hash: client_password_hash(password, &user.client_salt),
        characteristics: PasswordCharacteristics::of(password),
    }
}

pub async fn login(h: &Harness, user: &User, password: &str) -> Result<AuthOutcome> {
    h.service
        .authenticate(
            &user.username,
            &client_password_hash(password, &user.client_salt),
            &user.client_salt,
            Some("203.0.113.7".to_string()),
        )
        .await
}
