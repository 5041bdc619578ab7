//! Test harness for deletion queue tests.

use crate::*;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use warden_audit::{AuditEvent, AuditFilter, AuditService};
use warden_credentials::{
    CredentialConfig, CredentialService, NewPassword, PasswordCharacteristics, SessionRevoker,
};
use warden_crypto::{client_password_hash, ManualClock, SlowHashParams};
use warden_identity::{CreateUserRequest, User, UserDirectory, UserDirectoryService};
use warden_policy::{Actor, EphemeralStore, InMemoryStore, RateLimiter, Role};
use warden_roles::RoleService;
use warden_sessions::{LoginOutcome, SessionConfig, SessionRegistry, SessionService};
use warden_storage::RocksDbStorage;

// 2024-01-15 12:00:00 UTC
pub const START: u64 = 1_705_320_000;

pub const PASSWORD: &str = "Correct-Horse-42";

pub type TestDirectory = UserDirectoryService<RocksDbStorage>;
pub type TestAudit = AuditService<RocksDbStorage>;
pub type TestCredentials = CredentialService<RocksDbStorage, TestDirectory, TestAudit>;
pub type TestSessions = SessionService<RocksDbStorage, TestDirectory, TestAudit>;
pub type TestRoles = RoleService<RocksDbStorage, TestDirectory, TestAudit>;
pub type TestDeletionService = DeletionService<RocksDbStorage, TestDirectory, TestAudit>;

/// Records notices instead of delivering them
#[derive(Default)]
pub struct CapturingNotifier {
    pub scheduled: Mutex<Vec<(uuid::Uuid, String)>>,
    pub reminders: Mutex<Vec<Reminder>>,
}

#[async_trait]
impl DeletionNotifier for CapturingNotifier {
    async fn deletion_scheduled(
        &self,
        user: &User,
        _request: &DeletionRequest,
        raw_token: &str,
    ) -> Result<()> {
        self.scheduled
            .lock()
            .unwrap()
            .push((user.user_id, raw_token.to_string()));
        Ok(())
    }

    async fn reminder_due(
        &self,
        _user: &User,
        _request: &DeletionRequest,
        reminder: Reminder,
    ) -> Result<()> {
        self.reminders.lock().unwrap().push(reminder);
        Ok(())
    }
}

pub struct Harness {
    pub service: TestDeletionService,
    pub storage: Arc<RocksDbStorage>,
    pub sessions: Arc<TestSessions>,
    pub roles: Arc<TestRoles>,
    pub credentials: Arc<TestCredentials>,
    pub directory: Arc<TestDirectory>,
    pub audit: Arc<TestAudit>,
    pub notifier: Arc<CapturingNotifier>,
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

    let master_key = [9u8; 32];
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
    let sessions = Arc::new(SessionService::new(
        Arc::clone(&storage),
        Arc::clone(&directory),
        Arc::clone(&audit),
        Arc::clone(&credentials),
        registry,
        Arc::new(RateLimiter::new(store)),
        clock.clone(),
        SessionConfig::new(b"deletion-test-secret", &master_key),
    ));

    let roles = Arc::new(RoleService::new(
        Arc::clone(&storage),
        Arc::clone(&directory),
        Arc::clone(&audit),
        clock.clone(),
    ));

    let notifier = Arc::new(CapturingNotifier::default());
    let service = DeletionService::new(
        Arc::clone(&storage),
        Arc::clone(&directory),
        Arc::clone(&audit),
        Arc::clone(&credentials),
        Arc::clone(&sessions),
        Arc::clone(&roles),
        clock.clone(),
        DeletionConfig::new("worker-test"),
    )
    .with_notifier(notifier.clone());

    Harness {
        service,
        storage,
        sessions,
        roles,
        credentials,
        directory,
        audit,
        notifier,
        clock,
    }
}

pub async fn create(h: &Harness, username: &str, role: Role) -> (User, Actor) {
    let user = h
        .directory
        .create_user(CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            role,
            created_by: None,
        })
        .await
        .unwrap();
    let actor = Actor {
        user_id: user.user_id,
        role,
    };
    (user, actor)
}

/// A user with a permanent password set to [`PASSWORD`]
pub async fn user_with_password(h: &Harness, username: &str) -> (User, Actor) {
    let (user, actor) = create(h, username, Role::User).await;
    let issued = h
        .credentials
        .provision_temporary_credential(user.user_id, None, None)
        .await
        .unwrap();
    let temporary = h
        .credentials
        .retrieve_credential(&issued.retrieval_token, None)
        .await
        .unwrap()
        .temporary_password
        .clone();
    h.credentials
        .change_password(
            user.user_id,
            &client_password_hash(&temporary, &user.client_salt),
            &NewPassword {
                client_hash: client_password_hash(PASSWORD, &user.client_salt),
                characteristics: PasswordCharacteristics::of(PASSWORD),
            },
            None,
        )
        .await
        .unwrap();
    (user, actor)
}

pub async fn login(h: &Harness, user: &User) -> warden_sessions::Result<LoginOutcome> {
    h.sessions
        .login(
            &user.username,
            &client_password_hash(PASSWORD, &user.client_salt),
            &user.client_salt,
            None,
        )
        .await
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
