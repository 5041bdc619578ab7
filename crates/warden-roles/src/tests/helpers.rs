//! Test harness for role engine tests.

use crate::*;
use std::sync::Arc;
use warden_audit::{AuditEvent, AuditFilter, AuditService};
use warden_crypto::ManualClock;
use warden_identity::{CreateUserRequest, UserDirectory, UserDirectoryService};
use warden_policy::{Actor, Role};
use warden_storage::RocksDbStorage;

// 2024-01-15 12:00:00 UTC
pub const START: u64 = 1_705_320_000;

pub type TestDirectory = UserDirectoryService<RocksDbStorage>;
pub type TestAudit = AuditService<RocksDbStorage>;
pub type TestRoleService = RoleService<RocksDbStorage, TestDirectory, TestAudit>;

pub struct Harness {
    pub service: TestRoleService,
    pub directory: Arc<TestDirectory>,
    pub audit: Arc<TestAudit>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    let storage = Arc::new(RocksDbStorage::open_test().unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let directory = Arc::new(UserDirectoryService::new(Arc::clone(&storage), clock.clone()));
    let audit = Arc::new(AuditService::new(Arc::clone(&storage), clock.clone()));
    let service = RoleService::new(
        storage,
        Arc::clone(&directory),
        Arc::clone(&audit),
        clock.clone(),
    );
    Harness {
        service,
        directory,
        audit,
        clock,
    }
}

pub async fn create(h: &Harness, username: &str, role: Role) -> Actor {
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
    Actor {
        user_id: user.user_id,
        role,
    }
}

pub async fn role_of(h: &Harness, actor: &Actor) -> Role {
    h.directory.highest_role(actor.user_id).await.unwrap()
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
