use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use warden_audit::{events, AuditRecorder, AuditService, NewEvent, Severity};
use warden_credentials::{CredentialConfig, CredentialService, IssuedCredential, SessionRevoker};
use warden_crypto::{Clock, SystemClock};
use warden_deletion::{DeletionConfig, DeletionService};
use warden_identity::{CreateUserRequest, UserDirectory, UserDirectoryService};
use warden_policy::{CsrfGuard, EphemeralStore, InMemoryStore, RateLimiter, Role};
use warden_roles::RoleService;
use warden_sessions::{SessionConfig, SessionRegistry, SessionService};
use warden_storage::RocksDbStorage;

use crate::config::Config;

pub type Directory = UserDirectoryService<RocksDbStorage>;
pub type Audit = AuditService<RocksDbStorage>;
pub type Credentials = CredentialService<RocksDbStorage, Directory, Audit>;
pub type Sessions = SessionService<RocksDbStorage, Directory, Audit>;
pub type Roles = RoleService<RocksDbStorage, Directory, Audit>;
pub type Deletions = DeletionService<RocksDbStorage, Directory, Audit>;

/// Application state shared across all handlers
pub struct AppState {
    pub config: Config,
    pub storage: Arc<RocksDbStorage>,
    pub clock: Arc<dyn Clock>,
    pub directory: Arc<Directory>,
    pub audit: Arc<Audit>,
    pub credentials: Arc<Credentials>,
    pub sessions: Arc<Sessions>,
    pub roles: Arc<Roles>,
    pub deletions: Arc<Deletions>,
    pub limiter: Arc<RateLimiter<dyn EphemeralStore>>,
    pub csrf: Arc<CsrfGuard<dyn EphemeralStore>>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Arc::new(RocksDbStorage::open(&config.database_path)?);
        Self::assemble(config, storage, Arc::new(SystemClock))
    }

    /// Wire every service over an already opened store
    pub fn assemble(config: Config, storage: Arc<RocksDbStorage>, clock: Arc<dyn Clock>) -> Result<Self> {
        let directory = Arc::new(UserDirectoryService::new(Arc::clone(&storage), clock.clone()));
        let audit = Arc::new(AuditService::new(Arc::clone(&storage), clock.clone()));
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&storage),
            Arc::clone(&audit),
            clock.clone(),
        ));

        let revoker: Arc<dyn SessionRevoker> = registry.clone();
        let credentials = Arc::new(CredentialService::new(
            Arc::clone(&storage),
            Arc::clone(&directory),
            Arc::clone(&audit),
            revoker,
            clock.clone(),
            CredentialConfig::new(&config.service_master_key)?.with_slow_hash(config.slow_hash),
        ));

        let ephemeral: Arc<dyn EphemeralStore> = Arc::new(InMemoryStore::new());
        let limiter: Arc<RateLimiter<dyn EphemeralStore>> =
            Arc::new(RateLimiter::new(Arc::clone(&ephemeral)));
        let csrf: Arc<CsrfGuard<dyn EphemeralStore>> = Arc::new(CsrfGuard::new(ephemeral));

        let mut session_config = SessionConfig::new(&config.jwt_secret, &config.service_master_key);
        session_config.access_token_ttl = config.access_token_ttl;
        session_config.refresh_token_ttl = config.refresh_token_ttl;
        session_config.pending_mfa_ttl = config.mfa_pending_ttl;

        let sessions = Arc::new(SessionService::new(
            Arc::clone(&storage),
            Arc::clone(&directory),
            Arc::clone(&audit),
            Arc::clone(&credentials),
            registry,
            Arc::clone(&limiter),
            clock.clone(),
            session_config,
        ));

        let roles = Arc::new(RoleService::new(
            Arc::clone(&storage),
            Arc::clone(&directory),
            Arc::clone(&audit),
            clock.clone(),
        ));

        let deletions = Arc::new(DeletionService::new(
            Arc::clone(&storage),
            Arc::clone(&directory),
            Arc::clone(&audit),
            Arc::clone(&credentials),
            Arc::clone(&sessions),
            Arc::clone(&roles),
            clock.clone(),
            DeletionConfig::new(config.worker_id.clone()),
        ));

        Ok(AppState {
            config,
            storage,
            clock,
            directory,
            audit,
            credentials,
            sessions,
            roles,
            deletions,
            limiter,
            csrf,
        })
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Put the effective non-secret settings on the audit chain
    pub async fn record_config_loaded(&self) -> Result<()> {
        let config = &self.config;
        let proxies: Vec<String> = config.trusted_proxies.iter().map(|ip| ip.to_string()).collect();
        self.audit
            .record(
                NewEvent::new(events::CONFIG_LOADED, Severity::Info).details(serde_json::json!({
                    "bind_address": config.bind_address.to_string(),
                    "database_path": config.database_path.display().to_string(),
                    "access_token_ttl": config.access_token_ttl,
                    "refresh_token_ttl": config.refresh_token_ttl,
                    "mfa_pending_ttl": config.mfa_pending_ttl,
                    "slow_hash_memory_kib": config.slow_hash.memory_kib,
                    "slow_hash_time_cost": config.slow_hash.time_cost,
                    "trusted_proxies": proxies,
                    "sweep_interval_secs": config.sweep_interval.as_secs(),
                    "detection_interval_secs": config.detection_interval.as_secs(),
                    "bootstrap_admin": config.bootstrap_admin.is_some(),
                    "worker_id": config.worker_id,
                })),
            )
            .await?;
        Ok(())
    }

    /// Create the configured site administrator if no account holds its name.
    ///
    /// Returns the retrieval token for the new account's temporary password.
    pub async fn bootstrap_admin(&self) -> Result<Option<IssuedCredential>> {
        let Some(admin) = &self.config.bootstrap_admin else {
            return Ok(None);
        };
        if self.directory.find_by_username(&admin.username).await?.is_some() {
            return Ok(None);
        }

        let user = self
            .directory
            .create_user(CreateUserRequest {
                username: admin.username.clone(),
                email: admin.email.clone(),
                role: Role::SiteAdmin,
                created_by: None,
            })
            .await?;
        self.audit
            .record(
                NewEvent::new(events::USER_CREATED, Severity::Warning)
                    .target(user.user_id)
                    .details(serde_json::json!({
                        "username": user.username,
                        "role": Role::SiteAdmin.as_str(),
                        "bootstrap": true,
                    })),
            )
            .await?;

        let issued = self
            .credentials
            .provision_temporary_credential(user.user_id, None, None)
            .await?;
        warn!(user_id = %user.user_id, "Bootstrap site administrator created");
        info!(expires_at = issued.expires_at, "Bootstrap credential awaiting retrieval");
        Ok(Some(issued))
    }
}
