use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use warden_crypto::{hkdf_derive_32, SlowHashParams, DAY, MINUTE};

/// Operator account created on first start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
}

/// Server configuration
#[derive(Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Path to RocksDB database
    pub database_path: PathBuf,

    /// Service master key (hex-encoded 32 bytes)
    pub service_master_key: [u8; 32],

    /// HS256 signing secret for access tokens
    pub jwt_secret: Vec<u8>,

    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
    pub mfa_pending_ttl: u64,

    /// Argon2 cost for stored password hashes
    pub slow_hash: SlowHashParams,

    /// Proxies whose X-Forwarded-For header is believed
    pub trusted_proxies: Vec<IpAddr>,

    pub sweep_interval: Duration,
    pub detection_interval: Duration,

    pub bootstrap_admin: Option<BootstrapAdmin>,

    /// Identifies this process in deletion claims
    pub worker_id: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_address = var("BIND_ADDRESS", "127.0.0.1:8080")
            .parse()
            .context("BIND_ADDRESS must be host:port")?;

        let database_path = var("DATABASE_PATH", "./data/warden.db").into();

        let service_master_key = {
            let hex_key = lookup("SERVICE_MASTER_KEY")
                .context("SERVICE_MASTER_KEY environment variable required")?;
            let bytes = hex::decode(hex_key.trim()).context("SERVICE_MASTER_KEY must be hex")?;
            if bytes.len() != 32 {
                anyhow::bail!("SERVICE_MASTER_KEY must be 32 bytes (64 hex chars)");
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            key
        };

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => hkdf_derive_32(&service_master_key, b"warden:jwt:v1")?.to_vec(),
        };

        let access_token_ttl = parse(&lookup, "ACCESS_TOKEN_TTL_SECONDS", 15 * MINUTE)?;
        let refresh_token_ttl = parse(&lookup, "REFRESH_TOKEN_TTL_SECONDS", 7 * DAY)?;
        let mfa_pending_ttl = parse(&lookup, "MFA_PENDING_TTL_SECONDS", 5 * MINUTE)?;

        let defaults = SlowHashParams::default();
        let slow_hash = SlowHashParams {
            memory_kib: parse(&lookup, "ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            time_cost: parse(&lookup, "ARGON2_TIME_COST", defaults.time_cost)?,
            parallelism: defaults.parallelism,
        };

        let trusted_proxies = var("TRUSTED_PROXIES", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<IpAddr>()
                    .with_context(|| format!("TRUSTED_PROXIES entry is not an IP: {}", s))
            })
            .collect::<Result<Vec<_>>>()?;

        let sweep_interval = Duration::from_secs(parse(&lookup, "SWEEP_INTERVAL_SECONDS", 60)?);
        let detection_interval =
            Duration::from_secs(parse(&lookup, "DETECTION_INTERVAL_SECONDS", 60)?);
        if sweep_interval.is_zero() || detection_interval.is_zero() {
            anyhow::bail!("Job intervals must be at least one second");
        }

        let bootstrap_admin = match (
            lookup("BOOTSTRAP_ADMIN_USERNAME"),
            lookup("BOOTSTRAP_ADMIN_EMAIL"),
        ) {
            (Some(username), Some(email)) => Some(BootstrapAdmin { username, email }),
            (None, None) => None,
            _ => anyhow::bail!(
                "BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_EMAIL must be set together"
            ),
        };

        let worker_id = var("WORKER_ID", &format!("worker-{}", uuid::Uuid::new_v4()));

        Ok(Config {
            bind_address,
            database_path,
            service_master_key,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            mfa_pending_ttl,
            slow_hash,
            trusted_proxies,
            sweep_interval,
            detection_interval,
            bootstrap_admin,
            worker_id,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} is not a valid number", key)),
        None => Ok(default),
    }
}
