//! CSRF token issue and validation.

use crate::errors::Result;
use crate::store::EphemeralStore;
use std::sync::Arc;
use warden_crypto::{constant_time_compare, generate_token, sha256};

/// CSRF token lifetime
pub const CSRF_TOKEN_TTL_SECONDS: u64 = 60 * 60;

/// Issues CSRF tokens and checks them on state-changing requests
///
/// Only a SHA-256 digest of each token is kept in the store.
pub struct CsrfGuard<E: EphemeralStore + ?Sized> {
    store: Arc<E>,
    ttl_seconds: u64,
}

impl<E: EphemeralStore + ?Sized> CsrfGuard<E> {
    pub fn new(store: Arc<E>) -> Self {
        Self {
            store,
            ttl_seconds: CSRF_TOKEN_TTL_SECONDS,
        }
    }

    /// Issue a fresh token
    pub async fn issue(&self, now: u64) -> Result<String> {
        let token = generate_token()?;
        let digest = hex::encode(sha256(token.as_bytes()));
        self.store
            .set(&Self::key(&digest), digest.clone(), self.ttl_seconds, now)
            .await?;
        Ok(token)
    }

    /// True if `token` was issued here and has not expired
    pub async fn validate(&self, token: &str, now: u64) -> Result<bool> {
        if token.is_empty() {
            return Ok(false);
        }
        let digest = hex::encode(sha256(token.as_bytes()));
        let stored = self.store.get(&Self::key(&digest), now).await?;
        Ok(stored
            .map(|s| constant_time_compare(s.as_bytes(), digest.as_bytes()))
            .unwrap_or(false))
    }

    fn key(digest: &str) -> String {
        format!("csrf:{}", digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_issue_and_validate() {
        let guard = CsrfGuard::new(Arc::new(InMemoryStore::new()));
        let token = guard.issue(1000).await.unwrap();

        assert!(guard.validate(&token, 1001).await.unwrap());
        assert!(guard.validate(&token, 1002).await.unwrap());
        assert!(!guard.validate("forged", 1001).await.unwrap());
        assert!(!guard.validate("", 1001).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_expires() {
        let guard = CsrfGuard::new(Arc::new(InMemoryStore::new()));
        let token = guard.issue(0).await.unwrap();
        assert!(!guard
            .validate(&token, CSRF_TOKEN_TTL_SECONDS)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_token_flood_leaves_limits_intact() {
        use crate::errors::PolicyError;
        use crate::rate_limit::{RateLimiter, RateRule};

        let store = Arc::new(InMemoryStore::with_value_capacity(50));
        let guard = CsrfGuard::new(Arc::clone(&store));
        let limiter = RateLimiter::new(Arc::clone(&store));

        for _ in 0..50 {
            guard.issue(0).await.unwrap();
        }
        assert!(matches!(guard.issue(0).await, Err(PolicyError::StoreFull(_))));

        let mut allowed = 0;
        for _ in 0..10 {
            if limiter.check(&RateRule::LOGIN, "10.0.0.1", 1).await.is_ok() {
                allowed += 1;
            }
            let _ = guard.issue(1).await;
        }
        assert_eq!(allowed, RateRule::LOGIN.max_attempts);

        for _ in 0..RateRule::MFA_VERIFY.max_attempts {
            limiter.record_failure(&RateRule::MFA_VERIFY, "pending", 2).await.unwrap();
            let _ = guard.issue(2).await;
        }
        assert!(limiter
            .ensure_not_locked(&RateRule::MFA_VERIFY, "pending", 3)
            .await
            .is_err());
    }
}
