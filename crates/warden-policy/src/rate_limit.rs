//! Fixed-window rate limiting.

use crate::errors::{PolicyError, Result};
use crate::store::EphemeralStore;
use crate::types::RateLimit;
use std::sync::Arc;
use tracing::warn;

/// A named limit: at most `max_attempts` per `window_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub name: &'static str,
    pub max_attempts: u32,
    pub window_seconds: u64,
}

impl RateRule {
    /// Login attempts per IP
    pub const LOGIN: RateRule = RateRule {
        name: "login",
        max_attempts: 5,
        window_seconds: 15 * 60,
    };

    /// Password reset requests per email
    pub const PASSWORD_RESET: RateRule = RateRule {
        name: "password_reset",
        max_attempts: 3,
        window_seconds: 60 * 60,
    };

    /// Registrations per IP
    pub const REGISTRATION: RateRule = RateRule {
        name: "registration",
        max_attempts: 10,
        window_seconds: 60 * 60,
    };

    /// Failed MFA verifications per pending login
    pub const MFA_VERIFY: RateRule = RateRule {
        name: "mfa_verify",
        max_attempts: 5,
        window_seconds: 10 * 60,
    };

    /// All requests per IP
    pub const GLOBAL: RateRule = RateRule {
        name: "global",
        max_attempts: 300,
        window_seconds: 60,
    };

    fn key(&self, subject: &str) -> String {
        format!("rl:{}:{}", self.name, subject)
    }
}

/// Rate limiter for tracking attempts per identity/IP
///
/// Never blocks: an exhausted window fails immediately with
/// [`PolicyError::RateLimited`].
pub struct RateLimiter<E: EphemeralStore + ?Sized> {
    store: Arc<E>,
}

impl<E: EphemeralStore + ?Sized> RateLimiter<E> {
    pub fn new(store: Arc<E>) -> Self {
        Self { store }
    }

    /// Count one attempt against `rule` for `subject`
    pub async fn check(&self, rule: &RateRule, subject: &str, now: u64) -> Result<RateLimit> {
        let counter = self
            .store
            .increment(&rule.key(subject), rule.window_seconds, now)
            .await?;

        if counter.count > rule.max_attempts {
            let retry_after = counter.reset_at().saturating_sub(now).max(1);
            warn!(
                rule = rule.name,
                subject = subject,
                retry_after = retry_after,
                "Rate limit exceeded"
            );
            return Err(PolicyError::RateLimited {
                retry_after,
                remaining: 0,
            });
        }

        Ok(RateLimit {
            window_seconds: rule.window_seconds,
            max_attempts: rule.max_attempts,
            remaining: rule.max_attempts - counter.count,
            reset_at: counter.reset_at(),
        })
    }

    /// Record a failure without checking the limit
    pub async fn record_failure(&self, rule: &RateRule, subject: &str, now: u64) -> Result<()> {
        self.store
            .increment(&rule.key(subject), rule.window_seconds, now)
            .await?;
        Ok(())
    }

    /// Fail if recorded failures already reached the limit
    pub async fn ensure_not_locked(&self, rule: &RateRule, subject: &str, now: u64) -> Result<()> {
        if let Some(counter) = self.store.counter(&rule.key(subject), now).await? {
            if counter.count >= rule.max_attempts {
                return Err(PolicyError::RateLimited {
                    retry_after: counter.reset_at().saturating_sub(now).max(1),
                    remaining: 0,
                });
            }
        }
        Ok(())
    }

    /// Reset the window for `subject`
    pub async fn reset(&self, rule: &RateRule, subject: &str) -> Result<()> {
        self.store.remove(&rule.key(subject)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn limiter() -> RateLimiter<InMemoryStore> {
        RateLimiter::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_rate_limit_allow() {
        let limiter = limiter();
        let limit = limiter.check(&RateRule::LOGIN, "10.0.0.1", 1000).await.unwrap();
        assert_eq!(limit.remaining, 4);
        assert_eq!(limit.reset_at, 1000 + 900);
    }

    #[tokio::test]
    async fn test_sixth_login_is_limited_until_window_closes() {
        let limiter = limiter();
        for _ in 0..5 {
            limiter.check(&RateRule::LOGIN, "10.0.0.1", 1000).await.unwrap();
        }

        match limiter.check(&RateRule::LOGIN, "10.0.0.1", 1100).await {
            Err(PolicyError::RateLimited {
                retry_after,
                remaining,
            }) => {
                assert_eq!(retry_after, 800);
                assert_eq!(remaining, 0);
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }

        // Different subject is unaffected
        assert!(limiter.check(&RateRule::LOGIN, "10.0.0.2", 1100).await.is_ok());

        // Move past window
        let limit = limiter.check(&RateRule::LOGIN, "10.0.0.1", 1900).await.unwrap();
        assert_eq!(limit.remaining, 4);
    }

    #[tokio::test]
    async fn test_failure_lockout() {
        let limiter = limiter();
        let rule = RateRule::MFA_VERIFY;
        for _ in 0..4 {
            limiter.record_failure(&rule, "pending", 0).await.unwrap();
        }
        assert!(limiter.ensure_not_locked(&rule, "pending", 10).await.is_ok());

        limiter.record_failure(&rule, "pending", 10).await.unwrap();
        assert!(matches!(
            limiter.ensure_not_locked(&rule, "pending", 20).await,
            Err(PolicyError::RateLimited { .. })
        ));
        assert!(limiter.ensure_not_locked(&rule, "pending", 600).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset() {
        let limiter = limiter();
        let rule = RateRule::PASSWORD_RESET;
        for _ in 0..3 {
            limiter.check(&rule, "a@example.com", 0).await.unwrap();
        }
        assert!(limiter.check(&rule, "a@example.com", 0).await.is_err());

        limiter.reset(&rule, "a@example.com").await.unwrap();
        assert!(limiter.check(&rule, "a@example.com", 0).await.is_ok());
    }
}
