//! Single-use tokens stored by digest.

use crate::{errors::*, types::*};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use warden_crypto::{generate_token, token_hash, Clock, SealedSecret};
use warden_storage::{Batch, BatchExt, Storage, CF_PASSWORD_TOKENS};

/// Issues and consumes single-use tokens.
///
/// Validation and invalidation happen under the token's row lock, so of two
/// concurrent consumers exactly one succeeds.
pub struct TokenVault<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Storage> TokenVault<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Fresh raw token; `TokenGeneration` when entropy is unavailable
    pub fn generate_raw() -> Result<String> {
        generate_token().map_err(|e| CredentialError::TokenGeneration(e.to_string()))
    }

    /// Build the stored form of `raw_token`
    pub fn new_record(
        raw_token: &str,
        user_id: Uuid,
        token_type: TokenType,
        ttl_seconds: u64,
        payload: Option<SealedSecret>,
        now: u64,
    ) -> TokenRecord {
        TokenRecord {
            token_hash: token_hash(raw_token),
            user_id,
            token_type,
            created_at: now,
            expires_at: now + ttl_seconds,
            used_at: None,
            payload,
        }
    }

    /// Add a token to a batch that commits together with other state
    pub fn stage(batch: &mut dyn Batch, record: &TokenRecord) -> Result<()> {
        batch.put(CF_PASSWORD_TOKENS, &record.token_hash, record)?;
        Ok(())
    }

    /// Issue a payload-less token and persist it
    pub async fn issue(
        &self,
        user_id: Uuid,
        token_type: TokenType,
        ttl_seconds: u64,
    ) -> Result<(String, TokenRecord)> {
        let raw = Self::generate_raw()?;
        let record = Self::new_record(&raw, user_id, token_type, ttl_seconds, None, self.clock.now());
        self.storage
            .put(CF_PASSWORD_TOKENS, &record.token_hash, &record)
            .await?;

        debug!(user_id = %user_id, token_type = token_type.as_str(), "Token issued");
        Ok((raw, record))
    }

    /// Validate without consuming
    pub async fn peek(&self, raw_token: &str, expected: TokenType) -> Result<TokenRecord> {
        let digest = token_hash(raw_token);
        let record: TokenRecord = self
            .storage
            .get(CF_PASSWORD_TOKENS, &digest)
            .await?
            .ok_or(CredentialError::InvalidToken)?;

        if record.token_type != expected || !record.is_live(self.clock.now()) {
            return Err(CredentialError::InvalidToken);
        }
        Ok(record)
    }

    /// Validate and mark used in one step
    pub async fn consume(&self, raw_token: &str, expected: TokenType) -> Result<TokenRecord> {
        let digest = token_hash(raw_token);
        let _guard = self
            .storage
            .lock(&format!("token:{}", hex::encode(digest)))
            .await;

        let mut record = self.peek(raw_token, expected).await?;
        record.used_at = Some(self.clock.now());
        self.storage
            .put(CF_PASSWORD_TOKENS, &digest, &record)
            .await?;

        debug!(
            user_id = %record.user_id,
            token_type = expected.as_str(),
            "Token consumed"
        );
        Ok(record)
    }

    /// Consume a token only if it belongs to `user_id`
    pub async fn consume_for(
        &self,
        raw_token: &str,
        expected: TokenType,
        user_id: Uuid,
    ) -> Result<TokenRecord> {
        let digest = token_hash(raw_token);
        let _guard = self
            .storage
            .lock(&format!("token:{}", hex::encode(digest)))
            .await;

        let mut record = self.peek(raw_token, expected).await?;
        if record.user_id != user_id {
            return Err(CredentialError::InvalidToken);
        }
        record.used_at = Some(self.clock.now());
        self.storage
            .put(CF_PASSWORD_TOKENS, &digest, &record)
            .await?;
        Ok(record)
    }

    /// Mark every live token of `token_type` for `user_id` as used
    pub async fn invalidate_for_user(&self, user_id: Uuid, token_type: TokenType) -> Result<usize> {
        let mut batch = self.storage.batch();
        let count = self
            .stage_invalidate_for_user(batch.as_mut(), user_id, token_type)
            .await?;
        batch.commit().await?;
        Ok(count)
    }

    /// Stage the invalidation into a caller's batch. Callers issuing a
    /// replacement token hold the user's credential row.
    pub async fn stage_invalidate_for_user(
        &self,
        batch: &mut dyn Batch,
        user_id: Uuid,
        token_type: TokenType,
    ) -> Result<usize> {
        let now = self.clock.now();
        let mut count = 0;
        for (_, mut record) in self
            .storage
            .scan_all::<TokenRecord>(CF_PASSWORD_TOKENS)
            .await?
        {
            if record.user_id == user_id && record.token_type == token_type && record.is_live(now) {
                record.used_at = Some(now);
                batch.put(CF_PASSWORD_TOKENS, &record.token_hash, &record)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete every token that belongs to `user_id`
    pub async fn purge_user(&self, user_id: Uuid) -> Result<usize> {
        let mut batch = self.storage.batch();
        let mut removed = 0;
        for (_, record) in self
            .storage
            .scan_all::<TokenRecord>(CF_PASSWORD_TOKENS)
            .await?
        {
            if record.user_id == user_id {
                batch.delete(CF_PASSWORD_TOKENS, &record.token_hash)?;
                removed += 1;
            }
        }
        batch.commit().await?;
        Ok(removed)
    }

    /// Delete tokens that expired or were used more than `retain_seconds` ago
    pub async fn purge_stale(&self, retain_seconds: u64) -> Result<usize> {
        let cutoff = self.clock.now().saturating_sub(retain_seconds);
        let mut batch = self.storage.batch();
        let mut removed = 0;
        for (_, record) in self
            .storage
            .scan_all::<TokenRecord>(CF_PASSWORD_TOKENS)
            .await?
        {
            let retired_at = record.used_at.unwrap_or(record.expires_at);
            let retired = record.used_at.is_some() || record.expires_at <= self.clock.now();
            if retired && retired_at <= cutoff {
                batch.delete(CF_PASSWORD_TOKENS, &record.token_hash)?;
                removed += 1;
            }
        }
        batch.commit().await?;
        Ok(removed)
    }
}
