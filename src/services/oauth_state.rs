use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::cache::KvCache;
use crate::error::{AppError, AppResult};

/// Seconds an authorization attempt stays redeemable.
pub const STATE_TTL_SECONDS: u64 = 600;

/// Pending authorization, keyed by its random state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub provider: String,
    pub user: String,
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub issued_at: i64,
}

#[derive(Clone)]
pub struct OAuthStateStore {
    cache: Arc<dyn KvCache>,
}

impl OAuthStateStore {
    pub fn new(cache: Arc<dyn KvCache>) -> Self {
        Self { cache }
    }

    fn key(state: &str) -> String {
        format!("oauth_state:{}", state)
    }

    /// 32 random bytes, URL-safe base64.
    pub fn generate_state() -> String {
        use base64::Engine;
        use rand::Rng;
        let mut rng = rand::rng();
        let random_bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
    }

    /// Store a new pending authorization and return its state token.
    pub async fn issue(&self, entry: &OAuthState) -> AppResult<String> {
        self.issue_with_ttl(entry, STATE_TTL_SECONDS).await
    }

    pub async fn issue_with_ttl(&self, entry: &OAuthState, ttl_seconds: u64) -> AppResult<String> {
        let state = Self::generate_state();
        let entry = OAuthState {
            issued_at: Utc::now().timestamp(),
            ..entry.clone()
        };
        self.write(&state, &entry, ttl_seconds).await?;
        debug!("Issued OAuth state for provider {}", entry.provider);
        Ok(state)
    }

    async fn write(&self, state: &str, entry: &OAuthState, ttl_seconds: u64) -> AppResult<()> {
        let value = serde_json::to_string(entry)
            .map_err(|e| AppError::Internal(format!("Failed to encode OAuth state: {}", e)))?;
        self.cache
            .set_with_ttl(&Self::key(state), &value, ttl_seconds)
            .await
    }

    #[cfg(test)]
    pub async fn get(&self, state: &str) -> AppResult<Option<OAuthState>> {
        let raw = self.cache.get(&Self::key(state)).await?;
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Claim a pending authorization. Expired, forged and already-claimed
    /// states are indistinguishable here.
    pub async fn take(&self, state: &str) -> AppResult<Option<OAuthState>> {
        let raw = self.cache.take(&Self::key(state)).await?;
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Put a claimed state back for whatever remains of its lifetime.
    pub async fn restore(&self, state: &str, entry: &OAuthState) -> AppResult<()> {
        let age = Utc::now().timestamp().saturating_sub(entry.issued_at).max(0) as u64;
        match STATE_TTL_SECONDS.checked_sub(age) {
            Some(remaining) if remaining > 0 => self.write(state, entry, remaining).await,
            _ => Ok(()),
        }
    }
}
