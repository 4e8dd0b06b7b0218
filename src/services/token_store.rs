use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::{opt_int, opt_text, positional, text, Database};
use crate::error::{AppError, AppResult};
use crate::models::{OAuthToken, TokenResponse};

/// Per-user, per-provider OAuth credentials.
#[derive(Clone)]
pub struct TokenStore {
    db: Database,
}

const TOKEN_COLUMNS: &str = "id, user_id, provider, access_token, refresh_token, expires_at, raw_payload, created_at, updated_at";

impl TokenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: &str, provider: &str) -> AppResult<Option<OAuthToken>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM oauth_token WHERE user_id = ? AND provider = ?",
                    TOKEN_COLUMNS
                ),
                [user_id, provider],
            )
            .await
            .map_err(|e| {
                error!("Failed to fetch OAuth token: {}", e);
                AppError::Database(e.to_string())
            })?;

        match rows.next().await? {
            Some(row) => Ok(Some(OAuthToken::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, user_id: &str, provider: &str) -> AppResult<bool> {
        Ok(self.get(user_id, provider).await?.is_some())
    }

    /// Insert, or overwrite tokens, expiry and payload of the existing row.
    pub async fn upsert(
        &self,
        user_id: &str,
        provider: &str,
        tokens: &TokenResponse,
    ) -> AppResult<OAuthToken> {
        let now = Utc::now().timestamp();
        let id = Uuid::new_v4().to_string();

        {
            let conn = self.db.pool();
            let conn = conn.lock().await;
            conn.execute(
                r#"
                INSERT INTO oauth_token (id, user_id, provider, access_token, refresh_token, expires_at, raw_payload, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (user_id, provider) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    raw_payload = excluded.raw_payload,
                    updated_at = excluded.updated_at
                "#,
                positional(vec![
                    text(&id),
                    text(user_id),
                    text(provider),
                    text(&tokens.access_token),
                    opt_text(tokens.refresh_token.as_deref()),
                    opt_int(tokens.expires_at(now)),
                    text(&tokens.raw.to_string()),
                    libsql::Value::Integer(now),
                    libsql::Value::Integer(now),
                ]),
            )
            .await
            .map_err(|e| {
                error!("Failed to store OAuth token: {}", e);
                AppError::Database(e.to_string())
            })?;
        }

        info!("Stored {} token for user {}", provider, user_id);

        self.get(user_id, provider)
            .await?
            .ok_or_else(|| AppError::Internal("Token vanished after upsert".to_string()))
    }

    /// Apply a refresh grant; an absent refresh token keeps the stored one.
    pub async fn apply_refresh(&self, token: &OAuthToken, tokens: &TokenResponse) -> AppResult<()> {
        let now = Utc::now().timestamp();
        let refresh = tokens
            .refresh_token
            .as_deref()
            .or(token.refresh_token.as_deref());

        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            UPDATE oauth_token
            SET access_token = ?, refresh_token = ?, expires_at = ?, raw_payload = ?, updated_at = ?
            WHERE id = ?
            "#,
            positional(vec![
                text(&tokens.access_token),
                opt_text(refresh),
                opt_int(tokens.expires_at(now)),
                text(&tokens.raw.to_string()),
                libsql::Value::Integer(now),
                text(&token.id),
            ]),
        )
        .await
        .map_err(|e| {
            error!("Failed to update OAuth token: {}", e);
            AppError::Database(e.to_string())
        })?;

        Ok(())
    }

    /// Number of distinct providers the user has connected.
    pub async fn count_providers(&self, user_id: &str) -> AppResult<i64> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(DISTINCT provider) FROM oauth_token WHERE user_id = ?",
                [user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }
}
