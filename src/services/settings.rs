use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::{opt_text, positional, text, Database};
use crate::error::{AppError, AppResult};
use crate::models::CredentialSettings;

/// OAuth client registrations edited by operators.
#[derive(Clone)]
pub struct CredentialSettingsStore {
    db: Database,
}

impl CredentialSettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, provider: &str) -> AppResult<Option<CredentialSettings>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT provider, client_id, client_secret, auth_url, token_url, scope
                FROM oauth_credential_settings
                WHERE provider = ?
                "#,
                [provider],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(CredentialSettings::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Last write wins per provider.
    pub async fn save(&self, credentials: &[CredentialSettings]) -> AppResult<usize> {
        let now = Utc::now().timestamp();
        let conn = self.db.pool();
        let conn = conn.lock().await;

        for cred in credentials {
            conn.execute(
                r#"
                INSERT INTO oauth_credential_settings (provider, client_id, client_secret, auth_url, token_url, scope, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (provider) DO UPDATE SET
                    client_id = excluded.client_id,
                    client_secret = excluded.client_secret,
                    auth_url = excluded.auth_url,
                    token_url = excluded.token_url,
                    scope = excluded.scope,
                    updated_at = excluded.updated_at
                "#,
                positional(vec![
                    text(&cred.provider),
                    opt_text(cred.client_id.as_deref()),
                    opt_text(cred.client_secret.as_deref()),
                    opt_text(cred.auth_url.as_deref()),
                    opt_text(cred.token_url.as_deref()),
                    opt_text(cred.scope.as_deref()),
                    libsql::Value::Integer(now),
                ]),
            )
            .await
            .map_err(|e| {
                error!("Failed to save credentials for {}: {}", cred.provider, e);
                AppError::Database(e.to_string())
            })?;
        }

        info!("Saved OAuth credentials for {} provider(s)", credentials.len());
        Ok(credentials.len())
    }
}

/// Catalog lookups and the per-user "connected" flag for apps.
#[derive(Clone)]
pub struct AppSettingsStore {
    db: Database,
}

impl AppSettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// First catalog app authenticated through `provider`.
    pub async fn find_app_for_provider(&self, provider: &str) -> AppResult<Option<String>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT name FROM app_catalog WHERE oauth_provider = ? AND is_active = 1 ORDER BY name LIMIT 1",
                [provider],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    /// Enable the app for the user, creating the settings row on first connect.
    pub async fn mark_connected(&self, user_id: &str, app_name: &str, provider: &str) -> AppResult<()> {
        let now = Utc::now();
        let settings = json!({
            "connected_at": now.to_rfc3339(),
            "provider": provider,
        });

        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO user_integration_settings (id, user_id, app_name, enabled, settings, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT (user_id, app_name) DO UPDATE SET
                enabled = 1,
                updated_at = excluded.updated_at
            "#,
            positional(vec![
                text(&Uuid::new_v4().to_string()),
                text(user_id),
                text(app_name),
                text(&settings.to_string()),
                libsql::Value::Integer(now.timestamp()),
                libsql::Value::Integer(now.timestamp()),
            ]),
        )
        .await?;

        debug!("Marked {} connected for user {}", app_name, user_id);
        Ok(())
    }

    pub async fn is_connected(&self, user_id: &str, app_name: &str) -> AppResult<bool> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT enabled FROM user_integration_settings WHERE user_id = ? AND app_name = ?",
                [user_id, app_name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? == 1),
            None => Ok(false),
        }
    }
}
