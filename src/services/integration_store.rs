use chrono::Utc;
use tracing::error;

use crate::db::{opt_int, opt_real, opt_text, positional, text, Database};
use crate::error::{AppError, AppResult};
use crate::models::{Integration, IntegrationLog, LogStatus};

const INTEGRATION_COLUMNS: &str = "id, user_id, flow_name, source_app, target_app, config, workflow_id, status, last_run, error_message, created_at, updated_at";

#[derive(Clone)]
pub struct IntegrationStore {
    db: Database,
}

impl IntegrationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert(&self, integration: &Integration) -> AppResult<()> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO integration ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                INTEGRATION_COLUMNS
            ),
            positional(vec![
                text(&integration.id),
                text(&integration.user_id),
                text(&integration.flow_name),
                text(&integration.source_app),
                text(&integration.target_app),
                text(&integration.config),
                opt_text(integration.workflow_id.as_deref()),
                text(integration.status.as_str()),
                opt_int(integration.last_run),
                opt_text(integration.error_message.as_deref()),
                libsql::Value::Integer(integration.created_at),
                libsql::Value::Integer(integration.updated_at),
            ]),
        )
        .await
        .map_err(|e| {
            error!("Failed to insert integration: {}", e);
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    /// Persist every mutable field and bump `updated_at`.
    pub async fn save(&self, integration: &mut Integration) -> AppResult<()> {
        integration.updated_at = Utc::now().timestamp();

        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            UPDATE integration
            SET flow_name = ?, config = ?, workflow_id = ?, status = ?, last_run = ?,
                error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
            positional(vec![
                text(&integration.flow_name),
                text(&integration.config),
                opt_text(integration.workflow_id.as_deref()),
                text(integration.status.as_str()),
                opt_int(integration.last_run),
                opt_text(integration.error_message.as_deref()),
                libsql::Value::Integer(integration.updated_at),
                text(&integration.id),
            ]),
        )
        .await
        .map_err(|e| {
            error!("Failed to update integration {}: {}", integration.id, e);
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> AppResult<Option<Integration>> {
        self.query_one(
            &format!("SELECT {} FROM integration WHERE id = ?", INTEGRATION_COLUMNS),
            id,
        )
        .await
    }

    pub async fn find_by_workflow_id(&self, workflow_id: &str) -> AppResult<Option<Integration>> {
        self.query_one(
            &format!(
                "SELECT {} FROM integration WHERE workflow_id = ? ORDER BY created_at LIMIT 1",
                INTEGRATION_COLUMNS
            ),
            workflow_id,
        )
        .await
    }

    async fn query_one(&self, sql: &str, key: &str) -> AppResult<Option<Integration>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn.query(sql, [key]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Integration::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Most recently modified first.
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Integration>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM integration WHERE user_id = ? ORDER BY updated_at DESC, created_at DESC",
                    INTEGRATION_COLUMNS
                ),
                [user_id],
            )
            .await?;

        let mut integrations = Vec::new();
        while let Some(row) = rows.next().await? {
            integrations.push(Integration::from_row(&row)?);
        }
        Ok(integrations)
    }

    /// Removes the record and its log history.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute("DELETE FROM integration_log WHERE integration_id = ?", [id])
            .await?;
        conn.execute("DELETE FROM integration WHERE id = ?", [id])
            .await?;
        Ok(())
    }

    pub async fn count_active(&self, user_id: &str) -> AppResult<i64> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM integration WHERE user_id = ? AND status = 'Active'",
                [user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    pub async fn workflow_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT workflow_id FROM integration WHERE user_id = ? AND workflow_id IS NOT NULL AND workflow_id != '' ORDER BY created_at",
                [user_id],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    pub async fn append_log(
        &self,
        integration_id: &str,
        status: LogStatus,
        message: &str,
        execution_time: Option<f64>,
    ) -> AppResult<()> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO integration_log (integration_id, status, message, execution_time, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
            positional(vec![
                text(integration_id),
                text(status.as_str()),
                text(message),
                opt_real(execution_time),
                libsql::Value::Integer(Utc::now().timestamp()),
            ]),
        )
        .await
        .map_err(|e| {
            error!("Failed to write integration log: {}", e);
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    /// Newest first, insertion order breaking timestamp ties.
    pub async fn recent_logs(&self, integration_id: &str, limit: i64) -> AppResult<Vec<IntegrationLog>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT id, integration_id, status, message, execution_time, timestamp
                FROM integration_log
                WHERE integration_id = ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
                "#,
                positional(vec![text(integration_id), libsql::Value::Integer(limit)]),
            )
            .await?;

        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            logs.push(IntegrationLog::from_row(&row)?);
        }
        Ok(logs)
    }
}
