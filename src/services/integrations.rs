//! User-facing integration operations: activation, inspection, lifecycle
//! changes, engine callbacks and dashboard statistics.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::{truncate_message, AppError, AppResult, MAX_MESSAGE_LEN};
use crate::models::{Integration, IntegrationStatus, LogStatus};
use crate::services::best_effort;
use crate::services::engine_client::EngineClient;
use crate::services::integration_store::IntegrationStore;
use crate::services::integration_sync::IntegrationSync;
use crate::services::registry;
use crate::services::token_store::TokenStore;

const RECENT_LOG_LIMIT: i64 = 10;

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateIntegration {
    #[validate(length(min = 1, max = 200))]
    pub flow_name: String,
    #[validate(length(min = 1, max = 64))]
    pub source_app: String,
    #[validate(length(min = 1, max = 64))]
    pub target_app: String,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct EditIntegration {
    #[validate(length(min = 1, max = 200))]
    pub flow_name: Option<String>,
    pub config: Option<Value>,
}

/// Execution report posted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    pub workflow_id: String,
    pub status: String,
    pub message: Option<String>,
    pub execution_time: Option<f64>,
}

impl WebhookPayload {
    /// Accepts JSON and form-decoded bodies alike, where every value may be a string.
    pub fn from_value(value: &Value) -> AppResult<Self> {
        let text = |key: &str| match value.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let workflow_id = text("workflow_id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("workflow_id is required".to_string()))?;

        let execution_time = match value.get("execution_time") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Ok(WebhookPayload {
            workflow_id,
            status: text("status").unwrap_or_default(),
            message: text("message"),
            execution_time,
        })
    }
}

#[derive(Clone)]
pub struct IntegrationService {
    store: IntegrationStore,
    sync: IntegrationSync,
    tokens: TokenStore,
    engine: Arc<EngineClient>,
}

impl IntegrationService {
    pub fn new(
        store: IntegrationStore,
        sync: IntegrationSync,
        tokens: TokenStore,
        engine: Arc<EngineClient>,
    ) -> Self {
        Self {
            store,
            sync,
            tokens,
            engine,
        }
    }

    /// Load an integration the caller owns.
    async fn owned(&self, user_id: &str, integration_id: &str) -> AppResult<Integration> {
        let integration = self
            .store
            .get(integration_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Integration {} not found", integration_id)))?;

        if integration.user_id != user_id {
            return Err(AppError::Permission("Not permitted".to_string()));
        }
        Ok(integration)
    }

    pub async fn activate(&self, user_id: &str, request: ActivateIntegration) -> AppResult<Value> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        for app in [&request.source_app, &request.target_app] {
            let provider = registry::provider_for_app(app);
            if !self.tokens.exists(user_id, provider).await? {
                return Ok(json!({
                    "success": false,
                    "error": format!(
                        "No authentication found for {}. Please connect your account first.",
                        app
                    )
                }));
            }
        }

        let mut integration = Integration::new(
            user_id,
            &request.flow_name,
            &request.source_app,
            &request.target_app,
            request.config.as_ref(),
        );
        self.store.insert(&integration).await?;
        self.store
            .append_log(
                &integration.id,
                LogStatus::Started,
                &format!("Integration {} activated successfully", integration.flow_name),
                None,
            )
            .await?;

        let workflow_id = self.sync.create(&mut integration).await?;

        info!(
            "Activated integration {} ({}) for user {}",
            integration.id, integration.flow_name, user_id
        );
        Ok(json!({
            "success": true,
            "integration_id": integration.id,
            "workflow_id": workflow_id,
            "status": integration.status,
            "message": "Integration activated successfully"
        }))
    }

    pub async fn status(&self, user_id: &str, integration_id: &str) -> AppResult<Value> {
        let integration = self.owned(user_id, integration_id).await?;
        let logs = self
            .store
            .recent_logs(&integration.id, RECENT_LOG_LIMIT)
            .await?;

        Ok(json!({
            "success": true,
            "integration": summary(&integration),
            "logs": logs
                .iter()
                .map(|log| json!({
                    "status": log.status,
                    "message": log.message,
                    "execution_time": log.execution_time,
                    "timestamp": log.timestamp
                }))
                .collect::<Vec<_>>()
        }))
    }

    pub async fn list(&self, user_id: &str) -> AppResult<Value> {
        let integrations = self.store.list_for_user(user_id).await?;
        Ok(json!({
            "success": true,
            "integrations": integrations.iter().map(summary).collect::<Vec<_>>()
        }))
    }

    /// Deactivate the remote workflow, then pause locally.
    pub async fn pause(&self, user_id: &str, integration_id: &str) -> AppResult<Value> {
        let mut integration = self.owned(user_id, integration_id).await?;

        if integration.workflow_id.is_some() {
            self.sync
                .set_status(&integration, IntegrationStatus::Paused)
                .await?;
        }

        integration.mark_paused(None);
        self.store.save(&mut integration).await?;
        self.store
            .append_log(&integration.id, LogStatus::Warning, "Integration paused by user", None)
            .await?;

        Ok(json!({
            "success": true,
            "message": "Integration paused successfully"
        }))
    }

    /// Reactivate the remote workflow; without one, try creating it first.
    pub async fn resume(&self, user_id: &str, integration_id: &str) -> AppResult<Value> {
        let mut integration = self.owned(user_id, integration_id).await?;
        integration.mark_active();
        integration.clear_error();

        if integration.workflow_id.is_none() {
            let workflow_id = self.sync.create(&mut integration).await?;
            if workflow_id.is_none() {
                return Ok(json!({
                    "success": false,
                    "error": integration.error_message
                }));
            }
        } else {
            self.sync
                .set_status(&integration, IntegrationStatus::Active)
                .await?;
            self.store.save(&mut integration).await?;
        }

        self.store
            .append_log(&integration.id, LogStatus::Started, "Integration resumed by user", None)
            .await?;

        Ok(json!({
            "success": true,
            "workflow_id": integration.workflow_id,
            "message": "Integration resumed successfully"
        }))
    }

    /// Apply edits locally, then push them to the engine. Engine failures
    /// are returned to the caller after the Error state is stored.
    pub async fn edit(&self, user_id: &str, integration_id: &str, edit: EditIntegration) -> AppResult<Value> {
        edit.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let mut integration = self.owned(user_id, integration_id).await?;
        if let Some(flow_name) = edit.flow_name {
            integration.flow_name = flow_name;
        }
        if let Some(config) = edit.config.as_ref() {
            integration.set_config(config);
        }
        self.store.save(&mut integration).await?;

        let workflow_id = self.sync.update(&mut integration).await?;

        Ok(json!({
            "success": true,
            "integration_id": integration.id,
            "workflow_id": workflow_id,
            "status": integration.status,
            "message": "Integration updated successfully"
        }))
    }

    /// Remote removal is attempted first but never blocks the local delete.
    pub async fn delete(&self, user_id: &str, integration_id: &str) -> AppResult<Value> {
        let integration = self.owned(user_id, integration_id).await?;

        let remote_deleted = self.sync.delete(&integration).await;
        self.store.delete(&integration.id).await?;

        info!("Deleted integration {} for user {}", integration.id, user_id);
        Ok(json!({
            "success": true,
            "remote_deleted": remote_deleted,
            "message": format!("Integration '{}' deleted successfully", integration.flow_name)
        }))
    }

    /// Apply an engine execution report.
    ///
    /// Replays re-apply the same terminal state and add another log row.
    pub async fn handle_webhook(&self, payload: WebhookPayload) -> AppResult<Value> {
        let mut integration = self
            .store
            .find_by_workflow_id(&payload.workflow_id)
            .await?
            .ok_or_else(|| AppError::UnknownWorkflow(payload.workflow_id.clone()))?;

        let message = payload
            .message
            .as_deref()
            .map(|m| truncate_message(m, MAX_MESSAGE_LEN));

        let log_status = if payload.status == "success" {
            integration.mark_completed(Utc::now().timestamp());
            LogStatus::Success
        } else {
            integration.mark_error(
                message
                    .clone()
                    .unwrap_or_else(|| format!("Workflow reported status '{}'", payload.status)),
            );
            LogStatus::Error
        };

        self.store.save(&mut integration).await?;
        self.store
            .append_log(
                &integration.id,
                log_status,
                message.as_deref().unwrap_or_default(),
                payload.execution_time,
            )
            .await?;

        info!(
            "Webhook for workflow {} recorded as {}",
            payload.workflow_id,
            log_status.as_str()
        );
        Ok(json!({
            "success": true,
            "message": "Callback processed successfully"
        }))
    }

    pub async fn dashboard_stats(&self, user_id: &str) -> AppResult<Value> {
        let connected_apps = self.tokens.count_providers(user_id).await?;
        let active_integrations = self.store.count_active(user_id).await?;

        let mut executions = Vec::new();
        if self.engine.is_enabled() {
            for workflow_id in self.store.workflow_ids(user_id).await? {
                let found = best_effort(
                    &format!("Listing executions for workflow {}", workflow_id),
                    self.engine.list_executions(Some(&workflow_id)),
                    Vec::new(),
                )
                .await;
                executions.extend(found);
            }
        }

        let (synced_today, last_sync) = execution_stats(&executions, Utc::now());

        Ok(json!({
            "success": true,
            "stats": {
                "connectedApps": connected_apps,
                "activeIntegrations": active_integrations,
                "syncedToday": synced_today,
                "lastSync": last_sync
            }
        }))
    }
}

fn summary(integration: &Integration) -> Value {
    json!({
        "id": integration.id,
        "flow_name": integration.flow_name,
        "source_app": integration.source_app,
        "target_app": integration.target_app,
        "status": integration.status,
        "workflow_id": integration.workflow_id,
        "last_run": integration.last_run,
        "error_message": integration.error_message,
        "modified": integration.updated_at
    })
}

/// Executions started since midnight UTC, and the latest start time as reported.
fn execution_stats(executions: &[Value], now: DateTime<Utc>) -> (usize, Option<String>) {
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);

    let mut synced_today = 0;
    let mut latest: Option<(DateTime<Utc>, String)> = None;

    for execution in executions {
        let Some(raw) = execution.get("startedAt").and_then(Value::as_str) else {
            continue;
        };
        let Ok(started) = DateTime::parse_from_rfc3339(raw) else {
            continue;
        };
        let started = started.with_timezone(&Utc);

        if started >= today_start {
            synced_today += 1;
        }
        if latest.as_ref().map_or(true, |(t, _)| started > *t) {
            latest = Some((started, raw.to_string()));
        }
    }

    (synced_today, latest.map(|(_, raw)| raw))
}
