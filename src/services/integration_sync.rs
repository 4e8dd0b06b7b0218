//! Keeps local integration records and remote engine workflows in step.
//!
//! Creation degrades gracefully: the local record always survives and any
//! remote failure is folded into a Paused status with a stored message.
//! Updates and status toggles are not absorbed, the caller sees the error.
//! Remote deletes never block local deletion.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{truncate_message, AppError, AppResult, MAX_MESSAGE_LEN};
use crate::models::{Integration, IntegrationStatus, OAuthToken};
use crate::services::best_effort;
use crate::services::engine_client::EngineClient;
use crate::services::graph_builder;
use crate::services::integration_store::IntegrationStore;
use crate::services::registry;

pub const ENGINE_DISABLED_MESSAGE: &str =
    "Workflow engine not configured - workflow saved locally only";

#[derive(Clone)]
pub struct IntegrationSync {
    engine: Arc<EngineClient>,
    store: IntegrationStore,
    product_name: String,
}

impl IntegrationSync {
    pub fn new(engine: Arc<EngineClient>, store: IntegrationStore, product_name: String) -> Self {
        Self {
            engine,
            store,
            product_name,
        }
    }

    pub fn engine_enabled(&self) -> bool {
        self.engine.is_enabled()
    }

    /// Materialize the integration as a remote workflow.
    ///
    /// Returns the workflow id, or `None` when the engine is disabled or
    /// creation failed. Only persistence errors are returned as `Err`.
    pub async fn create(&self, integration: &mut Integration) -> AppResult<Option<String>> {
        if !self.engine.is_enabled() {
            info!(
                "Workflow engine disabled - integration {} saved locally only",
                integration.flow_name
            );
            integration.mark_paused(Some(ENGINE_DISABLED_MESSAGE.to_string()));
            self.store.save(integration).await?;
            return Ok(None);
        }

        let (workflow_id, should_activate) = match self.create_remote(integration).await {
            Ok(created) => created,
            Err(e) => {
                let message = truncate_message(
                    &format!("Workflow engine sync failed: {}", e),
                    MAX_MESSAGE_LEN,
                );
                error!(
                    "Failed to create workflow for integration {}: {}",
                    integration.id, message
                );
                integration.mark_paused(Some(message));
                self.store.save(integration).await?;
                return Ok(None);
            }
        };

        integration.set_workflow_id(workflow_id.clone());
        self.store.save(integration).await?;

        if should_activate {
            let engine = self.engine.clone();
            let id = workflow_id.clone();
            best_effort(
                &format!("Activating new workflow {}", workflow_id),
                async move { engine.activate_workflow(&id).await.map(|_| ()) },
                (),
            )
            .await;
        }

        info!(
            "Created workflow {} for integration {}",
            workflow_id, integration.id
        );
        Ok(Some(workflow_id))
    }

    async fn create_remote(&self, integration: &Integration) -> AppResult<(String, bool)> {
        let mut graph = graph_builder::build(integration, &self.product_name);
        // The engine treats `active` as read-only on creation.
        let should_activate = graph.take_active();

        let response = self.engine.create_workflow(&graph.to_json()).await?;
        let workflow_id = id_of(&response)
            .ok_or_else(|| AppError::EngineProtocol("engine did not return a workflow id".to_string()))?;

        Ok((workflow_id, should_activate))
    }

    /// Push the current configuration; bootstraps through `create` when no
    /// remote workflow exists yet.
    pub async fn update(&self, integration: &mut Integration) -> AppResult<Option<String>> {
        let workflow_id = match integration.workflow_id.clone() {
            Some(id) => id,
            None => return self.create(integration).await,
        };

        let mut graph = graph_builder::build(integration, &self.product_name);
        graph.take_active();

        match self.engine.update_workflow(&workflow_id, &graph.to_json()).await {
            Ok(_) => {
                if integration.error_message.is_some() {
                    integration.clear_error();
                    self.store.save(integration).await?;
                }
                info!(
                    "Updated workflow {} for integration {}",
                    workflow_id, integration.id
                );
                Ok(Some(workflow_id))
            }
            Err(e) => {
                let message =
                    truncate_message(&format!("Failed to update workflow: {}", e), MAX_MESSAGE_LEN);
                error!("{}", message);
                integration.mark_error(message);
                self.store.save(integration).await?;
                Err(e)
            }
        }
    }

    /// Remove the remote workflow. `false` means the engine call failed;
    /// callers still delete the local record.
    pub async fn delete(&self, integration: &Integration) -> bool {
        let workflow_id = match integration.workflow_id.as_deref() {
            Some(id) => id,
            None => return true,
        };

        let removed = best_effort(
            &format!("Deleting workflow {}", workflow_id),
            async { self.engine.delete_workflow(workflow_id).await.map(|_| true) },
            false,
        )
        .await;

        if removed {
            info!(
                "Deleted workflow {} for integration {}",
                workflow_id, integration.id
            );
        }
        removed
    }

    /// Activate or deactivate the remote workflow.
    pub async fn set_status(
        &self,
        integration: &Integration,
        status: IntegrationStatus,
    ) -> AppResult<()> {
        let workflow_id = integration.workflow_id.as_deref().ok_or_else(|| {
            AppError::NoRemoteWorkflow(format!(
                "Integration {} has no remote workflow",
                integration.id
            ))
        })?;

        let result = match status {
            IntegrationStatus::Active => self.engine.activate_workflow(workflow_id).await,
            _ => self.engine.deactivate_workflow(workflow_id).await,
        };

        match result {
            Ok(_) => {
                info!("Set workflow {} status to {}", workflow_id, status);
                Ok(())
            }
            Err(e) => {
                error!("Failed to update workflow {} status: {}", workflow_id, e);
                Err(e)
            }
        }
    }

    /// Create or update the engine credential for `(provider, user)` and
    /// return its id.
    pub async fn sync_oauth_credentials(
        &self,
        provider: &str,
        user_id: &str,
        token: &OAuthToken,
    ) -> AppResult<String> {
        let name = credential_name(&self.product_name, provider, user_id);
        let payload = json!({
            "name": name,
            "type": registry::credential_type(provider),
            "data": {
                "accessToken": token.access_token,
                "refreshToken": token.refresh_token,
                "tokenType": token
                    .raw_payload
                    .get("token_type")
                    .and_then(Value::as_str)
                    .unwrap_or("Bearer"),
                "expiresIn": token.raw_payload.get("expires_in").cloned().unwrap_or(Value::Null),
            }
        });

        let existing = self
            .engine
            .list_credentials()
            .await?
            .into_iter()
            .find(|c| c.get("name").and_then(Value::as_str) == Some(name.as_str()))
            .and_then(|c| id_of(&c));

        let response = match existing {
            Some(id) => self.engine.update_credential(&id, &payload).await?,
            None => self.engine.create_credential(&payload).await?,
        };

        let credential_id = id_of(&response).ok_or_else(|| {
            AppError::EngineProtocol("engine did not return a credential id".to_string())
        })?;

        info!("Synced {} credentials to engine for user {}", provider, user_id);
        Ok(credential_id)
    }
}

pub fn credential_name(product_name: &str, provider: &str, user_id: &str) -> String {
    format!(
        "{} {} - {}",
        product_name,
        registry::title_case(provider),
        user_id
    )
}

// Ids come back as strings or numbers depending on engine version.
fn id_of(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => {
            warn!("Unexpected id shape in engine response: {}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::services::test_support::{spawn_mock, MockEngine};

    async fn setup(enabled: bool) -> (IntegrationSync, IntegrationStore, MockEngine) {
        let engine = MockEngine::default();
        let base = spawn_mock(engine.router()).await;
        let key = enabled.then(|| "key".to_string());
        let client = EngineClient::new(&base, key, 5).unwrap();
        let store = IntegrationStore::new(Database::in_memory().await);
        (
            IntegrationSync::new(Arc::new(client), store.clone(), "Flowbridge".to_string()),
            store,
            engine,
        )
    }

    async fn stored(store: &IntegrationStore) -> Integration {
        let integration = Integration::new(
            "u1",
            "Inbox to Slack",
            "gmail",
            "slack",
            Some(&json!({ "fieldMappings": ["text"] })),
        );
        store.insert(&integration).await.unwrap();
        integration
    }

    fn token() -> OAuthToken {
        OAuthToken {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            provider: "google".to_string(),
            access_token: "AT1".to_string(),
            refresh_token: Some("RT1".to_string()),
            expires_at: None,
            raw_payload: json!({ "access_token": "AT1", "expires_in": 3600 }),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_create_with_disabled_engine_pauses_locally() {
        let (sync, store, engine) = setup(false).await;
        let mut integration = stored(&store).await;

        assert_eq!(sync.create(&mut integration).await.unwrap(), None);

        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert_eq!(saved.status, IntegrationStatus::Paused);
        assert_eq!(saved.workflow_id, None);
        assert_eq!(saved.error_message.as_deref(), Some(ENGINE_DISABLED_MESSAGE));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_strips_active_and_activates_separately() {
        let (sync, store, engine) = setup(true).await;
        let mut integration = stored(&store).await;

        let workflow_id = sync.create(&mut integration).await.unwrap().unwrap();

        let calls = engine.calls();
        assert_eq!(calls[0].method, "POST");
        assert!(calls[0].body.get("active").is_none());
        assert_eq!(calls[0].body["name"], "Flowbridge: Inbox to Slack");
        assert_eq!(calls[1].method, "PUT");
        assert_eq!(calls[1].path, format!("/api/v1/workflows/{}", workflow_id));
        assert_eq!(calls[1].body, json!({ "active": true }));

        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert_eq!(saved.workflow_id.as_deref(), Some(workflow_id.as_str()));
        assert_eq!(saved.status, IntegrationStatus::Active);
    }

    #[tokio::test]
    async fn test_activation_failure_keeps_workflow() {
        let (sync, store, engine) = setup(true).await;
        engine.fail("PUT", 500, "cannot activate");
        let mut integration = stored(&store).await;

        let workflow_id = sync.create(&mut integration).await.unwrap();
        assert!(workflow_id.is_some());

        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert_eq!(saved.workflow_id, workflow_id);
        assert_eq!(saved.status, IntegrationStatus::Active);
    }

    #[tokio::test]
    async fn test_creation_failure_is_absorbed_into_paused_state() {
        let (sync, store, engine) = setup(true).await;
        engine.fail("POST", 500, &"x".repeat(2_000));
        let mut integration = stored(&store).await;

        assert_eq!(sync.create(&mut integration).await.unwrap(), None);

        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert_eq!(saved.status, IntegrationStatus::Paused);
        assert!(saved.workflow_id.is_none());
        let message = saved.error_message.unwrap();
        assert!(message.starts_with("Workflow engine sync failed"));
        assert!(message.chars().count() <= MAX_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn test_missing_id_in_create_response_is_absorbed() {
        let (sync, store, engine) = setup(true).await;
        engine.omit_ids();
        let mut integration = stored(&store).await;

        assert_eq!(sync.create(&mut integration).await.unwrap(), None);
        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert_eq!(saved.status, IntegrationStatus::Paused);
        assert!(saved.error_message.unwrap().contains("workflow id"));
    }

    #[tokio::test]
    async fn test_update_without_workflow_delegates_to_create() {
        let (sync, store, engine) = setup(true).await;
        let mut integration = stored(&store).await;

        let workflow_id = sync.update(&mut integration).await.unwrap();
        assert!(workflow_id.is_some());
        assert_eq!(engine.calls_to("POST").len(), 1);
    }

    #[tokio::test]
    async fn test_update_success_clears_error() {
        let (sync, store, engine) = setup(true).await;
        let mut integration = stored(&store).await;
        sync.create(&mut integration).await.unwrap();
        integration.error_message = Some("stale".to_string());

        sync.update(&mut integration).await.unwrap();

        let put = engine.calls_to("PUT").pop().unwrap();
        assert!(put.body.get("active").is_none());
        assert_eq!(put.body["nodes"].as_array().unwrap().len(), 4);
        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert!(saved.error_message.is_none());
    }

    #[tokio::test]
    async fn test_update_failure_marks_error_and_propagates() {
        let (sync, store, engine) = setup(true).await;
        let mut integration = stored(&store).await;
        sync.create(&mut integration).await.unwrap();
        engine.fail("PUT", 422, "invalid graph");

        let err = sync.update(&mut integration).await.unwrap_err();
        assert!(matches!(err, AppError::EngineRequest { status: Some(422), .. }));

        let saved = store.get(&integration.id).await.unwrap().unwrap();
        assert_eq!(saved.status, IntegrationStatus::Error);
        assert!(saved.error_message.unwrap().starts_with("Failed to update workflow"));
    }

    #[tokio::test]
    async fn test_delete_reports_remote_failure() {
        let (sync, store, engine) = setup(true).await;
        let mut integration = stored(&store).await;
        assert!(sync.delete(&integration).await);

        sync.create(&mut integration).await.unwrap();
        engine.fail("DELETE", 500, "down");
        assert!(!sync.delete(&integration).await);
    }

    #[tokio::test]
    async fn test_set_status_requires_remote_workflow() {
        let (sync, store, engine) = setup(true).await;
        let mut integration = stored(&store).await;

        let err = sync
            .set_status(&integration, IntegrationStatus::Paused)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoRemoteWorkflow(_)));

        sync.create(&mut integration).await.unwrap();
        sync.set_status(&integration, IntegrationStatus::Paused)
            .await
            .unwrap();
        assert_eq!(engine.calls().last().unwrap().body, json!({ "active": false }));

        engine.fail("PUT", 503, "busy");
        assert!(sync
            .set_status(&integration, IntegrationStatus::Active)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_credential_sync_creates_then_updates_by_name() {
        let (sync, _store, engine) = setup(true).await;

        let created = sync
            .sync_oauth_credentials("google", "u1", &token())
            .await
            .unwrap();
        let post = engine.calls_to("POST").pop().unwrap();
        assert_eq!(post.body["name"], "Flowbridge Google - u1");
        assert_eq!(post.body["type"], "googleOAuth2Api");
        assert_eq!(post.body["data"]["tokenType"], "Bearer");
        assert_eq!(post.body["data"]["expiresIn"], 3600);

        let updated = sync
            .sync_oauth_credentials("google", "u1", &token())
            .await
            .unwrap();
        assert_eq!(created, updated);
        let put = engine.calls_to("PUT").pop().unwrap();
        assert_eq!(put.path, format!("/api/v1/credentials/{}", created));
    }

    #[tokio::test]
    async fn test_credential_sync_propagates_engine_failure() {
        let (sync, _store, engine) = setup(true).await;
        engine.fail("GET", 500, "boom");
        assert!(sync
            .sync_oauth_credentials("slack", "u1", &token())
            .await
            .is_err());
    }
}
