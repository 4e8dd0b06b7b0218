use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::error::{truncate_message, AppResult, MAX_MESSAGE_LEN};
use crate::services::engine_client::EngineClient;
use crate::services::registry::{self, Field, Resource, GENERIC_FIELDS};
use crate::services::token_store::TokenStore;

/// Lists selectable resources and fields for a user's connected apps.
#[derive(Clone)]
pub struct ResourceCatalog {
    engine: Arc<EngineClient>,
    tokens: TokenStore,
}

impl ResourceCatalog {
    pub fn new(engine: Arc<EngineClient>, tokens: TokenStore) -> Self {
        Self { engine, tokens }
    }

    async fn is_connected(&self, user_id: &str, app_id: &str) -> AppResult<bool> {
        self.tokens
            .exists(user_id, registry::provider_for_app(app_id))
            .await
    }

    /// Live options from the engine when a credential is known, the static list otherwise.
    pub async fn list_resources(
        &self,
        user_id: &str,
        app_id: &str,
        credential_id: Option<&str>,
    ) -> AppResult<Value> {
        let entry = match registry::app(app_id) {
            Some(entry) => entry,
            None => {
                return Ok(json!({
                    "success": false,
                    "error": format!("Unsupported app type: {}", app_id)
                }))
            }
        };

        if !self.is_connected(user_id, app_id).await? {
            return Ok(not_connected(app_id));
        }

        let resources: Vec<Value> = match credential_id.filter(|_| self.engine.is_enabled()) {
            Some(credential_id) => {
                match self
                    .engine
                    .get_node_parameter_options(entry.node_type, entry.resource_method, credential_id, None)
                    .await
                {
                    Ok(options) => options.iter().map(option_to_resource).collect(),
                    Err(e) => {
                        warn!("Resource discovery for {} failed: {}", app_id, e);
                        return Ok(json!({
                            "success": false,
                            "error": truncate_message(&e.to_string(), MAX_MESSAGE_LEN)
                        }));
                    }
                }
            }
            None => entry.fallback_resources.iter().map(resource_json).collect(),
        };

        Ok(json!({
            "success": true,
            "app_id": app_id,
            "resources": resources
        }))
    }

    pub async fn list_fields(&self, user_id: &str, app_id: &str, resource_id: &str) -> AppResult<Value> {
        if !self.is_connected(user_id, app_id).await? {
            return Ok(not_connected(app_id));
        }

        let fields: &[Field] = registry::app(app_id)
            .map(|entry| entry.fallback_fields)
            .filter(|fields| !fields.is_empty())
            .unwrap_or(GENERIC_FIELDS);

        Ok(json!({
            "success": true,
            "app_id": app_id,
            "resource_id": resource_id,
            "fields": fields.iter().map(field_json).collect::<Vec<_>>()
        }))
    }
}

fn not_connected(app_id: &str) -> Value {
    json!({
        "success": false,
        "error": format!("App '{}' is not connected for this user", app_id)
    })
}

fn resource_json(resource: &Resource) -> Value {
    json!({ "id": resource.id, "name": resource.name, "type": resource.kind })
}

fn field_json(field: &Field) -> Value {
    json!({ "id": field.id, "name": field.name, "type": field.kind })
}

// Engine options are {name, value} pairs.
fn option_to_resource(option: &Value) -> Value {
    let id = option.get("value").cloned().unwrap_or(Value::Null);
    let name = option
        .get("name")
        .cloned()
        .unwrap_or_else(|| id.clone());
    json!({ "id": id, "name": name, "type": "option" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::TokenResponse;
    use crate::services::test_support::{spawn_mock, MockEngine};

    async fn catalog(enabled: bool) -> (ResourceCatalog, TokenStore, MockEngine) {
        let engine = MockEngine::default();
        let base = spawn_mock(engine.router()).await;
        let client = EngineClient::new(&base, enabled.then(|| "key".to_string()), 5).unwrap();
        let tokens = TokenStore::new(Database::in_memory().await);
        (
            ResourceCatalog::new(Arc::new(client), tokens.clone()),
            tokens,
            engine,
        )
    }

    async fn connect(tokens: &TokenStore, provider: &str) {
        tokens
            .upsert(
                "u1",
                provider,
                &TokenResponse::from_body(200, r#"{"access_token":"AT"}"#).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_app_is_unsupported() {
        let (catalog, _, _) = catalog(false).await;
        let result = catalog.list_resources("u1", "myspace", None).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "Unsupported app type: myspace");
    }

    #[tokio::test]
    async fn test_unconnected_app_is_reported() {
        let (catalog, _, _) = catalog(false).await;
        let result = catalog.list_resources("u1", "gmail", None).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "App 'gmail' is not connected for this user");
    }

    #[tokio::test]
    async fn test_static_fallback_without_engine() {
        let (catalog, tokens, engine) = catalog(false).await;
        connect(&tokens, "google").await;

        let result = catalog.list_resources("u1", "gmail", Some("cred-1")).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["resources"][0]["id"], "INBOX");
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_engine_options_when_credential_given() {
        let (catalog, tokens, engine) = catalog(true).await;
        connect(&tokens, "slack").await;
        engine.set_options(vec![json!({ "name": "#general", "value": "C01" })]);

        let result = catalog.list_resources("u1", "slack", Some("cred-1")).await.unwrap();
        assert_eq!(result["resources"], json!([{ "id": "C01", "name": "#general", "type": "option" }]));
        assert_eq!(engine.calls()[0].body["methodName"], "getChannels");
    }

    #[tokio::test]
    async fn test_fields_fall_back_to_generic_list() {
        let (catalog, tokens, _) = catalog(false).await;
        connect(&tokens, "google").await;

        let gmail = catalog.list_fields("u1", "gmail", "INBOX").await.unwrap();
        assert_eq!(gmail["fields"].as_array().unwrap().len(), 6);

        let sheets = catalog.list_fields("u1", "google_sheets", "sheet-1").await.unwrap();
        assert_eq!(sheets["fields"][0]["id"], "id");
        assert_eq!(sheets["resource_id"], "sheet-1");
    }
}
