use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{truncate_message, AppError, AppResult, MAX_MESSAGE_LEN};

const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Typed REST client for the external workflow engine.
///
/// Without an API key the client is disabled: `is_enabled()` is false and
/// every call fails with a configuration error. Callers are expected to
/// check the flag and fall back to local behaviour instead.
#[derive(Clone)]
pub struct EngineClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl EngineClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(10)
            .build()?;

        if api_key.is_none() {
            warn!("Workflow engine API key not configured - engine integration disabled");
        }

        Ok(Self {
            client,
            api_base: format!("{}/api/v1", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> AppResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Workflow engine not configured".to_string()))?;

        let url = format!("{}{}", self.api_base, endpoint);
        debug!("Engine request {} {}", method, endpoint);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(API_KEY_HEADER, api_key)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let request_error = |status: Option<u16>, body: String| AppError::EngineRequest {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            status,
            body: truncate_message(&body, MAX_MESSAGE_LEN),
        };

        let response = builder.send().await.map_err(|e| {
            error!("Engine request {} {} failed: {}", method, endpoint, e);
            request_error(None, e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| request_error(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            error!("Engine request {} {} returned {}", method, endpoint, status);
            return Err(request_error(Some(status.as_u16()), text));
        }

        // Deletes answer with an empty or arbitrary body.
        if method == Method::DELETE {
            return Ok(json!({ "success": true }));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            AppError::EngineProtocol(format!(
                "{} {} returned non-JSON body: {}",
                method, endpoint, e
            ))
        })
    }

    // Lists are wrapped in {"data": [...]}; tolerate a bare array.
    fn data_list(response: Value) -> Vec<Value> {
        match response {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    // Workflows

    pub async fn create_workflow(&self, workflow: &Value) -> AppResult<Value> {
        self.request(Method::POST, "/workflows", Some(workflow)).await
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> AppResult<Value> {
        self.request(Method::GET, &format!("/workflows/{}", workflow_id), None)
            .await
    }

    pub async fn update_workflow(&self, workflow_id: &str, workflow: &Value) -> AppResult<Value> {
        self.request(Method::PUT, &format!("/workflows/{}", workflow_id), Some(workflow))
            .await
    }

    pub async fn delete_workflow(&self, workflow_id: &str) -> AppResult<()> {
        self.request(Method::DELETE, &format!("/workflows/{}", workflow_id), None)
            .await?;
        Ok(())
    }

    /// Sends only the active flag; the engine rejects unknown fields here.
    pub async fn activate_workflow(&self, workflow_id: &str) -> AppResult<Value> {
        self.update_workflow(workflow_id, &json!({ "active": true }))
            .await
    }

    pub async fn deactivate_workflow(&self, workflow_id: &str) -> AppResult<Value> {
        self.update_workflow(workflow_id, &json!({ "active": false }))
            .await
    }

    pub async fn list_workflows(&self) -> AppResult<Vec<Value>> {
        Ok(Self::data_list(
            self.request(Method::GET, "/workflows", None).await?,
        ))
    }

    // Credentials

    pub async fn create_credential(&self, credential: &Value) -> AppResult<Value> {
        self.request(Method::POST, "/credentials", Some(credential))
            .await
    }

    pub async fn get_credential(&self, credential_id: &str) -> AppResult<Value> {
        self.request(Method::GET, &format!("/credentials/{}", credential_id), None)
            .await
    }

    pub async fn update_credential(&self, credential_id: &str, credential: &Value) -> AppResult<Value> {
        self.request(
            Method::PUT,
            &format!("/credentials/{}", credential_id),
            Some(credential),
        )
        .await
    }

    pub async fn delete_credential(&self, credential_id: &str) -> AppResult<()> {
        self.request(Method::DELETE, &format!("/credentials/{}", credential_id), None)
            .await?;
        Ok(())
    }

    pub async fn list_credentials(&self) -> AppResult<Vec<Value>> {
        Ok(Self::data_list(
            self.request(Method::GET, "/credentials", None).await?,
        ))
    }

    // Executions

    pub async fn execute_workflow(&self, workflow_id: &str, input: Option<&Value>) -> AppResult<Value> {
        let body = input.cloned().unwrap_or_else(|| json!({}));
        self.request(
            Method::POST,
            &format!("/workflows/{}/execute", workflow_id),
            Some(&body),
        )
        .await
    }

    pub async fn get_execution(&self, execution_id: &str) -> AppResult<Value> {
        self.request(Method::GET, &format!("/executions/{}", execution_id), None)
            .await
    }

    pub async fn list_executions(&self, workflow_id: Option<&str>) -> AppResult<Vec<Value>> {
        let endpoint = match workflow_id {
            Some(id) => format!(
                "/executions?{}",
                url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("workflowId", id)
                    .finish()
            ),
            None => "/executions".to_string(),
        };
        Ok(Self::data_list(
            self.request(Method::GET, &endpoint, None).await?,
        ))
    }

    // Node discovery

    pub async fn get_node_types(&self) -> AppResult<Value> {
        self.request(Method::GET, "/node-types", None).await
    }

    pub async fn get_node_type(&self, name: &str) -> AppResult<Value> {
        self.request(Method::GET, &format!("/node-types/{}", name), None)
            .await
    }

    /// Resolve a node's dynamic options (mailboxes, sheets, channels...).
    pub async fn get_node_parameter_options(
        &self,
        node_type: &str,
        method_name: &str,
        credential_id: &str,
        current_params: Option<&Value>,
    ) -> AppResult<Vec<Value>> {
        let payload = json!({
            "nodeTypeAndVersion": { "name": node_type, "version": 1 },
            "path": method_name,
            "methodName": method_name,
            "credentials": { "id": credential_id },
            "currentNodeParameters": current_params.cloned().unwrap_or_else(|| json!({})),
        });
        Ok(Self::data_list(
            self.request(Method::POST, "/dynamic-node-parameters/options", Some(&payload))
                .await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{spawn_mock, MockEngine};

    #[tokio::test]
    async fn test_disabled_client_refuses_calls() {
        let client = EngineClient::new("http://127.0.0.1:9", None, 1).unwrap();
        assert!(!client.is_enabled());
        assert!(matches!(
            client.list_workflows().await.unwrap_err(),
            AppError::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn test_create_and_activate_send_expected_bodies() {
        let engine = MockEngine::default();
        let base = spawn_mock(engine.router()).await;
        let client = EngineClient::new(&base, Some("key".to_string()), 5).unwrap();

        let created = client
            .create_workflow(&json!({ "name": "wf", "nodes": [] }))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        client.activate_workflow(&id).await.unwrap();

        let calls = engine.calls();
        assert_eq!(calls[0].method, "POST");
        assert_eq!(calls[0].path, "/api/v1/workflows");
        assert_eq!(calls[0].api_key.as_deref(), Some("key"));
        assert_eq!(calls[1].method, "PUT");
        assert_eq!(calls[1].body, json!({ "active": true }));
    }

    #[tokio::test]
    async fn test_error_status_becomes_engine_request_error() {
        let engine = MockEngine::default();
        engine.fail("PUT", 400, "bad request body");
        let base = spawn_mock(engine.router()).await;
        let client = EngineClient::new(&base, Some("key".to_string()), 5).unwrap();

        match client.deactivate_workflow("wf-1").await.unwrap_err() {
            AppError::EngineRequest {
                method,
                endpoint,
                status,
                body,
            } => {
                assert_eq!(method, "PUT");
                assert_eq!(endpoint, "/workflows/wf-1");
                assert_eq!(status, Some(400));
                assert_eq!(body, "bad request body");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_engine_has_no_status() {
        let client = EngineClient::new("http://127.0.0.1:1", Some("key".to_string()), 2).unwrap();
        match client.get_workflow("x").await.unwrap_err() {
            AppError::EngineRequest { status, .. } => assert_eq!(status, None),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lists_unwrap_data_and_delete_accepts_empty_body() {
        let engine = MockEngine::default();
        let base = spawn_mock(engine.router()).await;
        let client = EngineClient::new(&base, Some("key".to_string()), 5).unwrap();

        client.create_credential(&json!({ "name": "c1" })).await.unwrap();
        assert_eq!(client.list_credentials().await.unwrap().len(), 1);

        client.delete_workflow("whatever").await.unwrap();
        let executions = client.list_executions(Some("wf 1")).await.unwrap();
        assert!(executions.is_empty());
        assert_eq!(engine.calls().last().unwrap().query.as_deref(), Some("workflowId=wf+1"));
    }

    #[tokio::test]
    async fn test_parameter_options_payload() {
        let engine = MockEngine::default();
        let base = spawn_mock(engine.router()).await;
        let client = EngineClient::new(&base, Some("key".to_string()), 5).unwrap();

        client
            .get_node_parameter_options("n8n-nodes-base.gmail", "getLabels", "cred-1", None)
            .await
            .unwrap();

        let call = engine.calls().pop().unwrap();
        assert_eq!(call.path, "/api/v1/dynamic-node-parameters/options");
        assert_eq!(call.body["nodeTypeAndVersion"]["name"], "n8n-nodes-base.gmail");
        assert_eq!(call.body["methodName"], "getLabels");
        assert_eq!(call.body["credentials"]["id"], "cred-1");
        assert_eq!(call.body["currentNodeParameters"], json!({}));
    }
}
