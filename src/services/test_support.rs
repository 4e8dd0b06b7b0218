//! In-process HTTP doubles for the workflow engine and OAuth token endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct EngineInner {
    calls: Vec<RecordedCall>,
    workflows: HashMap<String, Value>,
    credentials: Vec<Value>,
    executions: HashMap<String, Vec<Value>>,
    node_types: Option<Value>,
    options: Vec<Value>,
    failures: Vec<(String, String, u16, String)>,
    omit_ids: bool,
    next_id: u64,
}

/// Minimal stateful stand-in for the engine's REST API.
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl MockEngine {
    pub fn router(&self) -> Router {
        Router::new().fallback(engine_handler).with_state(self.clone())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    /// Every `method` request fails with `status` and `body`.
    pub fn fail(&self, method: &str, status: u16, body: &str) {
        self.fail_matching(method, "", status, body);
    }

    /// `method` requests whose path or query contains `fragment` fail.
    pub fn fail_matching(&self, method: &str, fragment: &str, status: u16, body: &str) {
        self.inner.lock().unwrap().failures.push((
            method.to_string(),
            fragment.to_string(),
            status,
            body.to_string(),
        ));
    }

    pub fn omit_ids(&self) {
        self.inner.lock().unwrap().omit_ids = true;
    }

    pub fn add_credential(&self, credential: Value) {
        self.inner.lock().unwrap().credentials.push(credential);
    }

    pub fn set_executions(&self, workflow_id: &str, executions: Vec<Value>) {
        self.inner
            .lock()
            .unwrap()
            .executions
            .insert(workflow_id.to_string(), executions);
    }

    pub fn set_node_types(&self, node_types: Value) {
        self.inner.lock().unwrap().node_types = Some(node_types);
    }

    pub fn set_options(&self, options: Vec<Value>) {
        self.inner.lock().unwrap().options = options;
    }

    pub fn workflow(&self, id: &str) -> Option<Value> {
        self.inner.lock().unwrap().workflows.get(id).cloned()
    }
}

async fn engine_handler(
    State(engine): State<MockEngine>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);

    let mut inner = engine.inner.lock().unwrap();
    inner.calls.push(RecordedCall {
        method: method.to_string(),
        path: path.clone(),
        query: query.clone(),
        api_key: headers
            .get("X-N8N-API-KEY")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    let target = format!("{}?{}", path, query.clone().unwrap_or_default());
    if let Some((_, _, status, message)) = inner
        .failures
        .iter()
        .find(|(m, fragment, _, _)| *m == method.as_str() && target.contains(fragment.as_str()))
        .cloned()
    {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, message).into_response();
    }

    let rest = path.trim_start_matches("/api/v1");
    let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();

    match (method.as_str(), segments.as_slice()) {
        ("POST", ["workflows"]) => {
            inner.next_id += 1;
            let id = format!("wf-{}", inner.next_id);
            let mut stored = body.clone();
            stored["id"] = json!(id);
            inner.workflows.insert(id.clone(), stored.clone());
            if inner.omit_ids {
                return Json(json!({ "name": body["name"] })).into_response();
            }
            Json(stored).into_response()
        }
        ("GET", ["workflows"]) => {
            let data: Vec<Value> = inner.workflows.values().cloned().collect();
            Json(json!({ "data": data })).into_response()
        }
        ("GET", ["workflows", id]) => match inner.workflows.get(*id) {
            Some(wf) => Json(wf.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, "workflow not found").into_response(),
        },
        ("PUT", ["workflows", id]) => {
            let entry = inner
                .workflows
                .entry(id.to_string())
                .or_insert_with(|| json!({ "id": id }));
            if let (Some(target), Some(update)) = (entry.as_object_mut(), body.as_object()) {
                for (k, v) in update {
                    target.insert(k.clone(), v.clone());
                }
            }
            Json(entry.clone()).into_response()
        }
        ("DELETE", ["workflows", id]) => {
            inner.workflows.remove(*id);
            StatusCode::NO_CONTENT.into_response()
        }
        ("POST", ["workflows", id, "execute"]) => {
            Json(json!({ "executionId": format!("exec-{}", id) })).into_response()
        }
        ("POST", ["credentials"]) => {
            inner.next_id += 1;
            let id = format!("cred-{}", inner.next_id);
            let mut stored = body.clone();
            stored["id"] = json!(id);
            inner.credentials.push(stored.clone());
            Json(json!({ "id": id, "name": body["name"] })).into_response()
        }
        ("PUT", ["credentials", id]) => Json(json!({ "id": id })).into_response(),
        ("GET", ["credentials"]) => {
            Json(json!({ "data": inner.credentials.clone() })).into_response()
        }
        ("DELETE", ["credentials", _]) => StatusCode::NO_CONTENT.into_response(),
        ("GET", ["executions"]) => {
            let workflow_id = query
                .as_deref()
                .and_then(|q| {
                    url::form_urlencoded::parse(q.as_bytes())
                        .find(|(k, _)| k == "workflowId")
                        .map(|(_, v)| v.into_owned())
                })
                .unwrap_or_default();
            let data = inner.executions.get(&workflow_id).cloned().unwrap_or_default();
            Json(json!({ "data": data })).into_response()
        }
        ("GET", ["executions", id]) => Json(json!({ "id": id })).into_response(),
        ("GET", ["node-types"]) => {
            Json(inner.node_types.clone().unwrap_or_else(|| json!([]))).into_response()
        }
        ("GET", ["node-types", name]) => {
            Json(json!({ "name": name, "properties": [] })).into_response()
        }
        ("POST", ["dynamic-node-parameters", "options"]) => {
            Json(json!({ "data": inner.options.clone() })).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "no such route").into_response(),
    }
}

#[derive(Default)]
struct ProviderInner {
    forms: Vec<HashMap<String, String>>,
    status: u16,
    body: String,
}

/// Token endpoint double answering every POST to `/token` with a canned reply.
#[derive(Clone, Default)]
pub struct MockTokenEndpoint {
    inner: Arc<Mutex<ProviderInner>>,
}

impl MockTokenEndpoint {
    pub fn responding(status: u16, body: Value) -> Self {
        let endpoint = MockTokenEndpoint::default();
        {
            let mut inner = endpoint.inner.lock().unwrap();
            inner.status = status;
            inner.body = body.to_string();
        }
        endpoint
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/token", post(token_handler))
            .with_state(self.clone())
    }

    pub fn forms(&self) -> Vec<HashMap<String, String>> {
        self.inner.lock().unwrap().forms.clone()
    }
}

async fn token_handler(State(endpoint): State<MockTokenEndpoint>, body: Bytes) -> Response {
    let form: HashMap<String, String> = url::form_urlencoded::parse(&body)
        .into_owned()
        .collect();
    let mut inner = endpoint.inner.lock().unwrap();
    inner.forms.push(form);
    let status = StatusCode::from_u16(inner.status).unwrap();
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        inner.body.clone(),
    )
        .into_response()
}
