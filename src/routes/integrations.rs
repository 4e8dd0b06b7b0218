use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::integrations::{ActivateIntegration, EditIntegration, WebhookPayload};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-flowbridge-signature";

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(activate).get(list))
        .route("/webhook", post(webhook))
        .route("/:id", get(status).put(edit).delete(delete))
        .route("/:id/pause", post(pause))
        .route("/:id/resume", post(resume))
}

async fn activate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ActivateIntegration>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.activate(&user.user_id, payload).await?))
}

async fn list(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.list(&user.user_id).await?))
}

async fn status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.status(&user.user_id, &id).await?))
}

async fn edit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<EditIntegration>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.edit(&user.user_id, &id, payload).await?))
}

async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.delete(&user.user_id, &id).await?))
}

async fn pause(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.pause(&user.user_id, &id).await?))
}

async fn resume(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.resume(&user.user_id, &id).await?))
}

/// Execution callback from the engine. No session; optionally HMAC-signed.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let secret = state
        .config
        .read()
        .map_err(|_| AppError::Internal("config lock poisoned".to_string()))?
        .webhook_secret
        .clone();

    if let Some(secret) = secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(&secret, &body, signature) {
            warn!("Rejected webhook callback with missing or invalid signature");
            return Err(AppError::Unauthorized("Invalid signature".to_string()));
        }
    }

    // Malformed reports are soft failures, like unknown workflows.
    let payload = match WebhookPayload::from_value(&parse_body(&body)) {
        Ok(payload) => payload,
        Err(AppError::Validation(error)) => {
            warn!("Ignoring webhook callback: {}", error);
            return Ok(Json(json!({ "success": false, "error": error })));
        }
        Err(e) => return Err(e),
    };
    Ok(Json(state.integrations.handle_webhook(payload).await?))
}

/// Hex HMAC-SHA256 of the raw body, optionally prefixed with `sha256=`.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// JSON object first, form-encoded otherwise.
fn parse_body(body: &[u8]) -> Value {
    if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(body) {
        return value;
    }

    let fields: Map<String, Value> = url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    Value::Object(fields)
}
