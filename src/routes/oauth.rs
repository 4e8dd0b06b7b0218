use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::CredentialSettings;
use crate::services::oauth_flow::{AuthorizationRequest, CallbackOutcome, OAuthSetupRequest};
use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/initiate", post(initiate))
        .route("/callback", post(callback))
        .route("/refresh", post(refresh))
        .route("/credentials", post(save_credentials))
        .route("/setup", post(save_setup))
        .route("/:provider/default-available", get(default_available))
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitiateRequest {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CallbackRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
}

async fn initiate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<InitiateRequest>,
) -> AppResult<Json<AuthorizationRequest>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let request = state
        .oauth
        .initiate(&user.user_id, &payload.provider, payload.redirect_uri)
        .await?;
    Ok(Json(request))
}

// The state token is the only credential the provider round-trips.
async fn callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CallbackRequest>,
) -> AppResult<Json<CallbackOutcome>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let outcome = state
        .oauth
        .callback(&payload.code, &payload.state, &payload.provider)
        .await?;
    Ok(Json(outcome))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<Value>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state.oauth.refresh(&payload.provider, &user.user_id).await?;
    Ok(Json(json!({ "message": "Token refreshed successfully" })))
}

async fn save_credentials(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<Vec<CredentialSettings>>,
) -> AppResult<Json<Value>> {
    let saved = state.oauth.save_credentials(&payload).await?;
    Ok(Json(json!({
        "success": true,
        "message": "OAuth credentials saved successfully",
        "saved": saved
    })))
}

async fn save_setup(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<OAuthSetupRequest>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.oauth.save_setup(&payload).await?))
}

async fn default_available(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(provider): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.oauth.default_credentials_available(&provider)))
}
