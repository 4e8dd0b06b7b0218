pub mod catalog;
pub mod engine;
pub mod integrations;
pub mod oauth;
pub mod resources;

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(health_check_db))
        .nest("/api/oauth", oauth::create_routes())
        .nest("/api/integrations", integrations::create_routes())
        .nest("/api/resources", resources::create_routes())
        .nest("/api/catalog", catalog::create_routes())
        .nest("/api/engine", engine::create_routes())
        .route("/api/dashboard/stats", get(dashboard_stats))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": true,
        "version": env!("CARGO_PKG_VERSION"),
        "engine_enabled": state.engine.is_enabled()
    }))
}

async fn health_check_db(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let conn = state.db.pool();
    let conn = conn.lock().await;
    conn.query("SELECT 1", ()).await?;

    Ok(Json(json!({ "status": true })))
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Value>> {
    Ok(Json(state.integrations.dashboard_stats(&user.user_id).await?))
}
