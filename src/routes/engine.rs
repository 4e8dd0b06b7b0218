use axum::{
    extract::{Path, State},
    response::Json,
    routing::{delete, get},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::node_cache::CacheStats;
use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/node-types", get(node_types))
        .route("/node-types/:name", get(node_type))
        .route("/cache/stats", get(cache_stats))
        .route("/cache", delete(clear_cache))
}

async fn node_types(State(state): State<Arc<AppState>>, _user: AuthUser) -> AppResult<Json<Value>> {
    Ok(Json(state.node_cache.get_node_types().await?))
}

async fn node_type(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.node_cache.get_node_definition(&name).await?))
}

async fn cache_stats(State(state): State<Arc<AppState>>, _user: AuthUser) -> AppResult<Json<CacheStats>> {
    Ok(Json(state.node_cache.stats().await?))
}

async fn clear_cache(State(state): State<Arc<AppState>>, _user: AuthUser) -> AppResult<Json<Value>> {
    state.node_cache.clear().await?;
    Ok(Json(json!({ "success": true, "message": "Engine cache cleared" })))
}

#[cfg(test)]
mod tests {
    use crate::routes::create_router;
    use crate::routes::test_helpers::*;
    use crate::services::test_support::{spawn_mock, MockEngine};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_node_types_are_cached_until_cleared() {
        let engine = MockEngine::default();
        engine.set_node_types(json!([{ "name": "n8n-nodes-base.gmail" }]));
        let base = spawn_mock(engine.router()).await;
        let app = create_router(test_state(Some(&base), None).await);

        for _ in 0..2 {
            let (status, body) = send(&app, Method::GET, "/api/engine/node-types", Some("u1"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body[0]["name"], "n8n-nodes-base.gmail");
        }
        assert_eq!(engine.calls_to("GET").len(), 1);

        let (_, stats) = send(&app, Method::GET, "/api/engine/cache/stats", Some("u1"), None).await;
        assert_eq!(stats, json!({ "total": 1, "valid": 1, "expired": 0 }));

        let (status, _) = send(&app, Method::DELETE, "/api/engine/cache", Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, stats) = send(&app, Method::GET, "/api/engine/cache/stats", Some("u1"), None).await;
        assert_eq!(stats["total"], 0);
    }

    #[tokio::test]
    async fn test_node_types_without_engine_is_configuration_error() {
        let app = create_router(test_state(None, None).await);
        let (status, body) = send(&app, Method::GET, "/api/engine/node-types", Some("u1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Workflow engine not configured");
    }
}
