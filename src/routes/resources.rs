use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:app", get(list_resources))
        .route("/:app/:resource/fields", get(list_fields))
}

#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    pub credential_id: Option<String>,
}

async fn list_resources(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(app): Path<String>,
    Query(query): Query<ResourceQuery>,
) -> AppResult<Json<Value>> {
    let result = state
        .resources
        .list_resources(&user.user_id, &app, query.credential_id.as_deref())
        .await?;
    Ok(Json(result))
}

async fn list_fields(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((app, resource)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    Ok(Json(
        state
            .resources
            .list_fields(&user.user_id, &app, &resource)
            .await?,
    ))
}
