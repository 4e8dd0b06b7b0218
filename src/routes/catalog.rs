use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_apps))
        .route("/categories", get(list_categories))
        .route("/search", get(search_apps))
        .route("/:app", get(get_app))
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

async fn list_apps(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> AppResult<Json<Value>> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let apps = state.catalog.list(category).await?;
    Ok(Json(json!({ "success": true, "apps": apps })))
}

async fn list_categories(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let categories = state.catalog.categories().await?;
    Ok(Json(json!({ "success": true, "categories": categories })))
}

async fn search_apps(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    let apps = state.catalog.search(&query.q).await?;
    Ok(Json(json!({ "success": true, "apps": apps, "query": query.q })))
}

async fn get_app(
    State(state): State<Arc<AppState>>,
    Path(app): Path<String>,
) -> AppResult<Json<Value>> {
    match state.catalog.get(&app).await? {
        Some(entry) => Ok(Json(json!({ "success": true, "app": entry }))),
        None => Ok(Json(json!({
            "success": false,
            "error": format!("App '{}' not found", app)
        }))),
    }
}

#[cfg(test)]
mod tests {
    use crate::routes::create_router;
    use crate::routes::test_helpers::*;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_catalog_lists_by_category() {
        let app = create_router(test_state(None, None).await);

        let (status, body) = send(&app, Method::GET, "/api/catalog", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["apps"].as_array().unwrap().len(), 10);

        let (_, body) = send(&app, Method::GET, "/api/catalog?category=CRM", None, None).await;
        let names: Vec<&str> = body["apps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["app_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["hubspot", "salesforce"]);
    }

    #[tokio::test]
    async fn test_catalog_categories_are_counted() {
        let app = create_router(test_state(None, None).await);
        let (status, body) = send(&app, Method::GET, "/api/catalog/categories", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["categories"]["Productivity"], 3);
        assert_eq!(body["categories"]["CRM"], 2);
    }

    #[tokio::test]
    async fn test_catalog_details() {
        let app = create_router(test_state(None, None).await);

        let (status, body) = send(&app, Method::GET, "/api/catalog/xero", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["app"]["category"], "Accounting");

        let (status, body) = send(&app, Method::GET, "/api/catalog/fax", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "App 'fax' not found");
    }

    #[tokio::test]
    async fn test_catalog_search_requires_session() {
        let app = create_router(test_state(None, None).await);

        let (status, _) = send(&app, Method::GET, "/api/catalog/search?q=google", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            send(&app, Method::GET, "/api/catalog/search?q=google", Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "google");
        assert_eq!(body["apps"].as_array().unwrap().len(), 3);
    }
}
