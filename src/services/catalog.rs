use std::collections::BTreeMap;

use crate::db::{positional, text, Database};
use crate::error::AppResult;
use crate::models::CatalogApp;

const CATALOG_COLUMNS: &str =
    "name, display_name, logo_url, description, category, oauth_provider";

/// Read-only view over the active apps in `app_catalog`.
#[derive(Clone)]
pub struct AppCatalog {
    db: Database,
}

impl AppCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn query_apps(&self, sql: &str, params: Vec<libsql::Value>) -> AppResult<Vec<CatalogApp>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn.query(sql, positional(params)).await?;

        let mut apps = Vec::new();
        while let Some(row) = rows.next().await? {
            apps.push(CatalogApp::from_row(&row)?);
        }
        Ok(apps)
    }

    /// Active apps by display name, optionally restricted to one category.
    pub async fn list(&self, category: Option<&str>) -> AppResult<Vec<CatalogApp>> {
        match category.filter(|c| !c.is_empty()) {
            Some(category) => {
                self.query_apps(
                    &format!(
                        "SELECT {} FROM app_catalog WHERE is_active = 1 AND category = ? ORDER BY display_name ASC",
                        CATALOG_COLUMNS
                    ),
                    vec![text(category)],
                )
                .await
            }
            None => {
                self.query_apps(
                    &format!(
                        "SELECT {} FROM app_catalog WHERE is_active = 1 ORDER BY display_name ASC",
                        CATALOG_COLUMNS
                    ),
                    Vec::new(),
                )
                .await
            }
        }
    }

    pub async fn get(&self, app_name: &str) -> AppResult<Option<CatalogApp>> {
        let mut apps = self
            .query_apps(
                &format!("SELECT {} FROM app_catalog WHERE name = ?", CATALOG_COLUMNS),
                vec![text(app_name)],
            )
            .await?;
        Ok(apps.pop())
    }

    /// Active app count per category; uncategorised apps are left out.
    pub async fn categories(&self) -> AppResult<BTreeMap<String, i64>> {
        let conn = self.db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT category, COUNT(*) FROM app_catalog
                WHERE is_active = 1 AND category IS NOT NULL AND category != ''
                GROUP BY category
                "#,
                (),
            )
            .await?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            counts.insert(row.get::<String>(0)?, row.get::<i64>(1)?);
        }
        Ok(counts)
    }

    /// Case-insensitive substring match on name, display name and description.
    /// A blank query lists the whole catalog.
    pub async fn search(&self, query: &str) -> AppResult<Vec<CatalogApp>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list(None).await;
        }

        let pattern = format!("%{}%", escape_like(query));
        self.query_apps(
            &format!(
                r#"
                SELECT {} FROM app_catalog
                WHERE is_active = 1
                  AND (display_name LIKE ?1 ESCAPE '\' OR description LIKE ?1 ESCAPE '\' OR name LIKE ?1 ESCAPE '\')
                ORDER BY display_name ASC
                "#,
                CATALOG_COLUMNS
            ),
            vec![text(&pattern)],
        )
        .await
    }
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
