use serde::Serialize;

/// One entry of the browsable app catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogApp {
    pub app_name: String,
    pub display_name: String,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub oauth_provider: Option<String>,
}

impl CatalogApp {
    pub fn from_row(row: &libsql::Row) -> Result<Self, libsql::Error> {
        Ok(CatalogApp {
            app_name: row.get(0)?,
            display_name: row.get(1)?,
            logo_url: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            oauth_provider: row.get(5)?,
        })
    }
}
