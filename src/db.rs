use libsql::{params::Params, Builder, Connection, Database as LibsqlDatabase, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct Database {
    #[allow(dead_code)]
    db: Arc<LibsqlDatabase>,
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let db = if database_url.starts_with("libsql://") || database_url.starts_with("https://") {
            let auth_token = std::env::var("TURSO_AUTH_TOKEN").unwrap_or_default();

            Builder::new_remote(database_url.to_string(), auth_token)
                .build()
                .await?
        } else {
            if let Some(parent) = std::path::Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() && database_url != ":memory:" {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Builder::new_local(database_url).build().await?
        };

        let conn = db.connect()?;

        Ok(Database {
            db: Arc::new(db),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database with every migration applied.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let db = Database::new(":memory:").await.expect("open in-memory db");
        db.run_migrations().await.expect("migrations");
        db
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        let migrations = [
            include_str!("../migrations/sqlite/001_initial.sql"),
            include_str!("../migrations/sqlite/002_seed_app_catalog.sql"),
            include_str!("../migrations/sqlite/003_app_catalog_details.sql"),
        ];

        for (idx, migration_sql) in migrations.iter().enumerate() {
            tracing::info!("Running migration {}", idx + 1);

            for statement in Self::parse_sql_statements(migration_sql) {
                let trimmed = statement.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let conn = self.conn.lock().await;
                if let Err(e) = conn.execute(trimmed, ()).await {
                    let message = e.to_string();
                    if message.contains("already exists") || message.contains("duplicate column") {
                        tracing::debug!("Skipping migration {} statement: {}", idx + 1, e);
                    } else {
                        anyhow::bail!(
                            "migration {} failed at `{}`: {}",
                            idx + 1,
                            trimmed.chars().take(100).collect::<String>(),
                            e
                        );
                    }
                }
            }
        }

        tracing::info!("All migrations completed");
        Ok(())
    }

    /// Split a migration file into statements on trailing semicolons.
    fn parse_sql_statements(sql: &str) -> Vec<String> {
        let mut statements = Vec::new();
        let mut current_statement = String::new();

        for line in sql.lines() {
            let trimmed_line = line.trim();

            if trimmed_line.is_empty() || trimmed_line.starts_with("--") {
                continue;
            }

            current_statement.push_str(line);
            current_statement.push('\n');

            if trimmed_line.ends_with(';') {
                statements.push(std::mem::take(&mut current_statement));
            }
        }

        if !current_statement.trim().is_empty() {
            statements.push(current_statement);
        }

        statements
    }

    pub fn pool(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

/// Positional parameter list for statements that bind nullable or numeric values.
pub fn positional(values: Vec<Value>) -> Params {
    Params::Positional(values)
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub fn opt_text(value: Option<&str>) -> Value {
    value.map(text).unwrap_or(Value::Null)
}

pub fn opt_int(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

pub fn opt_real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sql_statements_skips_comments() {
        let sql = "-- header\nCREATE TABLE a (\n  id TEXT\n);\n\n-- next\nCREATE INDEX i ON a(id);\n";
        let statements = Database::parse_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[tokio::test]
    async fn test_migrations_are_rerunnable() {
        let db = Database::in_memory().await;
        db.run_migrations().await.unwrap();

        let conn = db.pool();
        let conn = conn.lock().await;
        let mut rows = conn
            .query("SELECT COUNT(*), COUNT(category) FROM app_catalog", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let total = row.get::<i64>(0).unwrap();
        assert!(total > 0);
        assert_eq!(row.get::<i64>(1).unwrap(), total);
    }
}
