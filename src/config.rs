use std::collections::HashMap;
use std::env;
use std::sync::{Arc, RwLock};

use crate::services::registry::PROVIDERS;

pub type MutableConfig = Arc<RwLock<Config>>;

/// OAuth application registration read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,

    pub enable_redis: bool,
    pub redis_url: String,

    pub session_secret: String,
    pub product_name: String,
    pub frontend_url: String,

    pub engine_base_url: String,
    pub engine_api_key: Option<String>,
    pub engine_timeout_secs: u64,

    pub webhook_secret: Option<String>,

    /// Fallback client credentials keyed by provider name.
    pub provider_credentials: HashMap<String, ProviderCredentials>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "data/flowbridge.db".to_string(),
            enable_redis: false,
            redis_url: "redis://localhost:6379".to_string(),
            session_secret: uuid::Uuid::new_v4().to_string(),
            product_name: "Flowbridge".to_string(),
            frontend_url: "http://localhost:8080".to_string(),
            engine_base_url: "http://localhost:5678".to_string(),
            engine_api_key: None,
            engine_timeout_secs: 30,
            webhook_secret: None,
            provider_credentials: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let port = match non_empty("PORT") {
            Some(p) => p.parse()?,
            None => defaults.port,
        };

        let engine_timeout_secs = match non_empty("ENGINE_TIMEOUT_SECS") {
            Some(t) => t.parse()?,
            None => defaults.engine_timeout_secs,
        };

        let mut provider_credentials = HashMap::new();
        for name in PROVIDERS.keys() {
            let prefix = name.to_uppercase();
            let id = non_empty(&format!("{}_CLIENT_ID", prefix));
            let secret = non_empty(&format!("{}_CLIENT_SECRET", prefix));
            if let (Some(client_id), Some(client_secret)) = (id, secret) {
                provider_credentials.insert(
                    name.to_string(),
                    ProviderCredentials {
                        client_id,
                        client_secret,
                    },
                );
            }
        }

        Ok(Config {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port,
            database_url: non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            enable_redis: flag("ENABLE_REDIS"),
            redis_url: non_empty("REDIS_URL").unwrap_or(defaults.redis_url),
            session_secret: non_empty("SESSION_SECRET").unwrap_or(defaults.session_secret),
            product_name: non_empty("PRODUCT_NAME").unwrap_or(defaults.product_name),
            frontend_url: non_empty("FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
            engine_base_url: non_empty("ENGINE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.engine_base_url),
            engine_api_key: non_empty("ENGINE_API_KEY"),
            engine_timeout_secs,
            webhook_secret: non_empty("WEBHOOK_SECRET"),
            provider_credentials,
        })
    }

    /// Frontend route the provider redirects back to when the caller gave none.
    pub fn default_oauth_redirect(&self) -> String {
        format!("{}/oauth/callback", self.frontend_url)
    }
}

// Unset and blank values are the same thing here.
fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag(key: &str) -> bool {
    non_empty(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
