use std::collections::HashMap;
use tracing::warn;

use crate::config::ProviderCredentials;
use crate::error::{AppError, AppResult};
use crate::models::{CredentialSettings, ProviderConfig};
use crate::services::registry::PROVIDERS;
use crate::services::settings::CredentialSettingsStore;

/// Resolves client credentials and endpoints for a provider.
///
/// A settings row carrying both client id and secret wins; its endpoint
/// overrides are layered over the static registry. Otherwise the
/// environment credentials are paired with the registry endpoints.
#[derive(Clone)]
pub struct ProviderConfigResolver {
    settings: CredentialSettingsStore,
    env_credentials: HashMap<String, ProviderCredentials>,
}

impl ProviderConfigResolver {
    pub fn new(
        settings: CredentialSettingsStore,
        env_credentials: HashMap<String, ProviderCredentials>,
    ) -> Self {
        Self {
            settings,
            env_credentials,
        }
    }

    /// Shared client registration from the environment, if one is configured.
    pub fn default_credentials(&self, provider: &str) -> Option<&ProviderCredentials> {
        self.env_credentials.get(provider)
    }

    pub async fn resolve(&self, provider: &str) -> AppResult<ProviderConfig> {
        let stored = match self.settings.get(provider).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read credential settings for {}: {}", provider, e);
                None
            }
        };

        if let Some(stored) = stored.filter(CredentialSettings::has_client) {
            return Self::from_settings(provider, stored);
        }

        let endpoints = PROVIDERS.get(provider).ok_or_else(|| {
            AppError::Configuration(format!("Provider {} not configured", provider))
        })?;

        let creds = self.env_credentials.get(provider).ok_or_else(|| {
            AppError::Configuration(format!(
                "OAuth credentials for {} not configured. Please set up OAuth credentials first.",
                provider
            ))
        })?;

        Ok(ProviderConfig {
            provider: provider.to_string(),
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
            auth_url: endpoints.auth_url.to_string(),
            token_url: endpoints.token_url.to_string(),
            scope: endpoints.scope.to_string(),
        })
    }

    fn from_settings(provider: &str, stored: CredentialSettings) -> AppResult<ProviderConfig> {
        let endpoints = PROVIDERS.get(provider);

        let pick = |over: Option<String>, base: Option<&str>, what: &str| {
            over.filter(|v| !v.trim().is_empty())
                .or_else(|| base.map(str::to_string))
                .ok_or_else(|| {
                    AppError::Configuration(format!(
                        "Provider {} not configured: missing {}",
                        provider, what
                    ))
                })
        };

        Ok(ProviderConfig {
            provider: provider.to_string(),
            auth_url: pick(stored.auth_url, endpoints.map(|e| e.auth_url), "auth_url")?,
            token_url: pick(stored.token_url, endpoints.map(|e| e.token_url), "token_url")?,
            scope: stored
                .scope
                .or_else(|| endpoints.map(|e| e.scope.to_string()))
                .unwrap_or_default(),
            client_id: stored.client_id.unwrap_or_default(),
            client_secret: stored.client_secret.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn resolver(env: &[(&str, &str)]) -> (ProviderConfigResolver, CredentialSettingsStore) {
        let store = CredentialSettingsStore::new(Database::in_memory().await);
        let env_credentials = env
            .iter()
            .map(|(p, id)| {
                (
                    p.to_string(),
                    ProviderCredentials {
                        client_id: id.to_string(),
                        client_secret: "env-secret".to_string(),
                    },
                )
            })
            .collect();
        (
            ProviderConfigResolver::new(store.clone(), env_credentials),
            store,
        )
    }

    #[tokio::test]
    async fn test_environment_fallback_uses_registry_endpoints() {
        let (resolver, _) = resolver(&[("google", "env-id")]).await;
        let config = resolver.resolve("google").await.unwrap();
        assert_eq!(config.client_id, "env-id");
        assert_eq!(config.token_url, "https://oauth2.googleapis.com/token");
        assert!(config.scope.contains("spreadsheets"));
    }

    #[tokio::test]
    async fn test_settings_take_precedence_and_override_urls() {
        let (resolver, store) = resolver(&[("slack", "env-id")]).await;
        store
            .save(&[CredentialSettings {
                provider: "slack".to_string(),
                client_id: Some("db-id".to_string()),
                client_secret: Some("db-secret".to_string()),
                auth_url: None,
                token_url: Some("http://127.0.0.1:9/token".to_string()),
                scope: None,
            }])
            .await
            .unwrap();

        let config = resolver.resolve("slack").await.unwrap();
        assert_eq!(config.client_id, "db-id");
        assert_eq!(config.token_url, "http://127.0.0.1:9/token");
        assert_eq!(config.auth_url, "https://slack.com/oauth/v2/authorize");
    }

    #[tokio::test]
    async fn test_incomplete_settings_row_is_ignored() {
        let (resolver, store) = resolver(&[]).await;
        store
            .save(&[CredentialSettings {
                provider: "xero".to_string(),
                client_id: Some("only-id".to_string()),
                client_secret: None,
                auth_url: None,
                token_url: None,
                scope: None,
            }])
            .await
            .unwrap();

        let err = resolver.resolve("xero").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_configuration_error() {
        let (resolver, _) = resolver(&[]).await;
        assert!(matches!(
            resolver.resolve("myspace").await.unwrap_err(),
            AppError::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn test_custom_provider_defined_entirely_by_settings() {
        let (resolver, store) = resolver(&[]).await;
        store
            .save(&[CredentialSettings {
                provider: "acme".to_string(),
                client_id: Some("id".to_string()),
                client_secret: Some("secret".to_string()),
                auth_url: Some("https://acme.test/auth".to_string()),
                token_url: Some("https://acme.test/token".to_string()),
                scope: Some("read".to_string()),
            }])
            .await
            .unwrap();

        let config = resolver.resolve("acme").await.unwrap();
        assert_eq!(config.auth_url, "https://acme.test/auth");
        assert_eq!(config.scope, "read");
    }
}
