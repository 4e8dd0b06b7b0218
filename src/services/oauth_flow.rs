use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use validator::Validate;

use crate::error::{truncate_message, AppError, AppResult, MAX_MESSAGE_LEN};
use crate::models::{CredentialSettings, OAuthToken, ProviderConfig, TokenResponse};
use crate::services::best_effort;
use crate::services::integration_sync::IntegrationSync;
use crate::services::oauth_state::{OAuthState, OAuthStateStore};
use crate::services::provider_config::ProviderConfigResolver;
use crate::services::registry::title_case;
use crate::services::settings::{AppSettingsStore, CredentialSettingsStore};
use crate::services::token_store::TokenStore;

const DEFAULT_POST_AUTH_REDIRECT: &str = "/app";

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    pub message: String,
    pub redirect_uri: String,
}

/// How a user chooses to register the OAuth client for a provider.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OAuthSetupRequest {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    /// `default` (shared client from the environment) or `manual`.
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub use_default: bool,
}

fn default_tier() -> String {
    "manual".to_string()
}

/// Authorization-code flow across every configured provider.
#[derive(Clone)]
pub struct OAuthFlow {
    http: Client,
    resolver: ProviderConfigResolver,
    credentials: CredentialSettingsStore,
    states: OAuthStateStore,
    tokens: TokenStore,
    apps: AppSettingsStore,
    sync: IntegrationSync,
    default_redirect: String,
}

impl OAuthFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: Client,
        resolver: ProviderConfigResolver,
        credentials: CredentialSettingsStore,
        states: OAuthStateStore,
        tokens: TokenStore,
        apps: AppSettingsStore,
        sync: IntegrationSync,
        default_redirect: String,
    ) -> Self {
        Self {
            http,
            resolver,
            credentials,
            states,
            tokens,
            apps,
            sync,
            default_redirect,
        }
    }

    pub async fn initiate(
        &self,
        user_id: &str,
        provider: &str,
        redirect_uri: Option<String>,
    ) -> AppResult<AuthorizationRequest> {
        let config = self.resolver.resolve(provider).await?;

        let state = self
            .states
            .issue(&OAuthState {
                provider: provider.to_string(),
                user: user_id.to_string(),
                redirect_uri: redirect_uri.clone(),
                issued_at: 0,
            })
            .await?;

        let redirect = redirect_uri.unwrap_or_else(|| self.default_redirect.clone());
        let authorization_url = build_authorization_url(&config, &state, &redirect)?;

        debug!("Generated authorization URL for {}", provider);
        Ok(AuthorizationRequest {
            authorization_url,
            state,
        })
    }

    /// Validate the returned state, exchange the code and store the token.
    ///
    /// The state is claimed atomically, so concurrent callbacks cannot both
    /// redeem it. Any failure puts it back; only a completed exchange consumes it.
    pub async fn callback(&self, code: &str, state: &str, provider: &str) -> AppResult<CallbackOutcome> {
        let pending = self.states.take(state).await?.ok_or(AppError::InvalidState)?;

        match self.complete(code, provider, &pending).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                best_effort(
                    "Restoring OAuth state after failed callback",
                    self.states.restore(state, &pending),
                    (),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn complete(&self, code: &str, provider: &str, pending: &OAuthState) -> AppResult<CallbackOutcome> {
        if pending.provider != provider {
            return Err(AppError::ProviderMismatch {
                expected: pending.provider.clone(),
                actual: provider.to_string(),
            });
        }

        let config = self.resolver.resolve(provider).await?;
        let redirect = pending
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.default_redirect.clone());
        let tokens = self.exchange_code_for_tokens(&config, code, &redirect).await?;

        let token = self.tokens.upsert(&pending.user, provider, &tokens).await?;

        best_effort(
            &format!("Enabling connected app for {}", provider),
            async {
                if let Some(app) = self.apps.find_app_for_provider(provider).await? {
                    self.apps.mark_connected(&pending.user, &app, provider).await?;
                }
                Ok::<(), AppError>(())
            },
            (),
        )
        .await;

        self.push_credentials(provider, &pending.user, &token).await;

        info!("OAuth connection for {} completed by user {}", provider, pending.user);
        Ok(CallbackOutcome {
            message: "OAuth authentication successful".to_string(),
            redirect_uri: pending
                .redirect_uri
                .clone()
                .unwrap_or_else(|| DEFAULT_POST_AUTH_REDIRECT.to_string()),
        })
    }

    pub async fn exchange_code_for_tokens(
        &self,
        config: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
    ) -> AppResult<TokenResponse> {
        self.token_request(
            &config.token_url,
            &[
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    /// Exchange the stored refresh token for a new access token.
    pub async fn refresh(&self, provider: &str, user_id: &str) -> AppResult<()> {
        let token = self
            .tokens
            .get(user_id, provider)
            .await?
            .ok_or_else(|| AppError::NoRefreshToken(provider.to_string()))?;
        let refresh_token = token
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::NoRefreshToken(provider.to_string()))?;

        let config = self.resolver.resolve(provider).await?;
        let tokens = self
            .token_request(
                &config.token_url,
                &[
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.as_str()),
                    ("refresh_token", refresh_token.as_str()),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await?;

        self.tokens.apply_refresh(&token, &tokens).await?;
        info!("Refreshed {} token for user {}", provider, user_id);

        if let Some(updated) = self.tokens.get(user_id, provider).await? {
            self.push_credentials(provider, user_id, &updated).await;
        }
        Ok(())
    }

    /// Upsert client registrations; the last write for a provider wins.
    pub async fn save_credentials(&self, credentials: &[CredentialSettings]) -> AppResult<usize> {
        for entry in credentials {
            entry
                .validate()
                .map_err(|e| AppError::Validation(e.to_string()))?;
        }
        self.credentials.save(credentials).await
    }

    pub fn default_credentials_available(&self, provider: &str) -> Value {
        match self.resolver.default_credentials(provider) {
            Some(creds) => json!({
                "available": true,
                "client_id": creds.client_id,
                "message": format!("Default {} OAuth app is configured", title_case(provider))
            }),
            None => json!({
                "available": false,
                "message": format!(
                    "No default {} OAuth credentials configured. Please use manual setup.",
                    title_case(provider)
                )
            }),
        }
    }

    /// Record the user's setup choice. Manual setups are saved as credential
    /// settings; the default tier only checks the shared client exists.
    pub async fn save_setup(&self, request: &OAuthSetupRequest) -> AppResult<Value> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let provider = request.provider.as_str();

        if request.use_default || request.tier == "default" {
            if self.resolver.default_credentials(provider).is_none() {
                return Err(AppError::Configuration(format!(
                    "Default OAuth app for {} is not configured. Please use manual setup.",
                    provider
                )));
            }
            return Ok(json!({
                "success": true,
                "message": format!("Using the shared {} app", title_case(provider)),
                "tier": "default",
                "ready_to_connect": true
            }));
        }

        if request.tier != "manual" {
            return Err(AppError::Validation(format!(
                "Unsupported setup tier '{}'",
                request.tier
            )));
        }

        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (Some(client_id), Some(client_secret)) =
            (non_blank(&request.client_id), non_blank(&request.client_secret))
        else {
            return Err(AppError::Validation(
                "Client ID and Client Secret are required for manual setup".to_string(),
            ));
        };

        self.save_credentials(&[CredentialSettings {
            provider: provider.to_string(),
            client_id: Some(client_id),
            client_secret: Some(client_secret),
            auth_url: None,
            token_url: None,
            scope: None,
        }])
        .await?;

        info!("Saved manual OAuth setup for {}", provider);
        Ok(json!({
            "success": true,
            "message": format!("OAuth credentials for {} saved successfully", provider),
            "tier": "manual",
            "ready_to_connect": true
        }))
    }

    async fn push_credentials(&self, provider: &str, user_id: &str, token: &OAuthToken) {
        if !self.sync.engine_enabled() {
            return;
        }
        best_effort(
            &format!("Syncing {} credentials to engine", provider),
            async {
                self.sync
                    .sync_oauth_credentials(provider, user_id, token)
                    .await
                    .map(|_| ())
            },
            (),
        )
        .await;
    }

    async fn token_request(&self, token_url: &str, params: &[(&str, &str)]) -> AppResult<TokenResponse> {
        let response = self
            .http
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!("Token request to {} failed: {}", token_url, e);
                AppError::TokenExchange {
                    status: 0,
                    body: truncate_message(&e.to_string(), MAX_MESSAGE_LEN),
                }
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Token endpoint {} returned {}", token_url, status);
            return Err(AppError::TokenExchange {
                status: status.as_u16(),
                body: truncate_message(&body, MAX_MESSAGE_LEN),
            });
        }

        TokenResponse::from_body(status.as_u16(), &body)
    }
}

pub fn build_authorization_url(config: &ProviderConfig, state: &str, redirect_uri: &str) -> AppResult<String> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", config.scope.as_str()),
        ("state", state),
        ("response_type", "code"),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ];
    let url = reqwest::Url::parse_with_params(&config.auth_url, &params).map_err(|e| {
        AppError::Configuration(format!(
            "Invalid authorization URL for {}: {}",
            config.provider, e
        ))
    })?;
    Ok(url.to_string())
}
