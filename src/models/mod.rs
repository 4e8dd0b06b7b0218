pub mod catalog;
pub mod integration;
pub mod oauth_token;
pub mod provider;

pub use catalog::CatalogApp;
pub use integration::{
    FlowConfig, Integration, IntegrationLog, IntegrationStatus, LogStatus, TriggerKind,
};
pub use oauth_token::{OAuthToken, TokenResponse};
pub use provider::{CredentialSettings, ProviderConfig};
