use serde::{Deserialize, Serialize};
use validator::Validate;

/// Resolved OAuth application registration for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scope: String,
}

/// Row of `oauth_credential_settings`, also the settings API payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CredentialSettings {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub auth_url: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl CredentialSettings {
    pub fn from_row(row: &libsql::Row) -> Result<Self, libsql::Error> {
        Ok(CredentialSettings {
            provider: row.get(0)?,
            client_id: row.get(1)?,
            client_secret: row.get(2)?,
            auth_url: row.get(3)?,
            token_url: row.get(4)?,
            scope: row.get(5)?,
        })
    }

    /// Both halves of the client registration are present and non-blank.
    pub fn has_client(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.client_id) && filled(&self.client_secret)
    }
}
