use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{truncate_message, AppError, AppResult, MAX_MESSAGE_LEN};

/// Stored OAuth credential, unique per (user_id, provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>, // Unix timestamp
    #[serde(skip_serializing)]
    pub raw_payload: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OAuthToken {
    pub fn from_row(row: &libsql::Row) -> Result<Self, libsql::Error> {
        Ok(OAuthToken {
            id: row.get(0)?,
            user_id: row.get(1)?,
            provider: row.get(2)?,
            access_token: row.get(3)?,
            refresh_token: row.get(4)?,
            expires_at: row.get(5)?,
            raw_payload: row
                .get::<Option<String>>(6)?
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// Token endpoint response for both authorization_code and refresh_token grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl TokenResponse {
    /// Parse a provider body, keeping the untouched payload alongside.
    pub fn from_body(status: u16, body: &str) -> AppResult<Self> {
        let raw: serde_json::Value =
            serde_json::from_str(body).map_err(|_| AppError::TokenExchange {
                status,
                body: truncate_message(body, MAX_MESSAGE_LEN),
            })?;
        let mut token: TokenResponse =
            serde_json::from_value(raw.clone()).map_err(|_| AppError::TokenExchange {
                status,
                body: truncate_message(body, MAX_MESSAGE_LEN),
            })?;
        token.raw = raw;
        Ok(token)
    }

    /// Absolute expiry, or None when the provider did not say.
    pub fn expires_at(&self, now: i64) -> Option<i64> {
        self.expires_in.and_then(|secs| now.checked_add(secs))
    }
}

// Some providers send `expires_in` as a string; unparseable values mean no expiry.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    })
}
