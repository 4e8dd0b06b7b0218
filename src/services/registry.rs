//! Static lookup tables for OAuth providers and catalog apps.
//!
//! Each concern (endpoints, engine node types, credential types, parameter
//! shapes, fallback resources) lives in exactly one table so adding an app
//! or provider is a data change.

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Authorization and token endpoints of a known OAuth provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderEndpoints {
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub scope: &'static str,
}

pub static PROVIDERS: Lazy<HashMap<&'static str, ProviderEndpoints>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "xero",
        ProviderEndpoints {
            auth_url: "https://login.xero.com/identity/connect/authorize",
            token_url: "https://identity.xero.com/connect/token",
            scope: "accounting.transactions accounting.contacts offline_access",
        },
    );
    m.insert(
        "google",
        ProviderEndpoints {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            scope: "https://www.googleapis.com/auth/gmail.readonly https://www.googleapis.com/auth/gmail.send https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.file",
        },
    );
    m.insert(
        "slack",
        ProviderEndpoints {
            auth_url: "https://slack.com/oauth/v2/authorize",
            token_url: "https://slack.com/api/oauth.v2.access",
            scope: "channels:read channels:write chat:write",
        },
    );
    m.insert(
        "hubspot",
        ProviderEndpoints {
            auth_url: "https://app.hubspot.com/oauth/authorize",
            token_url: "https://api.hubapi.com/oauth/v1/token",
            scope: "crm.objects.contacts.read crm.objects.contacts.write",
        },
    );
    m
});

/// Engine credential type for a provider's OAuth tokens.
pub fn credential_type(provider: &str) -> String {
    match provider {
        "google" => "googleOAuth2Api".to_string(),
        "slack" => "slackOAuth2Api".to_string(),
        "xero" => "xeroOAuth2Api".to_string(),
        "hubspot" => "hubspotOAuth2Api".to_string(),
        other => format!("{}OAuth2Api", other),
    }
}

/// "google_sheets" -> "Google Sheets"
pub fn title_case(id: &str) -> String {
    id.split(|c| c == '_' || c == ' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub type ParameterMapper = fn(&Map<String, Value>) -> Map<String, Value>;

#[derive(Debug, Clone)]
pub struct Resource {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
}

/// Everything the broker knows about one catalog app.
#[derive(Clone)]
pub struct AppEntry {
    pub id: &'static str,
    pub display_name: &'static str,
    pub node_type: &'static str,
    pub oauth_provider: &'static str,
    pub parameters: ParameterMapper,
    /// Engine load-options method used for resource discovery.
    pub resource_method: &'static str,
    pub fallback_resources: &'static [Resource],
    pub fallback_fields: &'static [Field],
}

impl AppEntry {
    pub fn credential_type(&self) -> String {
        credential_type(self.oauth_provider)
    }
}

const GMAIL_RESOURCES: &[Resource] = &[
    Resource { id: "INBOX", name: "Inbox", kind: "mailbox" },
    Resource { id: "SENT", name: "Sent Mail", kind: "mailbox" },
    Resource { id: "DRAFT", name: "Drafts", kind: "mailbox" },
    Resource { id: "STARRED", name: "Starred", kind: "label" },
];

const GMAIL_FIELDS: &[Field] = &[
    Field { id: "from", name: "From", kind: "email" },
    Field { id: "to", name: "To", kind: "email" },
    Field { id: "subject", name: "Subject", kind: "string" },
    Field { id: "body", name: "Body", kind: "text" },
    Field { id: "date", name: "Date", kind: "datetime" },
    Field { id: "labels", name: "Labels", kind: "array" },
];

pub const GENERIC_FIELDS: &[Field] = &[
    Field { id: "id", name: "ID", kind: "string" },
    Field { id: "name", name: "Name", kind: "string" },
    Field { id: "created_at", name: "Created At", kind: "datetime" },
];

fn setting(settings: &Map<String, Value>, key: &str, default: Value) -> Value {
    settings.get(key).cloned().unwrap_or(default)
}

fn slack_parameters(s: &Map<String, Value>) -> Map<String, Value> {
    let mut p = Map::new();
    p.insert("channel".into(), setting(s, "channel", json!("#general")));
    p.insert("text".into(), setting(s, "message_template", json!("{{$json.message}}")));
    p.insert("attachments".into(), setting(s, "attachments", json!([])));
    p
}

fn sheets_parameters(s: &Map<String, Value>) -> Map<String, Value> {
    let mut p = Map::new();
    p.insert("sheetId".into(), setting(s, "spreadsheet_id", Value::Null));
    p.insert("range".into(), setting(s, "range", json!("Sheet1!A1:Z1000")));
    p.insert(
        "valueInputOption".into(),
        setting(s, "value_input_option", json!("USER_ENTERED")),
    );
    p
}

fn gmail_parameters(s: &Map<String, Value>) -> Map<String, Value> {
    let mut p = Map::new();
    p.insert("to".into(), setting(s, "recipient", Value::Null));
    p.insert("subject".into(), setting(s, "subject_template", json!("{{$json.subject}}")));
    p.insert("message".into(), setting(s, "body_template", json!("{{$json.body}}")));
    p
}

fn jira_parameters(s: &Map<String, Value>) -> Map<String, Value> {
    let mut p = Map::new();
    p.insert("project".into(), setting(s, "project_key", Value::Null));
    p.insert("issueType".into(), setting(s, "issue_type", json!("Task")));
    p.insert("summary".into(), setting(s, "summary_template", json!("{{$json.title}}")));
    p
}

fn passthrough_parameters(s: &Map<String, Value>) -> Map<String, Value> {
    s.clone()
}

pub static APPS: Lazy<HashMap<&'static str, AppEntry>> = Lazy::new(|| {
    let apps = [
        AppEntry {
            id: "gmail",
            display_name: "Gmail",
            node_type: "n8n-nodes-base.gmail",
            oauth_provider: "google",
            parameters: gmail_parameters,
            resource_method: "getLabels",
            fallback_resources: GMAIL_RESOURCES,
            fallback_fields: GMAIL_FIELDS,
        },
        AppEntry {
            id: "google_sheets",
            display_name: "Google Sheets",
            node_type: "n8n-nodes-base.googleSheets",
            oauth_provider: "google",
            parameters: sheets_parameters,
            resource_method: "getSheets",
            fallback_resources: &[],
            fallback_fields: &[],
        },
        AppEntry {
            id: "google_drive",
            display_name: "Google Drive",
            node_type: "n8n-nodes-base.googleDrive",
            oauth_provider: "google",
            parameters: passthrough_parameters,
            resource_method: "getDrives",
            fallback_resources: &[],
            fallback_fields: GENERIC_FIELDS,
        },
        AppEntry {
            id: "slack",
            display_name: "Slack",
            node_type: "n8n-nodes-base.slack",
            oauth_provider: "slack",
            parameters: slack_parameters,
            resource_method: "getChannels",
            fallback_resources: &[],
            fallback_fields: GENERIC_FIELDS,
        },
        AppEntry {
            id: "jira",
            display_name: "Jira",
            node_type: "n8n-nodes-base.jira",
            oauth_provider: "jira",
            parameters: jira_parameters,
            resource_method: "getProjects",
            fallback_resources: &[],
            fallback_fields: GENERIC_FIELDS,
        },
        AppEntry {
            id: "hubspot",
            display_name: "HubSpot",
            node_type: "n8n-nodes-base.hubspot",
            oauth_provider: "hubspot",
            parameters: passthrough_parameters,
            resource_method: "getObjectTypes",
            fallback_resources: &[],
            fallback_fields: &[],
        },
        AppEntry {
            id: "xero",
            display_name: "Xero",
            node_type: "n8n-nodes-base.xero",
            oauth_provider: "xero",
            parameters: passthrough_parameters,
            resource_method: "getTenants",
            fallback_resources: &[],
            fallback_fields: GENERIC_FIELDS,
        },
        AppEntry {
            id: "notion",
            display_name: "Notion",
            node_type: "n8n-nodes-base.notion",
            oauth_provider: "notion",
            parameters: passthrough_parameters,
            resource_method: "getDatabases",
            fallback_resources: &[],
            fallback_fields: GENERIC_FIELDS,
        },
        AppEntry {
            id: "salesforce",
            display_name: "Salesforce",
            node_type: "n8n-nodes-base.salesforce",
            oauth_provider: "salesforce",
            parameters: passthrough_parameters,
            resource_method: "getCustomObjects",
            fallback_resources: &[],
            fallback_fields: &[],
        },
        AppEntry {
            id: "mailchimp",
            display_name: "Mailchimp",
            node_type: "n8n-nodes-base.mailchimp",
            oauth_provider: "mailchimp",
            parameters: passthrough_parameters,
            resource_method: "getLists",
            fallback_resources: &[],
            fallback_fields: GENERIC_FIELDS,
        },
    ];
    apps.into_iter().map(|a| (a.id, a)).collect()
});

pub fn app(id: &str) -> Option<&'static AppEntry> {
    APPS.get(id)
}

/// Engine node type for an app, derived for apps outside the catalog.
pub fn node_type(app_id: &str) -> String {
    match app(app_id) {
        Some(entry) => entry.node_type.to_string(),
        None => format!("n8n-nodes-base.{}", app_id),
    }
}

/// Engine node parameters for an app's settings; unknown apps pass through.
pub fn node_parameters(app_id: &str, settings: &Map<String, Value>) -> Map<String, Value> {
    match app(app_id) {
        Some(entry) => (entry.parameters)(settings),
        None => settings.clone(),
    }
}

/// OAuth provider an app authenticates through; apps outside the catalog are their own provider.
pub fn provider_for_app(app_id: &str) -> &str {
    match app(app_id) {
        Some(entry) => entry.oauth_provider,
        None => app_id,
    }
}
