use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationStatus {
    Active,
    Paused,
    Error,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Active => "Active",
            IntegrationStatus::Paused => "Paused",
            IntegrationStatus::Error => "Error",
        }
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(IntegrationStatus::Active),
            "Paused" => Ok(IntegrationStatus::Paused),
            "Error" => Ok(IntegrationStatus::Error),
            other => Err(format!("unknown integration status: {}", other)),
        }
    }
}

/// A user's source to destination flow and its remote workflow binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub user_id: String,
    pub flow_name: String,
    pub source_app: String,
    pub target_app: String,
    /// Raw configuration JSON as stored; parsed leniently by `flow_config`.
    pub config: String,
    pub workflow_id: Option<String>,
    pub status: IntegrationStatus,
    pub last_run: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Integration {
    pub fn new(
        user_id: &str,
        flow_name: &str,
        source_app: &str,
        target_app: &str,
        config: Option<&Value>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Integration {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            flow_name: flow_name.to_string(),
            source_app: source_app.to_string(),
            target_app: target_app.to_string(),
            config: config.map(|c| c.to_string()).unwrap_or_else(|| "{}".to_string()),
            workflow_id: None,
            status: IntegrationStatus::Active,
            last_run: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &libsql::Row) -> Result<Self, libsql::Error> {
        let status: String = row.get(7)?;
        Ok(Integration {
            id: row.get(0)?,
            user_id: row.get(1)?,
            flow_name: row.get(2)?,
            source_app: row.get(3)?,
            target_app: row.get(4)?,
            config: row.get(5)?,
            workflow_id: row.get(6)?,
            // Unknown labels surface as Error so they are visible to the owner.
            status: status.parse().unwrap_or(IntegrationStatus::Error),
            last_run: row.get(8)?,
            error_message: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig::parse(&self.config)
    }

    pub fn mark_active(&mut self) {
        self.status = IntegrationStatus::Active;
    }

    pub fn mark_paused(&mut self, reason: Option<String>) {
        self.status = IntegrationStatus::Paused;
        if reason.is_some() {
            self.error_message = reason;
        }
    }

    /// Successful run reported by the engine.
    pub fn mark_completed(&mut self, at: i64) {
        self.status = IntegrationStatus::Active;
        self.last_run = Some(at);
        self.error_message = None;
    }

    pub fn mark_error(&mut self, message: String) {
        self.status = IntegrationStatus::Error;
        self.error_message = Some(message);
    }

    pub fn set_workflow_id(&mut self, workflow_id: String) {
        self.workflow_id = Some(workflow_id);
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    pub fn set_config(&mut self, config: &Value) {
        self.config = config.to_string();
    }
}

/// Trigger selected for a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    Manual,
    Schedule(String),
    Realtime,
}

/// Typed view over the stored configuration JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    pub trigger: TriggerKind,
    pub source_resource: Option<String>,
    pub source_fields: Vec<Value>,
    pub source_settings: serde_json::Map<String, Value>,
    pub field_mappings: Vec<String>,
    pub destination_resource: Option<String>,
    pub destination_fields: Vec<Value>,
    pub target_settings: serde_json::Map<String, Value>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            trigger: TriggerKind::Manual,
            source_resource: None,
            source_fields: Vec::new(),
            source_settings: serde_json::Map::new(),
            field_mappings: Vec::new(),
            destination_resource: None,
            destination_fields: Vec::new(),
            target_settings: serde_json::Map::new(),
        }
    }
}

impl FlowConfig {
    /// Malformed or non-object JSON yields the default configuration.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            _ => FlowConfig::default(),
        }
    }

    fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let trigger = match map.get("trigger").and_then(Value::as_str) {
            Some("schedule") => TriggerKind::Schedule(
                map.get("schedule")
                    .and_then(Value::as_str)
                    .unwrap_or("hourly")
                    .to_string(),
            ),
            Some("realtime") => TriggerKind::Realtime,
            _ => TriggerKind::Manual,
        };

        FlowConfig {
            trigger,
            source_resource: resource_id(map.get("sourceResource")),
            source_fields: array(map.get("sourceFields")),
            source_settings: object(map.get("source_settings")),
            field_mappings: array(map.get("fieldMappings"))
                .into_iter()
                .map(|m| match m {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
            destination_resource: resource_id(map.get("destinationResource")),
            destination_fields: array(map.get("destinationFields")),
            target_settings: object(map.get("target_settings")),
        }
    }
}

// Resources arrive either as {"id": ...} objects or bare ids.
fn resource_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => match obj.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        },
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn array(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn object(value: Option<&Value>) -> serde_json::Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    Started,
    Success,
    Error,
    Warning,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Started => "Started",
            LogStatus::Success => "Success",
            LogStatus::Error => "Error",
            LogStatus::Warning => "Warning",
        }
    }
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Started" => Ok(LogStatus::Started),
            "Success" => Ok(LogStatus::Success),
            "Error" => Ok(LogStatus::Error),
            "Warning" => Ok(LogStatus::Warning),
            other => Err(format!("unknown log status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLog {
    pub id: i64,
    pub integration_id: String,
    pub status: LogStatus,
    pub message: String,
    pub execution_time: Option<f64>,
    pub timestamp: i64,
}

impl IntegrationLog {
    pub fn from_row(row: &libsql::Row) -> Result<Self, libsql::Error> {
        let status: String = row.get(2)?;
        Ok(IntegrationLog {
            id: row.get(0)?,
            integration_id: row.get(1)?,
            status: status.parse().unwrap_or(LogStatus::Error),
            message: row.get(3)?,
            execution_time: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        assert_eq!(FlowConfig::parse("{not json"), FlowConfig::default());
        assert_eq!(FlowConfig::parse("[1,2]"), FlowConfig::default());
        assert_eq!(FlowConfig::parse(""), FlowConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let raw = json!({
            "trigger": "schedule",
            "schedule": "daily",
            "sourceResource": {"id": "INBOX"},
            "sourceFields": ["from", "subject"],
            "fieldMappings": ["Email", "", null, "Title"],
            "destinationResource": "sheet1",
            "target_settings": {"spreadsheet_id": "abc"}
        })
        .to_string();

        let config = FlowConfig::parse(&raw);
        assert_eq!(config.trigger, TriggerKind::Schedule("daily".to_string()));
        assert_eq!(config.source_resource.as_deref(), Some("INBOX"));
        assert_eq!(config.source_fields.len(), 2);
        assert_eq!(config.field_mappings, vec!["Email", "", "", "Title"]);
        assert_eq!(config.destination_resource.as_deref(), Some("sheet1"));
        assert_eq!(config.target_settings["spreadsheet_id"], "abc");
    }

    #[test]
    fn test_schedule_without_interval_defaults_to_hourly() {
        let config = FlowConfig::parse(r#"{"trigger":"schedule"}"#);
        assert_eq!(config.trigger, TriggerKind::Schedule("hourly".to_string()));
    }

    #[test]
    fn test_status_transitions() {
        let mut integration = Integration::new("u1", "Flow", "gmail", "slack", None);
        assert_eq!(integration.status, IntegrationStatus::Active);
        assert_eq!(integration.config, "{}");

        integration.mark_error("boom".to_string());
        assert_eq!(integration.status, IntegrationStatus::Error);
        assert_eq!(integration.error_message.as_deref(), Some("boom"));

        integration.mark_completed(42);
        assert_eq!(integration.status, IntegrationStatus::Active);
        assert_eq!(integration.last_run, Some(42));
        assert!(integration.error_message.is_none());
    }
}
