//! Translates a flow's stored configuration into an engine workflow graph.
//!
//! The output is a strict chain: trigger, source, optional field mapping,
//! destination. Everything here is a pure function of the integration, so
//! rebuilding an unchanged flow yields an identical graph.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::models::{FlowConfig, Integration, IntegrationStatus, TriggerKind};
use crate::services::registry;

const TRIGGER_POSITION: [i64; 2] = [50, 300];
const SOURCE_POSITION: [i64; 2] = [300, 300];
const MAPPING_POSITION: [i64; 2] = [500, 300];
const TARGET_POSITION: [i64; 2] = [700, 300];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub parameters: Map<String, Value>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub type_version: u32,
    pub position: [i64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeConnections {
    pub main: Vec<Vec<ConnectionTarget>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowGraph {
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    pub connections: BTreeMap<String, NodeConnections>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    pub settings: Value,
}

impl WorkflowGraph {
    /// Remove the active flag (rejected by the engine on creation) and return it.
    pub fn take_active(&mut self) -> bool {
        self.active.take().unwrap_or(false)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn connect(&mut self, from: &str, to: &str) {
        self.connections.insert(
            from.to_string(),
            NodeConnections {
                main: vec![vec![ConnectionTarget {
                    node: to.to_string(),
                    kind: "main".to_string(),
                    index: 0,
                }]],
            },
        );
    }
}

pub fn cron_expression(schedule: &str) -> &'static str {
    match schedule {
        "15min" => "*/15 * * * *",
        "hourly" => "0 * * * *",
        "daily" => "0 0 * * *",
        "weekly" => "0 0 * * 0",
        _ => "0 * * * *",
    }
}

fn slug(product_name: &str) -> String {
    let slug: String = product_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    slug.trim_matches('-').to_string()
}

fn trigger_node(trigger: &TriggerKind, integration_id: &str, product_name: &str) -> WorkflowNode {
    match trigger {
        TriggerKind::Schedule(schedule) => WorkflowNode {
            parameters: object(json!({
                "rule": { "interval": [{ "cronExpression": cron_expression(schedule) }] }
            })),
            name: "Schedule Trigger".to_string(),
            node_type: "n8n-nodes-base.scheduleTrigger".to_string(),
            type_version: 1,
            position: TRIGGER_POSITION,
            webhook_id: None,
        },
        TriggerKind::Realtime => {
            // Derived from the integration id so a re-created workflow keeps its URL.
            let path = format!("{}-{}", slug(product_name), integration_id);
            WorkflowNode {
                parameters: object(json!({
                    "httpMethod": "POST",
                    "path": path,
                    "responseMode": "onReceived",
                    "responseData": "firstEntryJson"
                })),
                name: "Webhook Trigger".to_string(),
                node_type: "n8n-nodes-base.webhook".to_string(),
                type_version: 1,
                position: TRIGGER_POSITION,
                webhook_id: Some(path),
            }
        }
        TriggerKind::Manual => WorkflowNode {
            parameters: Map::new(),
            name: "Manual Trigger".to_string(),
            node_type: "n8n-nodes-base.manualTrigger".to_string(),
            type_version: 1,
            position: TRIGGER_POSITION,
            webhook_id: None,
        },
    }
}

fn app_node(
    app_id: &str,
    name: String,
    position: [i64; 2],
    settings: &Map<String, Value>,
    resource: Option<&str>,
    operation: &str,
    fields: &[Value],
) -> WorkflowNode {
    let mut parameters = registry::node_parameters(app_id, settings);
    if let Some(resource) = resource {
        parameters.insert("resource".to_string(), json!(resource));
        parameters.insert("operation".to_string(), json!(operation));
    }
    if !fields.is_empty() {
        parameters.insert("fields".to_string(), Value::Array(fields.to_vec()));
    }

    WorkflowNode {
        parameters,
        name,
        node_type: registry::node_type(app_id),
        type_version: 1,
        position,
        webhook_id: None,
    }
}

/// Set node assigning each non-empty destination field from the source item.
///
/// Source values are addressed by their position in the mapping list.
fn mapping_node(field_mappings: &[String]) -> WorkflowNode {
    let assignments: Vec<Value> = field_mappings
        .iter()
        .enumerate()
        .filter(|(_, destination)| !destination.is_empty())
        .map(|(idx, destination)| {
            json!({
                "name": destination,
                "value": format!("={{{{$json[\"{}\"]}}}}", idx),
                "type": "string"
            })
        })
        .collect();

    WorkflowNode {
        parameters: object(json!({
            "mode": "manual",
            "duplicateItem": false,
            "assignments": { "assignments": assignments }
        })),
        name: "Map Fields".to_string(),
        node_type: "n8n-nodes-base.set".to_string(),
        type_version: 3,
        position: MAPPING_POSITION,
        webhook_id: None,
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn build(integration: &Integration, product_name: &str) -> WorkflowGraph {
    build_from_config(integration, &integration.flow_config(), product_name)
}

pub fn build_from_config(
    integration: &Integration,
    config: &FlowConfig,
    product_name: &str,
) -> WorkflowGraph {
    let trigger = trigger_node(&config.trigger, &integration.id, product_name);

    let source = app_node(
        &integration.source_app,
        format!("Get from {}", registry::title_case(&integration.source_app)),
        SOURCE_POSITION,
        &config.source_settings,
        config.source_resource.as_deref(),
        "getAll",
        &config.source_fields,
    );

    let target = app_node(
        &integration.target_app,
        format!("Send to {}", registry::title_case(&integration.target_app)),
        TARGET_POSITION,
        &config.target_settings,
        config.destination_resource.as_deref(),
        "create",
        &config.destination_fields,
    );

    let mapping = (!config.field_mappings.is_empty()).then(|| mapping_node(&config.field_mappings));

    let mut chain = vec![trigger, source];
    chain.extend(mapping);
    chain.push(target);

    let mut graph = WorkflowGraph {
        name: format!("{}: {}", product_name, integration.flow_name),
        nodes: Vec::with_capacity(chain.len()),
        connections: BTreeMap::new(),
        active: Some(integration.status == IntegrationStatus::Active),
        settings: json!({ "executionOrder": "v1" }),
    };

    for pair in chain.windows(2) {
        graph.connect(&pair[0].name, &pair[1].name);
    }
    graph.nodes = chain;
    graph
}
