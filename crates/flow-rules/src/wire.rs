//! Controller flow REST wire format
//!
//! Request and response bodies of the `/flows` resource. Only the parts the
//! client reads are typed; anything else the controller reports is kept in
//! `extra` so listings can be printed unchanged.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Criterion and instruction type for pipeline-independent entries.
pub const PROTOCOL_INDEPENDENT: &str = "PROTOCOL_INDEPENDENT";

/// Instruction subtype carrying a table action.
pub const ACTION_SUBTYPE: &str = "ACTION";

/// Match kind used for every criterion the client writes.
pub const TERNARY: &str = "ternary";

/// Rule-creation body for `POST /flows/{deviceId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePayload {
    pub priority: u32,
    pub timeout: u32,
    pub is_permanent: bool,
    pub device_id: String,
    pub table_id: String,
    pub treatment: Treatment,
    pub selector: Selector,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub action_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub criteria: Vec<SelectorCriterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorCriterion {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub matches: Vec<MatchEntry>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A single field match inside a protocol-independent criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub field: String,
    #[serde(rename = "match", default)]
    pub match_kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

/// Body of `GET /flows`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowList {
    #[serde(default)]
    pub flows: Vec<InstalledRule>,
}

/// A rule as the controller reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledRule {
    pub id: String,
    /// Pipeline tables are named; numbered tables are reported as integers.
    #[serde(default, deserialize_with = "string_or_number")]
    pub table_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub selector: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl InstalledRule {
    /// Match entries of every protocol-independent criterion.
    pub fn pi_criteria(&self) -> impl Iterator<Item = &SelectorCriterion> {
        self.selector
            .criteria
            .iter()
            .filter(|c| c.kind == PROTOCOL_INDEPENDENT)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flow_listing_parses_mixed_tables() {
        let body = json!({
            "flows": [
                {
                    "id": "281475000000001",
                    "tableId": "IngressPipeImpl.forward_control.forward_table",
                    "deviceId": "device:s1bmv2",
                    "priority": 40,
                    "selector": {
                        "criteria": [{
                            "type": "PROTOCOL_INDEPENDENT",
                            "matches": [{
                                "field": "standard_metadata.ingress_port",
                                "match": "ternary",
                                "value": "01",
                                "mask": "ff"
                            }]
                        }]
                    }
                },
                {
                    "id": "42",
                    "tableId": 0,
                    "selector": { "criteria": [{ "type": "ETH_TYPE", "ethType": "0x88cc" }] }
                }
            ]
        });
        let list: FlowList = serde_json::from_value(body).unwrap();
        assert_eq!(list.flows.len(), 2);
        assert_eq!(list.flows[0].pi_criteria().count(), 1);
        assert_eq!(list.flows[0].extra["priority"], 40);
        assert_eq!(list.flows[1].table_id, "0");
        assert_eq!(list.flows[1].pi_criteria().count(), 0);
        assert_eq!(list.flows[1].selector.criteria[0].extra["ethType"], "0x88cc");
    }

    #[test]
    fn test_payload_field_names() {
        let payload = RulePayload {
            priority: 40,
            timeout: 1,
            is_permanent: true,
            device_id: "device:s1".to_string(),
            table_id: "t".to_string(),
            treatment: Treatment::default(),
            selector: Selector::default(),
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["isPermanent"], true);
        assert_eq!(v["deviceId"], "device:s1");
        assert_eq!(v["tableId"], "t");
        assert!(v["treatment"]["instructions"].as_array().unwrap().is_empty());
    }
}
