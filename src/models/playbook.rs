use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use strum::{Display, EnumString};
use uuid::Uuid;

/// How a step's failure affects the rest of the run, §3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OnError {
    Stop,
    Continue,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Stop
    }
}

/// A single remediation step. Parsed from one of three YAML shapes (§4.6) and normalised to
/// this canonical form before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, JsonValue>,
    #[serde(default)]
    pub on_error: OnError,
}

/// A precondition predicate evaluated against `{alert: ...}` before execution (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Precondition {
    Equals {
        equals: PathValue,
    },
    Contains {
        contains: PathValue,
    },
    /// Free key/value pairs interpreted as equality against `alert[k]`.
    KeyValue(HashMap<String, JsonValue>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathValue {
    pub path: String,
    pub value: JsonValue,
}

/// `{id: string matching pb-{event_type}-{severity}, version, metadata, preconditions, steps, rollback}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playbook {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub rollback: Vec<Step>,
}

impl Playbook {
    /// `pb-{event_type}-{severity}`, always lower-case.
    pub fn expected_id(event_type: &str, severity: &str) -> String {
        format!("pb-{}-{}", event_type, severity)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub action: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Persisted to an execution log keyed by `id` (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: Uuid,
    pub playbook_id: String,
    pub alert_id: Uuid,
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    pub rolled_back: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// `{action_name: {params: [required...], description}}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionCatalog(pub HashMap<String, ActionSpec>);

impl ActionCatalog {
    pub fn contains(&self, action: &str) -> bool {
        self.0.contains_key(action)
    }

    pub fn required_params(&self, action: &str) -> &[String] {
        self.0
            .get(action)
            .map(|spec| spec.params.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_id_format() {
        assert_eq!(Playbook::expected_id("process", "critical"), "pb-process-critical");
    }

    #[test]
    fn on_error_defaults_to_stop() {
        let yaml = "name: Kill\naction: kill_process\nparams:\n  pid: 1\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.on_error, OnError::Stop);
    }
}
