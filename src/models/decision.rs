use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::alert::Severity;
use super::event::EventType;

/// Remediation the decision engine recommends for an alert, §3/§4.5.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecommendedAction {
    IsolateHost,
    TerminateProcess,
    QuarantineFile,
    BlockIp,
    NotifySoc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Executed,
    Dismissed,
}

/// A recommended remediation attached 1:1 to an alert (§3). Unique by `alert_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub agent_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub score: f64,
    pub recommended_action: RecommendedAction,
    pub priority: f64,
    pub rationale: HashMap<String, JsonValue>,
    pub status: DecisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        alert_id: Uuid,
        agent_id: String,
        event_type: EventType,
        severity: Severity,
        score: f64,
        recommended_action: RecommendedAction,
        priority: f64,
        rationale: HashMap<String, JsonValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            alert_id,
            agent_id,
            event_type,
            severity,
            score,
            recommended_action,
            priority,
            rationale,
            status: DecisionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
