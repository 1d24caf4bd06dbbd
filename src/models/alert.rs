use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use super::event::EventType;
use super::features::Features;

/// `medium∈[50,65)`, `high∈[65,80)`, `critical∈[80,100]` (§4.2, glossary).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Bucket a final ensemble score into a severity, §4.2. Caller has already checked
    /// `score >= 50.0`; scores below that never reach here.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Severity::Critical
        } else if score >= 65.0 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// Per-detector reasons attached to an alert, §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorReasons {
    #[serde(default)]
    pub rule: Vec<String>,
    #[serde(default)]
    pub anomaly: Vec<String>,
    #[serde(default)]
    pub behavioral: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDetails {
    pub features: Features,
    pub reasons: DetectorReasons,
    pub model: String,
}

/// A persisted record emitted when the ensemble score crosses the alerting threshold (§3, §4.2).
/// Created only when `score >= 50`; immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Alert {
    pub id: Uuid,
    pub event_id: Uuid,
    #[validate(length(min = 1))]
    pub agent_id: String,
    pub event_type: EventType,
    pub score: f64,
    pub severity: Severity,
    pub source: String,
    pub details: AlertDetails,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        event_id: Uuid,
        agent_id: String,
        event_type: EventType,
        score: f64,
        features: Features,
        reasons: DetectorReasons,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            agent_id,
            event_type,
            score,
            severity: Severity::from_score(score),
            source: "analytics".to_string(),
            details: AlertDetails {
                features,
                reasons,
                model: "ensemble".to_string(),
            },
            created_at: Utc::now(),
        }
    }

    pub fn routing_key(&self) -> String {
        format!("alerts.{}", self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_boundaries() {
        assert_eq!(Severity::from_score(49.99), Severity::Medium);
        assert_eq!(Severity::from_score(50.00), Severity::Medium);
        assert_eq!(Severity::from_score(64.99), Severity::Medium);
        assert_eq!(Severity::from_score(65.00), Severity::High);
        assert_eq!(Severity::from_score(79.99), Severity::High);
        assert_eq!(Severity::from_score(80.00), Severity::Critical);
    }

    #[test]
    fn routing_key_matches_severity() {
        let alert = Alert::new(
            Uuid::new_v4(),
            "agent-1".to_string(),
            EventType::Process,
            92.0,
            Features::new(),
            DetectorReasons::default(),
        );
        assert_eq!(alert.routing_key(), "alerts.critical");
    }
}
