use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use strum::{Display, EnumString};
use uuid::Uuid;

/// The four telemetry classes an endpoint agent reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Process,
    File,
    Network,
    System,
}

/// Host telemetry as produced by the endpoint agent. Immutable; the back-plane only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_id: Uuid,
    pub agent_id: String,
    pub event_type: EventType,
    pub payload: HashMap<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl RawEvent {
    /// Schema validation: required fields present and non-empty. Producer-contract failures are
    /// reported to the caller, who nacks-without-requeue per the at-most-once policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_id.trim().is_empty() {
            return Err("agent_id must not be empty".to_string());
        }
        Ok(())
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(|v| v.as_f64())
    }

    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(|v| v.as_i64())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VtReputation {
    pub positives: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtxReputation {
    pub pulses: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reputation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vt: Option<VtReputation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otx: Option<OtxReputation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoIp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

/// Enrichment produced by one of the four type-specific enrichers, §4.1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default)]
    pub ioc_matches: Vec<String>,
    #[serde(default)]
    pub reputation: Reputation,
    #[serde(default)]
    pub yara_hits: Vec<String>,
    #[serde(default)]
    pub geoip: GeoIp,
    pub threat_score: f64,
}

impl Enrichment {
    /// Additive scoring with saturating clamp to [0,100], shared by all four enrichers.
    pub fn add_score(&mut self, delta: f64) {
        self.threat_score = (self.threat_score + delta).clamp(0.0, 100.0);
    }
}

/// RawEvent plus enrichment. Produced exactly once per consumed RawEvent (best effort);
/// immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub raw: RawEvent,
    pub enrichment: Enrichment,
}

impl EnrichedEvent {
    pub fn event_type(&self) -> EventType {
        self.raw.event_type
    }

    pub fn agent_id(&self) -> &str {
        &self.raw.agent_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_clamps_to_range() {
        let mut e = Enrichment::default();
        e.add_score(130.0);
        assert_eq!(e.threat_score, 100.0);
        e.threat_score = 10.0;
        e.add_score(-50.0);
        assert_eq!(e.threat_score, 0.0);
    }

    #[test]
    fn raw_event_rejects_empty_agent() {
        let event = RawEvent {
            event_id: Uuid::new_v4(),
            agent_id: "".to_string(),
            event_type: EventType::Process,
            payload: HashMap::new(),
            timestamp: Utc::now(),
        };
        assert!(event.validate().is_err());
    }
}
