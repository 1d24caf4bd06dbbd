//! Message envelope and routing-key helpers for the event/alert bus (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata carried alongside every published payload, independent of its routing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub message_id: String,
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub headers: HashMap<String, String>,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: None,
            timestamp: Utc::now(),
            source: "edr-backplane".to_string(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub metadata: MessageMetadata,
    pub payload: T,
}

impl<T> MessageEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            metadata: MessageMetadata::default(),
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.metadata.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.metadata.headers.insert(key, value);
        self
    }
}

/// `{prefix}.raw.{agent_id}.{event_type}` (§6).
pub fn raw_event_key(prefix: &str, agent_id: &str, event_type: &str) -> String {
    format!("{prefix}.raw.{agent_id}.{event_type}")
}

/// `{prefix}.enriched.{agent_id}.{event_type}` (§6).
pub fn enriched_event_key(prefix: &str, agent_id: &str, event_type: &str) -> String {
    format!("{prefix}.enriched.{agent_id}.{event_type}")
}

/// `alerts.{severity}` (§6).
pub fn alert_key(severity: &str) -> String {
    format!("alerts.{severity}")
}

/// Subject a queue-group worker subscribes to in order to see raw events from every
/// agent and event type; `*` is a single-token NATS wildcard.
pub fn raw_event_wildcard(prefix: &str) -> String {
    format!("{prefix}.raw.*.*")
}

pub fn enriched_event_wildcard(prefix: &str) -> String {
    format!("{prefix}.enriched.*.*")
}

pub fn alert_wildcard() -> &'static str {
    "alerts.*"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys_match_spec_shape() {
        assert_eq!(raw_event_key("events", "agent-1", "process"), "events.raw.agent-1.process");
        assert_eq!(
            enriched_event_key("events", "agent-1", "network"),
            "events.enriched.agent-1.network"
        );
        assert_eq!(alert_key("high"), "alerts.high");
    }

    #[test]
    fn envelope_round_trips_metadata() {
        let envelope = MessageEnvelope::new("payload".to_string())
            .with_correlation_id("corr-1".to_string())
            .with_header("k".to_string(), "v".to_string());
        assert_eq!(envelope.metadata.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(envelope.metadata.headers.get("k").map(String::as_str), Some("v"));
    }
}
