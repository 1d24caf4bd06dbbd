//! Backend-specific connection settings derived from the top-level `[messaging]` config.
//!
//! The canonical `MessagingConfig`/`MessagingBackend` now live in `crate::config` (loaded
//! through the layered `Config::load()` pipeline); this module only holds the NATS/Kafka
//! client options those backends need, built from it.

use crate::config::MessagingConfig as AppMessagingConfig;
use serde::{Deserialize, Serialize};

/// NATS client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    pub connection_name: String,
    pub enable_tls: bool,
    pub max_reconnects: Option<usize>,
    pub reconnect_delay_ms: u64,
    pub ping_interval_secs: u64,
    pub request_timeout_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            connection_name: "edr-backplane".to_string(),
            enable_tls: false,
            max_reconnects: Some(10),
            reconnect_delay_ms: 1000,
            ping_interval_secs: 60,
            request_timeout_ms: 5000,
        }
    }
}

impl NatsConfig {
    /// Build NATS client options from the app-level messaging config for one service.
    pub fn from_app_config(cfg: &AppMessagingConfig, connection_name: &str) -> Self {
        Self {
            servers: cfg.url.split(',').map(|s| s.trim().to_string()).collect(),
            connection_name: connection_name.to_string(),
            ..Self::default()
        }
    }
}

/// Kafka client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub group_id: String,
    pub enable_auto_commit: bool,
    pub auto_commit_interval_ms: u64,
    pub session_timeout_ms: u64,
    pub enable_sasl: bool,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub enable_ssl: bool,
    pub compression_type: String,
    pub message_timeout_ms: u64,
    pub retries: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "edr-backplane".to_string(),
            group_id: "edr-backplane-group".to_string(),
            enable_auto_commit: true,
            auto_commit_interval_ms: 5000,
            session_timeout_ms: 30000,
            enable_sasl: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            enable_ssl: false,
            compression_type: "snappy".to_string(),
            message_timeout_ms: 30000,
            retries: 3,
        }
    }
}

impl KafkaConfig {
    /// Build Kafka client options from the app-level messaging config. `group_id` is
    /// per-service so replicas of the same service share a consumer group (§5) while
    /// different services each see every message.
    pub fn from_app_config(cfg: &AppMessagingConfig, client_id: &str, group_id: &str) -> Self {
        Self {
            bootstrap_servers: cfg.kafka_brokers.join(","),
            client_id: client_id.to_string(),
            group_id: group_id.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nats_config_splits_comma_separated_urls() {
        let app_cfg = AppMessagingConfig {
            backend: crate::config::MessagingBackend::Nats,
            enabled: true,
            url: "nats://a:4222,nats://b:4222".to_string(),
            exchange: "edr".to_string(),
            routing_key_prefix: "events".to_string(),
            kafka_brokers: vec![],
            enrichment_prefetch: 1,
            analytics_prefetch: 10,
            playbook_prefetch: 10,
            file_input: None,
        };
        let nats_cfg = NatsConfig::from_app_config(&app_cfg, "enrichment-service");
        assert_eq!(nats_cfg.servers.len(), 2);
        assert_eq!(nats_cfg.connection_name, "enrichment-service");
    }
}
