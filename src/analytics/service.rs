//! Consumer loop: `events.enriched.#` in, `Alert`s persisted and published (§4.2).

use crate::analytics::{DetectorEnsemble, FeatureExtractor};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::kv::KvStore;
use crate::messaging::{enriched_event_wildcard, MessagingService};
use crate::models::{Alert, EnrichedEvent};
use crate::storage::RecordTree;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct AnalyticsStats {
    pub processed: AtomicU64,
    pub alerts_raised: AtomicU64,
    pub failed: AtomicU64,
}

impl crate::health::ServiceStats for AnalyticsStats {
    fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
    fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct AnalyticsService {
    bus: Arc<MessagingService>,
    extractor: FeatureExtractor,
    ensemble: DetectorEnsemble,
    alerts: RecordTree,
    routing_key_prefix: String,
    pub stats: Arc<AnalyticsStats>,
}

impl AnalyticsService {
    pub async fn connect(config: &Config, kv: Arc<dyn KvStore>, alerts: RecordTree) -> Result<Self> {
        let bus = MessagingService::connect(
            config.messaging.clone(),
            "analytics-service",
            "analytics-service-group",
        )
        .await?;

        Ok(Self {
            bus: Arc::new(bus),
            extractor: FeatureExtractor::new(kv),
            ensemble: DetectorEnsemble::new(config.enrichment.models_dir.clone()),
            alerts,
            routing_key_prefix: config.messaging.routing_key_prefix.clone(),
            stats: Arc::new(AnalyticsStats::default()),
        })
    }

    pub async fn run(&self) -> Result<()> {
        let subject = enriched_event_wildcard(&self.routing_key_prefix);
        let mut stream = self.bus.subscribe::<EnrichedEvent>(&subject).await?;

        loop {
            let message = stream.next().await?;
            let Some(event) = message else {
                continue;
            };

            match self.process_one(&event).await {
                Ok(()) => {
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                    stream.ack().await?;
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %err, agent_id = %event.agent_id(), "analytics failed, nacking without requeue");
                    stream.nack().await?;
                }
            }
        }
    }

    async fn process_one(&self, event: &EnrichedEvent) -> Result<()> {
        let event_type = event.event_type().to_string();
        let features = self.extractor.extract(event).await?;
        let (score, reasons) = self.ensemble.score(event.agent_id(), &event_type, &features).await;

        if score < 50.0 {
            return Ok(());
        }

        let alert = Alert::new(
            event.raw.event_id,
            event.agent_id().to_string(),
            event.event_type(),
            score,
            features,
            reasons,
        );

        // Write must precede publish (§4.2): if the write fails, nothing is published;
        // if the publish fails below, the alert is already durable and the decision
        // engine's poll loop will still pick it up.
        self.alerts.insert(alert.id, &alert)?;
        self.stats.alerts_raised.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.bus.publish(&alert.routing_key(), &alert).await {
            tracing::error!(error = %err, alert_id = %alert.id, "alert publish failed, write is durable, decision engine will poll");
            return Err(AppError::from(err));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::kv::InMemoryKv;
    use crate::models::{Enrichment, EventType, RawEvent};
    use crate::storage::RecordStore;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            messaging: MessagingConfig {
                backend: MessagingBackend::InMemory,
                enabled: true,
                url: "nats://localhost:4222".to_string(),
                exchange: "edr".to_string(),
                routing_key_prefix: "events".to_string(),
                kafka_brokers: vec![],
                enrichment_prefetch: 1,
                analytics_prefetch: 10,
                playbook_prefetch: 10,
                file_input: None,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                lock_ttl_secs: 60,
                cooldown_ttl_secs: 300,
                cooldown_enabled: true,
                use_embedded: true,
                embedded_path: None,
            },
            genai: GenaiConfig::default(),
            execution: ExecutionConfig {
                mode: ExecutionMode::Enforce,
                allow_isolate_host: false,
                quarantine_dir: PathBuf::new(),
                persist: true,
                decision_interval_secs: 60,
            },
            data: DataConfig {
                base_dir: PathBuf::from("/tmp/edr-analytics-test"),
                playbooks_static: PathBuf::new(),
                playbooks_generated: PathBuf::new(),
                executions: PathBuf::new(),
            },
            enrichment: EnrichmentConfig {
                geoip_db: None,
                yara_rules: None,
                models_dir: PathBuf::from("/nonexistent"),
                vt_api_key_env: None,
                otx_api_key_env: None,
                http_timeout_secs: 5,
                cache_ttl_secs: 60,
            },
            observability: ObservabilityConfig::default(),
        }
    }

    fn enriched(event_type: EventType, payload: HashMap<String, serde_json::Value>, enrichment: Enrichment) -> EnrichedEvent {
        EnrichedEvent {
            raw: RawEvent { event_id: Uuid::new_v4(), agent_id: "agent-1".to_string(), event_type, payload, timestamp: chrono::Utc::now() },
            enrichment,
        }
    }

    async fn service() -> (AnalyticsService, RecordTree, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let alerts = store.tree("alerts").unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let service = AnalyticsService::connect(&test_config(), kv, alerts.clone()).await.unwrap();
        (service, alerts, dir)
    }

    #[tokio::test]
    async fn benign_low_score_event_raises_no_alert() {
        let (service, alerts, _dir) = service().await;
        let event = enriched(EventType::File, HashMap::new(), Enrichment::default());

        service.process_one(&event).await.unwrap();

        assert!(alerts.is_empty());
        assert_eq!(service.stats.alerts_raised.load(Ordering::Relaxed), 0);
    }

    fn process_payload(process_name: &str, command_line: &str, executable_path: &str) -> HashMap<String, serde_json::Value> {
        let mut payload = HashMap::new();
        payload.insert("process_name".to_string(), serde_json::json!(process_name));
        payload.insert("command_line".to_string(), serde_json::json!(command_line));
        payload.insert("executable_path".to_string(), serde_json::json!(executable_path));
        payload.insert("parent_process_id".to_string(), serde_json::json!(0));
        payload
    }

    /// A single isolated event can never clear the 50-point alert threshold on its own
    /// (the rule detector alone caps out at 100 * 0.4 = 40): this builds ten quiet
    /// baseline sightings of the same process first, so the behavioral detector has a
    /// model to depart from, then fires one event that both trips every rule predicate
    /// and reads as a sharp departure from that baseline.
    #[tokio::test]
    async fn repeated_history_then_a_sharp_departure_raises_a_high_severity_alert() {
        let (service, alerts, _dir) = service().await;

        for _ in 0..10 {
            let payload = process_payload("svchost.exe", "C:\\Windows\\System32\\svchost.exe", "C:\\Windows\\System32\\svchost.exe");
            let event = enriched(EventType::Process, payload, Enrichment::default());
            service.process_one(&event).await.unwrap();
        }
        assert!(alerts.is_empty());

        let payload = process_payload(
            "svchost.exe",
            "C:\\Windows\\System32\\svchost.exe -k netsvcs -p -s BITS -c C:\\Users\\Public\\AppData\\Local\\Temp\\payload.ps1 -EncodedCommand",
            "C:\\Users\\Public\\AppData\\Local\\Temp\\svchost.exe",
        );
        let mut enrichment = Enrichment::default();
        enrichment.reputation.vt = Some(crate::models::VtReputation { positives: 67, total: 70 });
        enrichment.yara_hits = vec!["mimikatz".to_string(), "dumper".to_string()];
        enrichment.threat_score = 95.0;

        let event = enriched(EventType::Process, payload, enrichment);
        service.process_one(&event).await.unwrap();

        let stored: Vec<Alert> = alerts.scan_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].score >= 65.0, "expected a high-or-above score, got {}", stored[0].score);
        assert_eq!(stored[0].severity, crate::models::Severity::High);
        assert_eq!(service.stats.alerts_raised.load(Ordering::Relaxed), 1);
    }
}
