//! Dispatches a `RawEvent` to its type-matched enricher (§4.1 step 2).

use crate::enrichment::enrichers::{Enricher, FileEnricher, NetworkEnricher, ProcessEnricher, SystemEnricher};
use crate::enrichment::lookups::{GeoIpClient, OtxClient, VtClient, YaraScanner};
use crate::config::EnrichmentConfig;
use crate::error::Result;
use crate::models::{EnrichedEvent, EventType, RawEvent};

pub struct EnrichmentPipeline {
    process: ProcessEnricher,
    file: FileEnricher,
    network: NetworkEnricher,
    system: SystemEnricher,
}

impl EnrichmentPipeline {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let load_yara = || -> Result<YaraScanner> {
            match &config.yara_rules {
                Some(path) if path.exists() => YaraScanner::load(path),
                _ => Ok(YaraScanner::empty()),
            }
        };

        let vt_api_key_env = config.vt_api_key_env.as_deref();
        let otx_api_key_env = config.otx_api_key_env.as_deref();
        let timeout = config.http_timeout_secs;
        let cache_ttl = config.cache_ttl_secs;

        Ok(Self {
            process: ProcessEnricher {
                vt: VtClient::new(vt_api_key_env, timeout, cache_ttl),
                yara: load_yara()?,
            },
            file: FileEnricher {
                vt: VtClient::new(vt_api_key_env, timeout, cache_ttl),
                otx: OtxClient::new(otx_api_key_env, timeout, cache_ttl),
                yara: load_yara()?,
            },
            network: NetworkEnricher {
                otx: OtxClient::new(otx_api_key_env, timeout, cache_ttl),
                geoip: GeoIpClient::new(timeout, cache_ttl),
            },
            system: SystemEnricher,
        })
    }

    pub async fn enrich(&self, event: &RawEvent) -> Result<EnrichedEvent> {
        let enricher: &dyn Enricher = match event.event_type {
            EventType::Process => &self.process,
            EventType::File => &self.file,
            EventType::Network => &self.network,
            EventType::System => &self.system,
        };

        let enrichment = enricher.enrich(event).await?;
        Ok(EnrichedEvent {
            raw: event.clone(),
            enrichment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn test_config() -> EnrichmentConfig {
        EnrichmentConfig {
            geoip_db: None,
            yara_rules: None,
            models_dir: Default::default(),
            vt_api_key_env: None,
            otx_api_key_env: None,
            http_timeout_secs: 5,
            cache_ttl_secs: 60,
        }
    }

    #[tokio::test]
    async fn dispatches_to_the_type_matched_enricher() {
        let pipeline = EnrichmentPipeline::new(&test_config()).unwrap();
        let event = RawEvent {
            event_id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            event_type: EventType::System,
            payload: HashMap::from([("cpu".to_string(), serde_json::json!(95.0))]),
            timestamp: chrono::Utc::now(),
        };
        let enriched = pipeline.enrich(&event).await.unwrap();
        assert_eq!(enriched.event_type(), EventType::System);
        assert!(enriched.enrichment.threat_score > 0.0);
    }
}
