//! The four per-event-type enrichers and their additive scoring rules (§4.1).

use crate::enrichment::lookups::{GeoIpClient, OtxClient, VtClient, YaraScanner};
use crate::error::Result;
use crate::models::{Enrichment, RawEvent};
use async_trait::async_trait;

const LOOPBACK_ADDRS: [&str; 3] = ["127.0.0.1", "::1", "0.0.0.0"];

#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn enrich(&self, event: &RawEvent) -> Result<Enrichment>;
}

pub struct FileEnricher {
    pub vt: VtClient,
    pub otx: OtxClient,
    pub yara: YaraScanner,
}

#[async_trait]
impl Enricher for FileEnricher {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn enrich(&self, event: &RawEvent) -> Result<Enrichment> {
        let mut enrichment = Enrichment::default();

        let file_name = event.payload_str("file_name").unwrap_or_default();
        let file_path = event.payload_str("file_path").unwrap_or_default();
        let hits = self.yara.scan(&format!("{file_name} {file_path}"));
        if !hits.is_empty() {
            enrichment.add_score(30.0);
            enrichment.yara_hits.extend(hits);
        }

        if let Some(hash) = event.payload_str("file_hash").filter(|h| h.len() > 10) {
            let vt = self.vt.lookup_hash(hash).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "VT lookup exhausted retries, treating as unknown");
                Default::default()
            });
            if vt.positives > 0 {
                enrichment.add_score((vt.positives as f64 * 5.0).min(50.0));
                enrichment.ioc_matches.push("vt_malicious".to_string());
            }
            let otx = self.otx.lookup_hash(hash).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "OTX lookup exhausted retries, treating as unknown");
                Default::default()
            });
            if otx.pulses > 0 {
                enrichment.add_score((otx.pulses as f64 * 3.0).min(30.0));
                enrichment.ioc_matches.push("otx_pulses".to_string());
            }
            enrichment.reputation.vt = Some(vt);
            enrichment.reputation.otx = Some(otx);
        }

        Ok(enrichment)
    }
}

pub struct NetworkEnricher {
    pub otx: OtxClient,
    pub geoip: GeoIpClient,
}

#[async_trait]
impl Enricher for NetworkEnricher {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn enrich(&self, event: &RawEvent) -> Result<Enrichment> {
        let mut enrichment = Enrichment::default();

        if let Some(remote_ip) = event.payload_str("remote_ip") {
            if !LOOPBACK_ADDRS.contains(&remote_ip) {
                enrichment.geoip = self.geoip.lookup(remote_ip).await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "GeoIP lookup exhausted retries, treating as unknown");
                    Default::default()
                });

                let otx = self.otx.lookup_ip(remote_ip).await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "OTX lookup exhausted retries, treating as unknown");
                    Default::default()
                });
                if otx.pulses > 0 {
                    enrichment.add_score((otx.pulses as f64 * 5.0).min(40.0));
                    enrichment.ioc_matches.push("otx_ip_malicious".to_string());
                }
                enrichment.reputation.otx = Some(otx);
            }
        }

        Ok(enrichment)
    }
}

pub struct ProcessEnricher {
    pub vt: VtClient,
    pub yara: YaraScanner,
}

#[async_trait]
impl Enricher for ProcessEnricher {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn enrich(&self, event: &RawEvent) -> Result<Enrichment> {
        let mut enrichment = Enrichment::default();

        let command_line = event.payload_str("command_line").unwrap_or_default();
        let executable_path = event.payload_str("executable_path").unwrap_or_default();
        let hits = self.yara.scan(&format!("{command_line} {executable_path}"));
        if !hits.is_empty() {
            enrichment.add_score(25.0);
            enrichment.yara_hits.extend(hits);
        }

        if let Some(hash) = event.payload_str("hash") {
            let vt = self.vt.lookup_hash(hash).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "VT lookup exhausted retries, treating as unknown");
                Default::default()
            });
            if vt.positives > 0 {
                enrichment.add_score((vt.positives as f64 * 6.0).min(60.0));
                enrichment.ioc_matches.push("vt_malicious".to_string());
            }
            enrichment.reputation.vt = Some(vt);
        }

        if event.payload_i64("parent_process_id") == Some(0) {
            enrichment.add_score(10.0);
            enrichment.ioc_matches.push("system_parent".to_string());
        }

        Ok(enrichment)
    }
}

pub struct SystemEnricher;

#[async_trait]
impl Enricher for SystemEnricher {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn enrich(&self, event: &RawEvent) -> Result<Enrichment> {
        let mut enrichment = Enrichment::default();

        if let Some(cpu) = event.payload_f64("cpu") {
            if cpu > 80.0 {
                enrichment.add_score(((cpu - 80.0) * 2.0).min(30.0));
                enrichment.ioc_matches.push("high_cpu".to_string());
            }
        }

        if let Some(mem_used_pct) = event.payload_f64("mem_used_pct") {
            if mem_used_pct > 90.0 {
                enrichment.add_score(((mem_used_pct - 90.0) * 3.0).min(30.0));
                enrichment.ioc_matches.push("high_memory".to_string());
            }
        }

        Ok(enrichment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn event(event_type: EventType, payload: HashMap<String, serde_json::Value>) -> RawEvent {
        RawEvent {
            event_id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn system_enricher_flags_high_cpu_and_memory() {
        let enricher = SystemEnricher;
        let payload = HashMap::from([
            ("cpu".to_string(), json!(95.0)),
            ("mem_used_pct".to_string(), json!(96.0)),
        ]);
        let enrichment = enricher.enrich(&event(EventType::System, payload)).await.unwrap();
        assert!(enrichment.ioc_matches.contains(&"high_cpu".to_string()));
        assert!(enrichment.ioc_matches.contains(&"high_memory".to_string()));
        assert_eq!(enrichment.threat_score, 30.0 + 18.0);
    }

    #[tokio::test]
    async fn system_enricher_is_quiet_under_thresholds() {
        let enricher = SystemEnricher;
        let payload = HashMap::from([
            ("cpu".to_string(), json!(40.0)),
            ("mem_used_pct".to_string(), json!(50.0)),
        ]);
        let enrichment = enricher.enrich(&event(EventType::System, payload)).await.unwrap();
        assert_eq!(enrichment.threat_score, 0.0);
        assert!(enrichment.ioc_matches.is_empty());
    }

    #[tokio::test]
    async fn process_enricher_flags_zero_ppid_as_system_parent() {
        let enricher = ProcessEnricher {
            vt: VtClient::new(None, 5, 60),
            yara: YaraScanner::empty(),
        };
        let payload = HashMap::from([("parent_process_id".to_string(), json!(0))]);
        let enrichment = enricher.enrich(&event(EventType::Process, payload)).await.unwrap();
        assert_eq!(enrichment.threat_score, 10.0);
        assert!(enrichment.ioc_matches.contains(&"system_parent".to_string()));
    }

    #[tokio::test]
    async fn network_enricher_skips_loopback_addresses() {
        let enricher = NetworkEnricher {
            otx: OtxClient::new(None, 5, 60),
            geoip: GeoIpClient::new(5, 60),
        };
        let payload = HashMap::from([("remote_ip".to_string(), json!("127.0.0.1"))]);
        let enrichment = enricher.enrich(&event(EventType::Network, payload)).await.unwrap();
        assert_eq!(enrichment.threat_score, 0.0);
        assert!(enrichment.geoip.country.is_none());
    }
}
