//! Per-event-type feature extraction (§4.3): reads `payload`/`enrichment`, and for
//! stateful features increments a per-agent counter in the KV store.

use crate::error::Result;
use crate::kv::KvStore;
use crate::models::{EnrichedEvent, EventType, Features};
use std::sync::Arc;

const SCRIPT_EXTENSIONS: [&str; 4] = [".ps1", ".vbs", ".js", ".bat"];
const SCRIPT_EXTENSIONS_EXTRA: [&str; 1] = [".cmd"];

pub struct FeatureExtractor {
    kv: Arc<dyn KvStore>,
}

impl FeatureExtractor {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn extract(&self, event: &EnrichedEvent) -> Result<Features> {
        match event.event_type() {
            EventType::Process => self.extract_process(event).await,
            EventType::File => self.extract_file(event).await,
            EventType::Network => self.extract_network(event).await,
            EventType::System => self.extract_system(event).await,
        }
    }

    async fn extract_process(&self, event: &EnrichedEvent) -> Result<Features> {
        let mut f = Features::new();
        let raw = &event.raw;

        let process_name = raw.payload_str("process_name").unwrap_or_default();
        let command_line = raw.payload_str("command_line").unwrap_or_default();
        let executable_path = raw.payload_str("executable_path").unwrap_or_default();
        let vt_positives = event
            .enrichment
            .reputation
            .vt
            .as_ref()
            .map(|vt| vt.positives)
            .unwrap_or(0);

        let counter_key = format!("counter:{}:proc:{}", raw.agent_id, process_name);
        let proc_freq_per_hour = self.kv.incr(&counter_key).await?;

        f.insert("process_name", process_name);
        f.insert("command_line_len", command_line.len() as i64);
        f.insert("is_system_parent", raw.payload_i64("parent_process_id") == Some(0));
        f.insert("vt_positives", vt_positives);
        f.insert("hash_known_malicious", vt_positives > 10);
        f.insert("yara_hits_count", event.enrichment.yara_hits.len() as i64);
        f.insert("threat_score", event.enrichment.threat_score);
        f.insert("proc_freq_per_hour", proc_freq_per_hour);
        f.insert("is_suspicious_path", executable_path.to_lowercase().contains("temp"));

        Ok(f)
    }

    async fn extract_file(&self, event: &EnrichedEvent) -> Result<Features> {
        let mut f = Features::new();
        let raw = &event.raw;

        let file_name = raw.payload_str("file_name").unwrap_or_default();
        let file_ext = file_ext(file_name);
        let is_script = SCRIPT_EXTENSIONS.contains(&file_ext.as_str())
            || SCRIPT_EXTENSIONS_EXTRA.contains(&file_ext.as_str());
        let is_temp_dir = raw
            .payload_str("file_path")
            .map(|p| p.to_lowercase().contains("temp"))
            .unwrap_or(false);

        let counter_key = format!("counter:{}:file:temp_create", raw.agent_id);
        let temp_file_freq = if is_temp_dir {
            self.kv.incr(&counter_key).await?
        } else {
            self.kv
                .get(&counter_key)
                .await?
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        };

        f.insert("file_name", file_name);
        f.insert("file_ext", file_ext);
        f.insert("file_size", raw.payload_f64("file_size").unwrap_or(0.0));
        f.insert("is_temp_dir", is_temp_dir);
        f.insert("is_script", is_script);
        f.insert("yara_hits", event.enrichment.yara_hits.len() as i64);
        f.insert(
            "otx_pulses",
            event.enrichment.reputation.otx.as_ref().map(|o| o.pulses).unwrap_or(0),
        );
        f.insert(
            "vt_positives",
            event.enrichment.reputation.vt.as_ref().map(|v| v.positives).unwrap_or(0),
        );
        f.insert("threat_score", event.enrichment.threat_score);
        f.insert("temp_file_freq", temp_file_freq);

        Ok(f)
    }

    async fn extract_network(&self, event: &EnrichedEvent) -> Result<Features> {
        let mut f = Features::new();
        let raw = &event.raw;

        let remote_ip = raw.payload_str("remote_ip").unwrap_or_default();

        f.insert("remote_ip", remote_ip);
        f.insert("local_ip", raw.payload_str("local_ip").unwrap_or_default());
        f.insert("remote_port", raw.payload_i64("remote_port").unwrap_or(0));
        f.insert("bytes_sent", raw.payload_f64("bytes_sent").unwrap_or(0.0));
        f.insert("bytes_received", raw.payload_f64("bytes_received").unwrap_or(0.0));
        f.insert("protocol", raw.payload_str("protocol").unwrap_or_default());
        f.insert("is_loopback", is_loopback(remote_ip));
        f.insert("is_private_ip", is_private_ip(remote_ip));
        f.insert(
            "otx_pulses",
            event.enrichment.reputation.otx.as_ref().map(|o| o.pulses).unwrap_or(0),
        );
        f.insert("geoip_country", event.enrichment.geoip.country.clone().unwrap_or_default());
        f.insert("threat_score", event.enrichment.threat_score);

        Ok(f)
    }

    async fn extract_system(&self, event: &EnrichedEvent) -> Result<Features> {
        let mut f = Features::new();
        let raw = &event.raw;

        let cpu_usage = raw.payload_f64("cpu_usage").unwrap_or(0.0);
        let memory_used_pct = raw.payload_f64("memory_used_pct").unwrap_or(0.0);

        f.insert("cpu_usage", cpu_usage);
        f.insert("memory_used_pct", memory_used_pct);
        f.insert("disk_usage", raw.payload_f64("disk_usage").unwrap_or(0.0));
        f.insert("uptime", raw.payload_f64("uptime").unwrap_or(0.0));
        f.insert("high_cpu", cpu_usage > 80.0);
        f.insert("high_memory", memory_used_pct > 90.0);
        f.insert("threat_score", event.enrichment.threat_score);

        Ok(f)
    }
}

fn file_ext(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) => file_name[idx..].to_lowercase(),
        None => String::new(),
    }
}

fn is_loopback(ip: &str) -> bool {
    ip == "127.0.0.1" || ip == "::1"
}

fn is_private_ip(ip: &str) -> bool {
    ip.starts_with("10.")
        || ip.starts_with("192.168.")
        || (ip.starts_with("172.")
            && ip
                .split('.')
                .nth(1)
                .and_then(|o| o.parse::<u8>().ok())
                .map(|o| (16..=31).contains(&o))
                .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;
    use crate::models::{Enrichment, EventType, RawEvent};
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn enriched(event_type: EventType, payload: HashMap<String, serde_json::Value>) -> EnrichedEvent {
        EnrichedEvent {
            raw: RawEvent {
                event_id: Uuid::new_v4(),
                agent_id: "agent-1".to_string(),
                event_type,
                payload,
                timestamp: chrono::Utc::now(),
            },
            enrichment: Enrichment::default(),
        }
    }

    #[tokio::test]
    async fn process_counter_increments_across_calls() {
        let extractor = FeatureExtractor::new(Arc::new(InMemoryKv::new()));
        let payload = HashMap::from([("process_name".to_string(), json!("powershell.exe"))]);

        let first = extractor.extract(&enriched(EventType::Process, payload.clone())).await.unwrap();
        let second = extractor.extract(&enriched(EventType::Process, payload)).await.unwrap();

        assert_eq!(first.get_f64("proc_freq_per_hour"), Some(1.0));
        assert_eq!(second.get_f64("proc_freq_per_hour"), Some(2.0));
    }

    #[tokio::test]
    async fn network_extractor_classifies_private_and_loopback_ips() {
        let extractor = FeatureExtractor::new(Arc::new(InMemoryKv::new()));
        let payload = HashMap::from([("remote_ip".to_string(), json!("192.168.1.5"))]);

        let features = extractor.extract(&enriched(EventType::Network, payload)).await.unwrap();
        assert!(features.get_bool("is_private_ip"));
        assert!(!features.get_bool("is_loopback"));
    }

    #[tokio::test]
    async fn file_extractor_flags_script_extensions() {
        let extractor = FeatureExtractor::new(Arc::new(InMemoryKv::new()));
        let payload = HashMap::from([("file_name".to_string(), json!("dropper.ps1"))]);

        let features = extractor.extract(&enriched(EventType::File, payload)).await.unwrap();
        assert!(features.get_bool("is_script"));
    }
}
