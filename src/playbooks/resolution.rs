//! Playbook Resolution (§4.9): strict id lookup in static/generated directories, falling
//! back to a deterministic recipe validated through the catalog before being persisted.

use crate::error::{AppError, Result};
use crate::models::{ActionCatalog, Alert, EventType, FeatureValue, OnError, Playbook, Step};
use crate::playbooks::parser::{parse_playbook_yaml, validate_against_catalog};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

fn feature_str<'a>(alert: &'a Alert, key: &str) -> Option<&'a str> {
    match alert.details.features.get(key) {
        Some(FeatureValue::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn feature_i64(alert: &Alert, key: &str) -> Option<i64> {
    alert.details.features.get_f64(key).map(|n| n as i64)
}

/// Seam for a future multi-agent/LLM-backed planner (§4.9): default impl is the
/// deterministic recipe, `resolve()` validates whatever a generator produces through the
/// catalog and falls back to the deterministic recipe if it doesn't pass.
pub trait PlaybookGenerator: Send + Sync {
    fn generate(&self, alert: &Alert) -> Playbook;
}

pub struct DeterministicGenerator;

impl PlaybookGenerator for DeterministicGenerator {
    fn generate(&self, alert: &Alert) -> Playbook {
        let step = match alert.event_type {
            EventType::Process => {
                let pid = feature_i64(alert, "pid").unwrap_or(0);
                let mut params = HashMap::new();
                params.insert("pid".to_string(), json!(pid));
                Step { name: "Kill Process".to_string(), action: "kill_process".to_string(), params, on_error: OnError::Stop }
            }
            EventType::Network => {
                let ip = feature_str(alert, "remote_ip").unwrap_or("0.0.0.0").to_string();
                let mut params = HashMap::new();
                params.insert("ip".to_string(), json!(ip));
                Step { name: "Block Ip".to_string(), action: "block_ip".to_string(), params, on_error: OnError::Stop }
            }
            EventType::File => {
                let path = feature_str(alert, "file_name").unwrap_or("").to_string();
                let mut params = HashMap::new();
                params.insert("path".to_string(), json!(path));
                Step { name: "Quarantine File".to_string(), action: "quarantine_file".to_string(), params, on_error: OnError::Stop }
            }
            EventType::System => {
                Step { name: "Isolate Host".to_string(), action: "isolate_host".to_string(), params: HashMap::new(), on_error: OnError::Stop }
            }
        };

        Playbook {
            id: Playbook::expected_id(&alert.event_type.to_string(), &alert.severity.to_string()),
            version: "1".to_string(),
            metadata: HashMap::from([("source".to_string(), json!("deterministic-generator"))]),
            preconditions: vec![],
            steps: vec![step],
            rollback: vec![],
        }
    }
}

fn load_by_id(dir: &Path, id: &str, catalog: &ActionCatalog) -> Result<Option<Playbook>> {
    let path = dir.join(format!("{id}.yaml"));
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    let playbook = parse_playbook_yaml(&text, catalog)
        .map_err(|e| AppError::PlaybookParse(format!("{}: {e}", path.display())))?;
    if playbook.id != id {
        return Err(AppError::PlaybookParse(format!(
            "{}: declares id '{}', expected '{id}'",
            path.display(),
            playbook.id
        )));
    }
    Ok(Some(playbook))
}

fn persist_generated(dir: &Path, playbook: &Playbook) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.yaml", playbook.id));
    let yaml = serde_yaml::to_string(playbook).map_err(|e| AppError::PlaybookParse(e.to_string()))?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Resolves the playbook for an alert: strict lookup by `pb-{event_type}-{severity}` in
/// `static_dir` then `generated_dir`, else a freshly generated one persisted to `generated_dir`.
pub fn resolve(
    alert: &Alert,
    static_dir: &Path,
    generated_dir: &Path,
    catalog: &ActionCatalog,
    generator: &dyn PlaybookGenerator,
) -> Result<Playbook> {
    let id = Playbook::expected_id(&alert.event_type.to_string(), &alert.severity.to_string());

    if let Some(pb) = load_by_id(static_dir, &id, catalog)? {
        return Ok(pb);
    }
    if let Some(pb) = load_by_id(generated_dir, &id, catalog)? {
        return Ok(pb);
    }

    let mut generated = generator.generate(alert);
    generated.id.clone_from(&id);

    if validate_against_catalog(&generated, catalog).is_err() {
        tracing::warn!(playbook_id = %id, "generated playbook failed catalog validation, falling back to deterministic recipe");
        generated = DeterministicGenerator.generate(alert);
        generated.id.clone_from(&id);
        validate_against_catalog(&generated, catalog)?;
    }

    persist_generated(generated_dir, &generated)?;
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertDetails, DetectorReasons, Features, Severity};
    use crate::playbooks::catalog::core_catalog;
    use chrono::Utc;
    use uuid::Uuid;

    fn alert(event_type: EventType, severity: Severity, features: Features) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            event_type,
            score: 90.0,
            severity,
            source: "analytics".to_string(),
            details: AlertDetails { features, reasons: DetectorReasons::default(), model: "ensemble".to_string() },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn network_alert_generates_block_ip_with_remote_ip() {
        let mut features = Features::new();
        features.insert("remote_ip", "185.156.47.22");
        let a = alert(EventType::Network, Severity::Critical, features);

        let pb = DeterministicGenerator.generate(&a);
        assert_eq!(pb.id, "pb-network-critical");
        assert_eq!(pb.steps[0].action, "block_ip");
        assert_eq!(pb.steps[0].params["ip"], "185.156.47.22");
    }

    #[test]
    fn process_alert_defaults_pid_to_zero_when_absent() {
        let a = alert(EventType::Process, Severity::High, Features::new());
        let pb = DeterministicGenerator.generate(&a);
        assert_eq!(pb.steps[0].action, "kill_process");
        assert_eq!(pb.steps[0].params["pid"], 0);
    }

    #[test]
    fn resolve_persists_a_fresh_generated_playbook() {
        let dir = tempfile::tempdir().unwrap();
        let static_dir = dir.path().join("static");
        let generated_dir = dir.path().join("generated");
        let a = alert(EventType::System, Severity::Critical, Features::new());

        let pb = resolve(&a, &static_dir, &generated_dir, &core_catalog(), &DeterministicGenerator).unwrap();
        assert_eq!(pb.id, "pb-system-critical");
        assert!(generated_dir.join("pb-system-critical.yaml").exists());
    }

    #[test]
    fn resolve_prefers_a_static_playbook_over_generation() {
        let dir = tempfile::tempdir().unwrap();
        let static_dir = dir.path().join("static");
        let generated_dir = dir.path().join("generated");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(
            static_dir.join("pb-process-critical.yaml"),
            "id: pb-process-critical\nversion: \"1\"\nsteps:\n  - isolate_host\n",
        )
        .unwrap();

        let a = alert(EventType::Process, Severity::Critical, Features::new());
        let pb = resolve(&a, &static_dir, &generated_dir, &core_catalog(), &DeterministicGenerator).unwrap();
        assert_eq!(pb.steps[0].action, "isolate_host");
        assert!(!generated_dir.join("pb-process-critical.yaml").exists());
    }
}
