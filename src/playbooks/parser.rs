//! Playbook Parser & Catalog Validator (§4.6): YAML -> structured `Playbook`, tolerant of
//! three step shapes and markdown code fences, strict about the catalog afterwards.
//!
//! Normalisation is done over `serde_json::Value` rather than `serde_yaml::Value`: the YAML
//! document is decoded once, re-expressed as JSON (a YAML mapping is a JSON object), shaped,
//! then deserialised into the canonical `Playbook` type.

use crate::error::{AppError, Result};
use crate::models::{ActionCatalog, Playbook, Step};
use serde_json::{Map, Value};

/// Strips a leading/trailing ` ```yaml ` or ` ``` ` fence, tolerating LLM-authored output.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("yaml").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}

fn title_case(action: &str) -> String {
    action
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalises one step to the canonical `{name, action, params, on_error}` shape.
fn normalize_step(value: &Value) -> Result<Value> {
    match value {
        Value::String(action) => {
            let mut map = Map::new();
            map.insert("name".to_string(), Value::String(title_case(action)));
            map.insert("action".to_string(), Value::String(action.clone()));
            map.insert("params".to_string(), Value::Object(Map::new()));
            Ok(Value::Object(map))
        }
        Value::Object(map) if map.contains_key("action") => Ok(value.clone()),
        Value::Object(map) if map.len() == 1 => {
            let (action, params) = map.iter().next().expect("len == 1");
            let params = match params {
                Value::Object(_) => params.clone(),
                Value::Null => Value::Object(Map::new()),
                other => {
                    return Err(AppError::PlaybookParse(format!(
                        "step '{action}' params must be a mapping, got {other:?}"
                    )))
                }
            };
            let mut out = Map::new();
            out.insert("name".to_string(), Value::String(title_case(action)));
            out.insert("action".to_string(), Value::String(action.clone()));
            out.insert("params".to_string(), params);
            Ok(Value::Object(out))
        }
        other => Err(AppError::PlaybookParse(format!("unrecognised step shape: {other:?}"))),
    }
}

fn normalize_step_list(doc: &mut Map<String, Value>, key: &str) -> Result<()> {
    let Some(list) = doc.get(key) else {
        return Ok(());
    };
    let Value::Array(items) = list else {
        return Err(AppError::PlaybookParse(format!("'{key}' must be a list")));
    };
    let normalized: Result<Vec<Value>> = items.iter().map(normalize_step).collect();
    doc.insert(key.to_string(), Value::Array(normalized?));
    Ok(())
}

fn coerce_version_to_string(doc: &mut Map<String, Value>) {
    let coerced = match doc.get("version") {
        Some(Value::String(_)) | None => return,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => return,
    };
    doc.insert("version".to_string(), Value::String(coerced));
}

/// Every `step.action` (forward and rollback) must be catalogued, with every required
/// param present.
pub fn validate_against_catalog(playbook: &Playbook, catalog: &ActionCatalog) -> Result<()> {
    let check = |step: &Step| -> Result<()> {
        if !catalog.contains(&step.action) {
            return Err(AppError::CatalogViolation(format!(
                "step '{}' references unknown action '{}'",
                step.name, step.action
            )));
        }
        for required in catalog.required_params(&step.action) {
            if !step.params.contains_key(required) {
                return Err(AppError::CatalogViolation(format!(
                    "step '{}' is missing required param '{}' for action '{}'",
                    step.name, required, step.action
                )));
            }
        }
        Ok(())
    };

    playbook.steps.iter().try_for_each(check)?;
    playbook.rollback.iter().try_for_each(check)?;
    Ok(())
}

/// Parses and validates a playbook from raw YAML text (possibly markdown-fenced).
pub fn parse_playbook_yaml(text: &str, catalog: &ActionCatalog) -> Result<Playbook> {
    let cleaned = strip_code_fences(text);
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(cleaned).map_err(|e| AppError::PlaybookParse(e.to_string()))?;
    let mut doc: Value = serde_json::to_value(&yaml_value)?;

    let map = doc
        .as_object_mut()
        .ok_or_else(|| AppError::PlaybookParse("playbook document must be a mapping".to_string()))?;

    coerce_version_to_string(map);
    normalize_step_list(map, "steps")?;
    normalize_step_list(map, "rollback")?;

    let playbook: Playbook = serde_json::from_value(doc)?;
    validate_against_catalog(&playbook, catalog)?;
    Ok(playbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbooks::catalog::core_catalog;

    #[test]
    fn parses_canonical_step_shape() {
        let yaml = r#"
id: pb-process-critical
version: 1
steps:
  - name: Kill the process
    action: kill_process
    params:
      pid: 4242
"#;
        let pb = parse_playbook_yaml(yaml, &core_catalog()).unwrap();
        assert_eq!(pb.version, "1");
        assert_eq!(pb.steps[0].action, "kill_process");
        assert_eq!(pb.steps[0].params["pid"], 4242);
    }

    #[test]
    fn normalises_single_key_mapping_shape() {
        let yaml = r#"
id: pb-network-critical
version: "1"
steps:
  - block_ip:
      ip: 185.156.47.22
"#;
        let pb = parse_playbook_yaml(yaml, &core_catalog()).unwrap();
        assert_eq!(pb.steps[0].name, "Block Ip");
        assert_eq!(pb.steps[0].action, "block_ip");
        assert_eq!(pb.steps[0].params["ip"], "185.156.47.22");
    }

    #[test]
    fn normalises_plain_string_shape_with_no_params() {
        let yaml = r#"
id: pb-system-critical
version: "1"
steps:
  - isolate_host
"#;
        let pb = parse_playbook_yaml(yaml, &core_catalog()).unwrap();
        assert_eq!(pb.steps[0].name, "Isolate Host");
        assert_eq!(pb.steps[0].action, "isolate_host");
        assert!(pb.steps[0].params.is_empty());
    }

    #[test]
    fn strips_markdown_code_fences() {
        let yaml = "```yaml\nid: pb-file-high\nversion: \"1\"\nsteps:\n  - quarantine_file:\n      path: /tmp/x\n```";
        let pb = parse_playbook_yaml(yaml, &core_catalog()).unwrap();
        assert_eq!(pb.id, "pb-file-high");
    }

    #[test]
    fn rejects_unknown_action() {
        let yaml = "id: pb-x\nversion: \"1\"\nsteps:\n  - not_a_real_action\n";
        let err = parse_playbook_yaml(yaml, &core_catalog()).unwrap_err();
        assert!(matches!(err, AppError::CatalogViolation(_)));
    }

    #[test]
    fn rejects_missing_required_param() {
        let yaml = "id: pb-x\nversion: \"1\"\nsteps:\n  - action: kill_process\n    name: Kill\n    params: {}\n";
        let err = parse_playbook_yaml(yaml, &core_catalog()).unwrap_err();
        assert!(matches!(err, AppError::CatalogViolation(_)));
    }

    #[test]
    fn parse_serialize_parse_round_trips_to_the_same_playbook() {
        let yaml = r#"
id: pb-process-critical
version: "1"
steps:
  - block_ip:
      ip: 185.156.47.22
rollback:
  - action: block_ip
    name: Block Ip
    params:
      ip: 185.156.47.22
"#;
        let first = parse_playbook_yaml(yaml, &core_catalog()).unwrap();
        let reserialized = serde_yaml::to_string(&first).unwrap();
        let second = parse_playbook_yaml(&reserialized, &core_catalog()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.version, second.version);
        assert_eq!(first.steps.len(), second.steps.len());
        assert_eq!(first.steps[0].action, second.steps[0].action);
        assert_eq!(first.steps[0].params, second.steps[0].params);
        assert_eq!(first.rollback[0].action, second.rollback[0].action);
    }
}
