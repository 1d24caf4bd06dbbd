//! Action Catalog (§4.8): the four mandatory actions, optionally extended by an
//! `actions.yaml` file on disk.

use crate::error::{AppError, Result};
use crate::models::{ActionCatalog, ActionSpec};
use std::path::Path;

/// The catalog entries every deployment must carry, regardless of `actions.yaml`.
fn core_entries() -> Vec<(&'static str, ActionSpec)> {
    vec![
        (
            "isolate_host",
            ActionSpec {
                params: vec![],
                description: "Block all inbound and outbound traffic on the host, idempotently".to_string(),
            },
        ),
        (
            "kill_process",
            ActionSpec {
                params: vec!["pid".to_string()],
                description: "Force-terminate a process by PID".to_string(),
            },
        ),
        (
            "block_ip",
            ActionSpec {
                params: vec!["ip".to_string()],
                description: "Add bidirectional firewall block rules for an IP, idempotently".to_string(),
            },
        ),
        (
            "quarantine_file",
            ActionSpec {
                params: vec!["path".to_string()],
                description: "Move a file into the quarantine directory".to_string(),
            },
        ),
    ]
}

/// The mandatory four, with no `actions.yaml` override.
pub fn core_catalog() -> ActionCatalog {
    ActionCatalog(core_entries().into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// Loads `actions.yaml` if present and merges it over the core catalog (file entries win
/// on key collision, but can never remove a mandatory action). Missing file is not an
/// error: the core catalog alone is a valid deployment.
pub fn load_catalog(actions_yaml: Option<&Path>) -> Result<ActionCatalog> {
    let mut catalog = core_catalog();

    let Some(path) = actions_yaml else {
        return Ok(catalog);
    };
    if !path.exists() {
        return Ok(catalog);
    }

    let text = std::fs::read_to_string(path)?;
    let extra: ActionCatalog = serde_yaml::from_str(&text)
        .map_err(|e| AppError::PlaybookParse(format!("actions.yaml: {e}")))?;

    catalog.0.extend(extra.0);
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_catalog_has_the_four_mandatory_actions() {
        let catalog = core_catalog();
        assert!(catalog.contains("isolate_host"));
        assert!(catalog.contains("kill_process"));
        assert!(catalog.contains("block_ip"));
        assert!(catalog.contains("quarantine_file"));
        assert_eq!(catalog.required_params("kill_process"), ["pid"]);
        assert_eq!(catalog.required_params("isolate_host"), Vec::<String>::new());
    }

    #[test]
    fn missing_actions_yaml_falls_back_to_core() {
        let catalog = load_catalog(Some(Path::new("/nonexistent/actions.yaml"))).unwrap();
        assert!(catalog.contains("kill_process"));
    }
}
