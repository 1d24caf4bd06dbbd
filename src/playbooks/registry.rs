//! Action Registry (§4.8): the four mandatory actions behind a `HostControl` backend,
//! plus the file-quarantine action which is host-agnostic.

use crate::error::{AppError, Result};
use crate::playbooks::host_control::HostControl;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, params: &HashMap<String, JsonValue>) -> Result<JsonValue>;

    /// Whether this action has a registered rollback (§4.7 step 5). Default: none.
    fn has_rollback(&self) -> bool {
        false
    }

    async fn rollback(&self, _params: &HashMap<String, JsonValue>) -> Result<()> {
        Ok(())
    }
}

fn required_str<'a>(params: &'a HashMap<String, JsonValue>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| AppError::ActionFailed(format!("missing or non-string param '{key}'")))
}

fn required_i64(params: &HashMap<String, JsonValue>, key: &str) -> Result<i64> {
    params
        .get(key)
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| AppError::ActionFailed(format!("missing or non-integer param '{key}'")))
}

pub struct IsolateHostAction {
    host: Arc<dyn HostControl>,
}

impl IsolateHostAction {
    pub fn new(host: Arc<dyn HostControl>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Action for IsolateHostAction {
    fn name(&self) -> &'static str {
        "isolate_host"
    }

    async fn execute(&self, _params: &HashMap<String, JsonValue>) -> Result<JsonValue> {
        self.host.isolate_host().await?;
        Ok(json!({"isolated": true}))
    }

    fn has_rollback(&self) -> bool {
        true
    }

    async fn rollback(&self, _params: &HashMap<String, JsonValue>) -> Result<()> {
        self.host.restore_host().await
    }
}

pub struct KillProcessAction {
    host: Arc<dyn HostControl>,
}

impl KillProcessAction {
    pub fn new(host: Arc<dyn HostControl>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Action for KillProcessAction {
    fn name(&self) -> &'static str {
        "kill_process"
    }

    async fn execute(&self, params: &HashMap<String, JsonValue>) -> Result<JsonValue> {
        let pid = required_i64(params, "pid")?;
        let killed = self.host.kill_process(pid).await?;
        Ok(json!({"pid": pid, "already_terminated": !killed}))
    }

    // Table says "None (noop)": a terminated process cannot be un-terminated.
}

pub struct BlockIpAction {
    host: Arc<dyn HostControl>,
}

impl BlockIpAction {
    pub fn new(host: Arc<dyn HostControl>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Action for BlockIpAction {
    fn name(&self) -> &'static str {
        "block_ip"
    }

    async fn execute(&self, params: &HashMap<String, JsonValue>) -> Result<JsonValue> {
        let ip = required_str(params, "ip")?;
        self.host.block_ip(ip).await?;
        Ok(json!({"blocked": ip}))
    }

    fn has_rollback(&self) -> bool {
        true
    }

    async fn rollback(&self, params: &HashMap<String, JsonValue>) -> Result<()> {
        let ip = required_str(params, "ip")?;
        self.host.unblock_ip(ip).await
    }
}

pub struct QuarantineFileAction {
    quarantine_dir: PathBuf,
}

impl QuarantineFileAction {
    pub fn new(quarantine_dir: PathBuf) -> Self {
        Self { quarantine_dir }
    }

    fn quarantined_path(&self, original: &str) -> PathBuf {
        let basename = Path::new(original)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let mut hasher = Sha1::new();
        hasher.update(original.as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.quarantine_dir.join(format!("{basename}.{}.quar", &digest[..8]))
    }
}

#[async_trait]
impl Action for QuarantineFileAction {
    fn name(&self) -> &'static str {
        "quarantine_file"
    }

    async fn execute(&self, params: &HashMap<String, JsonValue>) -> Result<JsonValue> {
        let path = required_str(params, "path")?;
        let dest = self.quarantined_path(path);
        tokio::fs::create_dir_all(&self.quarantine_dir).await?;

        match tokio::fs::rename(path, &dest).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::ActionFailed(format!("file not found: {path}")));
            }
            Err(_) => {
                // Cross-device rename: fall back to copy + remove.
                tokio::fs::copy(path, &dest).await?;
                tokio::fs::remove_file(path).await?;
            }
        }

        Ok(json!({"quarantined_to": dest.to_string_lossy()}))
    }

    fn has_rollback(&self) -> bool {
        true
    }

    async fn rollback(&self, params: &HashMap<String, JsonValue>) -> Result<()> {
        let path = required_str(params, "path")?;
        let dest = self.quarantined_path(path);
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&dest, path).await?;
        Ok(())
    }
}

pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self { actions: HashMap::new() }
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers the four mandatory actions (§4.8) behind the given host-control backend.
pub fn default_action_registry(host: Arc<dyn HostControl>, quarantine_dir: PathBuf) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(IsolateHostAction::new(host.clone())));
    registry.register(Arc::new(KillProcessAction::new(host.clone())));
    registry.register(Arc::new(BlockIpAction::new(host)));
    registry.register(Arc::new(QuarantineFileAction::new(quarantine_dir)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbooks::host_control::DryRunHostControl;

    #[tokio::test]
    async fn kill_process_reports_pid_and_termination_state() {
        let action = KillProcessAction::new(Arc::new(DryRunHostControl));
        let mut params = HashMap::new();
        params.insert("pid".to_string(), json!(4242));
        let output = action.execute(&params).await.unwrap();
        assert_eq!(output["pid"], 4242);
        assert_eq!(output["already_terminated"], false);
    }

    #[tokio::test]
    async fn quarantine_and_rollback_round_trip_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("malware.exe");
        tokio::fs::write(&original, b"evil").await.unwrap();

        let action = QuarantineFileAction::new(dir.path().join("quarantine"));
        let mut params = HashMap::new();
        params.insert("path".to_string(), json!(original.to_string_lossy().to_string()));

        action.execute(&params).await.unwrap();
        assert!(!original.exists());

        action.rollback(&params).await.unwrap();
        assert!(original.exists());
        assert_eq!(tokio::fs::read(&original).await.unwrap(), b"evil");
    }

    #[test]
    fn kill_process_has_no_rollback() {
        let action = KillProcessAction::new(Arc::new(DryRunHostControl));
        assert!(!action.has_rollback());
    }
}
