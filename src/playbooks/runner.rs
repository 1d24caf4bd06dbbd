//! Playbook Executor (§4.7): cooldown gate, scoped execution lock, precondition
//! evaluation, sequential step loop, rollback-on-failure, and persistence.

use crate::error::{AppError, Result};
use crate::kv::KvStore;
use crate::models::{Alert, ExecutionResult, OnError, Playbook, Precondition, Step, StepOutcome, StepStatus};
use crate::playbooks::path::get_path;
use crate::playbooks::registry::ActionRegistry;
use crate::storage::RecordTree;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn eval_precondition(pred: &Precondition, root: &serde_json::Value) -> bool {
    match pred {
        Precondition::Equals { equals } => get_path(root, &equals.path) == Some(&equals.value),
        Precondition::Contains { contains } => match get_path(root, &contains.path) {
            Some(serde_json::Value::String(s)) => {
                contains.value.as_str().map(|needle| s.contains(needle)).unwrap_or(false)
            }
            Some(serde_json::Value::Array(items)) => items.contains(&contains.value),
            _ => false,
        },
        Precondition::KeyValue(map) => map
            .iter()
            .all(|(k, v)| get_path(root, &format!("alert.{k}")) == Some(v)),
    }
}

/// An action requiring elevated host privilege; gated by `allow_isolate_host` (§4.7 step 4).
fn requires_privilege(action: &str) -> bool {
    action == "isolate_host"
}

pub struct PlaybookRunner {
    kv: Arc<dyn KvStore>,
    registry: Arc<ActionRegistry>,
    executions: RecordTree,
    cooldown_enabled: bool,
    cooldown_ttl_secs: u64,
    lock_ttl_secs: u64,
    allow_isolate_host: bool,
    persist: bool,
}

impl PlaybookRunner {
    pub fn new(
        kv: Arc<dyn KvStore>,
        registry: Arc<ActionRegistry>,
        executions: RecordTree,
        cooldown_enabled: bool,
        cooldown_ttl_secs: u64,
        lock_ttl_secs: u64,
        allow_isolate_host: bool,
        persist: bool,
    ) -> Self {
        Self {
            kv,
            registry,
            executions,
            cooldown_enabled,
            cooldown_ttl_secs,
            lock_ttl_secs,
            allow_isolate_host,
            persist,
        }
    }

    pub async fn execute(&self, playbook: &Playbook, alert: &Alert) -> Result<ExecutionResult> {
        let id = Uuid::new_v4();
        tracing::info!(execution_id = %id, playbook_id = %playbook.id, alert_id = %alert.id, "execution_started");

        let cooldown_key = format!("cooldown:{}:{}", alert.event_type, alert.severity);
        if self.cooldown_enabled {
            match self.kv.set_nx_ex(&cooldown_key, "1", self.cooldown_ttl_secs).await {
                Ok(true) => {}
                Ok(false) => return Err(AppError::CooldownActive(cooldown_key)),
                Err(err) => tracing::warn!(error = %err, "cooldown store unreachable, proceeding without it"),
            }
        }

        let lock_key = format!("lock:exec:{}:{}", alert.agent_id, alert.event_id);
        let lock_token = id.to_string();
        let lock_acquired = match self.kv.set_nx_ex(&lock_key, &lock_token, self.lock_ttl_secs).await {
            Ok(true) => true,
            Ok(false) => return Err(AppError::LockConflict(lock_key)),
            Err(err) => {
                tracing::warn!(error = %err, "lock store unreachable, proceeding without the lock");
                false
            }
        };

        let outcome = self.run_locked(playbook, alert, id).await;

        if lock_acquired {
            if let Err(err) = self.kv.release_if_match(&lock_key, &lock_token).await {
                tracing::warn!(error = %err, "failed to release execution lock");
            }
        }

        outcome
    }

    async fn run_locked(&self, playbook: &Playbook, alert: &Alert, id: Uuid) -> Result<ExecutionResult> {
        let started_at = Utc::now();
        let root = json!({"alert": alert});

        if !playbook.preconditions.iter().all(|p| eval_precondition(p, &root)) {
            return Err(AppError::Validation("preconditions not met".to_string()));
        }

        let mut outcomes = Vec::with_capacity(playbook.steps.len());
        let mut success = true;
        let mut failure_reason = None;

        for step in &playbook.steps {
            if requires_privilege(&step.action) && !self.allow_isolate_host {
                tracing::info!(step = %step.name, "step_skipped");
                outcomes.push(StepOutcome {
                    step: step.name.clone(),
                    action: step.action.clone(),
                    status: StepStatus::Skipped,
                    output: None,
                    error: None,
                    reason: Some("not_allowed_or_not_admin".to_string()),
                });
                continue;
            }

            let Some(action) = self.registry.get(&step.action) else {
                tracing::error!(step = %step.name, action = %step.action, "step_error: action not registered");
                outcomes.push(StepOutcome {
                    step: step.name.clone(),
                    action: step.action.clone(),
                    status: StepStatus::Error,
                    output: None,
                    error: Some("action not registered".to_string()),
                    reason: None,
                });
                success = false;
                failure_reason = Some(format!("action '{}' not registered", step.action));
                break;
            };

            match action.execute(&step.params).await {
                Ok(output) => {
                    tracing::info!(step = %step.name, "step_executed");
                    outcomes.push(StepOutcome {
                        step: step.name.clone(),
                        action: step.action.clone(),
                        status: StepStatus::Ok,
                        output: Some(output),
                        error: None,
                        reason: None,
                    });
                }
                Err(err) => {
                    tracing::warn!(step = %step.name, error = %err, "step_error");
                    outcomes.push(StepOutcome {
                        step: step.name.clone(),
                        action: step.action.clone(),
                        status: StepStatus::Error,
                        output: None,
                        error: Some(err.to_string()),
                        reason: None,
                    });
                    if matches!(step.on_error, OnError::Continue) {
                        continue;
                    }
                    success = false;
                    failure_reason = Some(format!("step '{}' failed: {err}", step.name));
                    break;
                }
            }
        }

        let rolled_back = if success {
            false
        } else {
            self.rollback(playbook).await;
            true
        };

        let completed_at = Utc::now();
        let execution = ExecutionResult {
            id,
            playbook_id: playbook.id.clone(),
            alert_id: alert.id,
            success,
            steps: outcomes,
            rolled_back,
            failure_reason,
            started_at,
            completed_at,
        };

        if self.persist {
            self.executions.insert(execution.id, &execution)?;
        }

        tracing::info!(execution_id = %id, success, rolled_back, "execution_completed");
        Ok(execution)
    }

    /// Runs `playbook.rollback` if non-empty, else the reverse of `steps`. Rollback
    /// errors are logged, not propagated (§4.7 step 5).
    async fn rollback(&self, playbook: &Playbook) {
        let steps: Vec<&Step> = if !playbook.rollback.is_empty() {
            playbook.rollback.iter().collect()
        } else {
            playbook.steps.iter().rev().collect()
        };

        for step in steps {
            match self.registry.get(&step.action) {
                Some(action) if action.has_rollback() => match action.rollback(&step.params).await {
                    Ok(()) => tracing::info!(step = %step.name, "rollback_step"),
                    Err(err) => tracing::warn!(step = %step.name, error = %err, "rollback_error"),
                },
                _ => tracing::info!(step = %step.name, "rollback step skipped: no_rollback"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;
    use crate::models::{AlertDetails, DetectorReasons, EventType, Features, Severity, Step};
    use crate::playbooks::host_control::DryRunHostControl;
    use crate::playbooks::registry::default_action_registry;
    use crate::storage::RecordStore;
    use std::collections::HashMap;

    fn alert() -> Alert {
        Alert {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            event_type: EventType::Process,
            score: 92.0,
            severity: Severity::Critical,
            source: "analytics".to_string(),
            details: AlertDetails { features: Features::new(), reasons: DetectorReasons::default(), model: "ensemble".to_string() },
            created_at: Utc::now(),
        }
    }

    fn runner(persist: bool) -> (PlaybookRunner, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let executions = store.tree("executions").unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
        let registry = Arc::new(default_action_registry(Arc::new(DryRunHostControl), dir.path().join("quarantine")));
        (PlaybookRunner::new(kv, registry, executions, true, 300, 60, true, persist), dir)
    }

    fn step(name: &str, action: &str, params: HashMap<String, serde_json::Value>, on_error: OnError) -> Step {
        Step { name: name.to_string(), action: action.to_string(), params, on_error }
    }

    #[tokio::test]
    async fn successful_run_persists_no_rollback() {
        let (runner, _dir) = runner(true);
        let mut params = HashMap::new();
        params.insert("pid".to_string(), json!(4242));
        let playbook = Playbook {
            id: "pb-process-critical".to_string(),
            version: "1".to_string(),
            metadata: HashMap::new(),
            preconditions: vec![],
            steps: vec![step("Kill", "kill_process", params, OnError::Stop)],
            rollback: vec![],
        };

        let result = runner.execute(&playbook, &alert()).await.unwrap();
        assert!(result.success);
        assert!(!result.rolled_back);
        assert_eq!(result.steps.len(), 1);
    }

    #[tokio::test]
    async fn second_execution_is_blocked_by_cooldown() {
        let (runner, _dir) = runner(false);
        let playbook = Playbook {
            id: "pb-process-critical".to_string(),
            version: "1".to_string(),
            metadata: HashMap::new(),
            preconditions: vec![],
            steps: vec![step("Isolate", "isolate_host", HashMap::new(), OnError::Stop)],
            rollback: vec![],
        };

        let a = alert();
        runner.execute(&playbook, &a).await.unwrap();
        let second = runner.execute(&playbook, &a).await;
        assert!(matches!(second, Err(AppError::CooldownActive(_))));
    }

    #[tokio::test]
    async fn failed_step_with_stop_triggers_rollback() {
        let (runner, dir) = runner(false);
        let original = dir.path().join("malware.exe");
        tokio::fs::write(&original, b"evil").await.unwrap();

        let mut quarantine_params = HashMap::new();
        quarantine_params.insert("path".to_string(), json!(original.to_string_lossy().to_string()));

        let playbook = Playbook {
            id: "pb-file-critical".to_string(),
            version: "1".to_string(),
            metadata: HashMap::new(),
            preconditions: vec![],
            steps: vec![
                step("Quarantine", "quarantine_file", quarantine_params, OnError::Stop),
                step("Bogus action", "action_not_in_registry", HashMap::new(), OnError::Stop),
            ],
            rollback: vec![],
        };

        let result = runner.execute(&playbook, &alert()).await.unwrap();
        assert!(!result.success);
        assert!(result.rolled_back);
        assert!(original.exists(), "quarantine rollback should restore the file");
    }
}
