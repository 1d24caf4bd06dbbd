//! Playbook Engine service: consumes `alerts.*`, resolves a playbook (§4.9), executes it
//! (§4.7), and runs the Decision Engine's scheduled poll in the same process (§4.5 — the
//! Playbook Engine is the consumer of Decisions).

use crate::config::Config;
use crate::decision::DecisionEngine;
use crate::error::{AppError, Result};
use crate::kv::KvStore;
use crate::messaging::{alert_wildcard, MessagingService};
use crate::models::{ActionCatalog, Alert};
use crate::playbooks::catalog::load_catalog;
use crate::playbooks::host_control::select_host_control;
use crate::playbooks::registry::default_action_registry;
use crate::playbooks::resolution::{resolve, DeterministicGenerator, PlaybookGenerator};
use crate::playbooks::runner::PlaybookRunner;
use crate::storage::RecordTree;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;

#[derive(Debug, Default)]
pub struct PlaybookEngineStats {
    pub processed: AtomicU64,
    pub executed: AtomicU64,
    pub failed: AtomicU64,
}

impl crate::health::ServiceStats for PlaybookEngineStats {
    fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
    fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct PlaybookEngineService {
    bus: Arc<MessagingService>,
    runner: PlaybookRunner,
    catalog: ActionCatalog,
    generator: Box<dyn PlaybookGenerator>,
    static_dir: PathBuf,
    generated_dir: PathBuf,
    pub stats: Arc<PlaybookEngineStats>,
}

impl PlaybookEngineService {
    pub async fn connect(config: &Config, kv: Arc<dyn KvStore>, alerts: RecordTree, decisions: RecordTree, executions: RecordTree) -> Result<(Self, Arc<DecisionEngine>)> {
        let bus = MessagingService::connect(config.messaging.clone(), "playbook-engine", "playbook-engine-group")
            .await
            .map_err(AppError::from)?;

        let catalog = load_catalog(Some(&config.data.base_dir.join("actions.yaml")))?;
        let host = select_host_control(config.execution.mode.clone());
        let registry = Arc::new(default_action_registry(host, config.execution.quarantine_dir.clone()));
        let runner = PlaybookRunner::new(
            kv,
            registry,
            executions,
            config.redis.cooldown_enabled,
            config.redis.cooldown_ttl_secs,
            config.redis.lock_ttl_secs,
            config.execution.allow_isolate_host,
            config.execution.persist,
        );

        let decision_engine = Arc::new(DecisionEngine::new(alerts, decisions));

        let service = Self {
            bus: Arc::new(bus),
            runner,
            catalog,
            generator: Box::new(DeterministicGenerator),
            static_dir: config.data.playbooks_static.clone(),
            generated_dir: config.data.playbooks_generated.clone(),
            stats: Arc::new(PlaybookEngineStats::default()),
        };

        Ok((service, decision_engine))
    }

    /// Starts the decision engine's cron poll; the returned scheduler must be kept alive
    /// for the process lifetime.
    pub async fn schedule_decisions(decision_engine: Arc<DecisionEngine>, interval_secs: u64) -> Result<JobScheduler> {
        decision_engine.schedule(interval_secs).await
    }

    pub async fn run(&self) -> Result<()> {
        let mut stream = self.bus.subscribe::<Alert>(alert_wildcard()).await.map_err(AppError::from)?;

        loop {
            let message = stream.next().await.map_err(AppError::from)?;
            let Some(alert) = message else {
                continue;
            };

            match self.process_one(&alert).await {
                Ok(()) => {
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                    stream.ack().await.map_err(AppError::from)?;
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %err, alert_id = %alert.id, "playbook engine failed, nacking without requeue");
                    stream.nack().await.map_err(AppError::from)?;
                }
            }
        }
    }

    async fn process_one(&self, alert: &Alert) -> Result<()> {
        let playbook = resolve(alert, &self.static_dir, &self.generated_dir, &self.catalog, self.generator.as_ref())?;

        let result = match self.runner.execute(&playbook, alert).await {
            Ok(result) => result,
            Err(err @ (AppError::CooldownActive(_) | AppError::LockConflict(_))) => {
                tracing::info!(alert_id = %alert.id, playbook_id = %playbook.id, error = %err, "playbook rate-limited, acking without executing");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if result.success {
            self.stats.executed.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::warn!(alert_id = %alert.id, playbook_id = %playbook.id, reason = ?result.failure_reason, "playbook execution did not succeed");
        }

        Ok(())
    }
}
