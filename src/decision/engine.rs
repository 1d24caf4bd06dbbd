//! Ordered heuristic mapping an `Alert` to a `(recommended_action, priority, rationale)`
//! (§4.5), run on a cron-scheduled poll.

use crate::error::Result;
use crate::models::{Alert, Decision, DecisionStatus, RecommendedAction, Severity};
use crate::storage::RecordTree;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct DecisionEngine {
    alerts: RecordTree,
    decisions: RecordTree,
}

impl DecisionEngine {
    pub fn new(alerts: RecordTree, decisions: RecordTree) -> Self {
        Self { alerts, decisions }
    }

    /// Computes the ordered recommendation for one alert (§4.5 rules 1-6).
    fn recommend(alert: &Alert) -> (RecommendedAction, f64, serde_json::Value) {
        let f = &alert.details.features;
        let event_type = alert.event_type.to_string();

        if matches!(alert.severity, Severity::Critical | Severity::High) || alert.score >= 80.0 {
            return (
                RecommendedAction::IsolateHost,
                5.0,
                json!({"rule": 1, "reason": "severity or score crosses the isolate threshold"}),
            );
        }

        if event_type == "process" && (f.get_bool("hash_known_malicious") || f.get_f64("vt_positives").unwrap_or(0.0) > 50.0) {
            return (
                RecommendedAction::TerminateProcess,
                4.0,
                json!({"rule": 2, "reason": "known-malicious hash or high VT positives"}),
            );
        }

        if event_type == "process" && f.get_bool("is_suspicious_path") {
            return (
                RecommendedAction::QuarantineFile,
                3.0,
                json!({"rule": 3, "reason": "process running from a suspicious path"}),
            );
        }

        if event_type == "network" && !f.get_bool("is_private_ip") && !f.get_bool("is_loopback") {
            return (
                RecommendedAction::BlockIp,
                3.5,
                json!({"rule": 4, "reason": "public, non-loopback remote address"}),
            );
        }

        if event_type == "file" && f.get_f64("yara_hits").unwrap_or(0.0) > 0.0 {
            return (
                RecommendedAction::QuarantineFile,
                3.5,
                json!({"rule": 5, "reason": "yara hit on file event"}),
            );
        }

        (RecommendedAction::NotifySoc, 1.0, json!({"rule": 6, "reason": "no higher-priority rule matched"}))
    }

    /// Scans alerts from the last 24h lacking a Decision and inserts one per match.
    /// Returns the count of decisions created. Idempotent: `insert_if_absent` on the
    /// decisions tree enforces exactly-one-Decision-per-Alert even under concurrent runs.
    pub async fn run_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(24);
        let alerts: Vec<Alert> = self.alerts.scan_all()?;
        let decisions: Vec<Decision> = self.decisions.scan_all()?;
        let decided: HashSet<Uuid> = decisions.iter().map(|d| d.alert_id).collect();

        let mut created = 0;
        for alert in alerts.into_iter().filter(|a| a.created_at >= cutoff && !decided.contains(&a.id)) {
            let (action, priority, rationale) = Self::recommend(&alert);
            let rationale = rationale
                .as_object()
                .cloned()
                .map(|m| m.into_iter().collect())
                .unwrap_or_default();

            let decision = Decision::new(
                alert.id,
                alert.agent_id.clone(),
                alert.event_type,
                alert.severity,
                alert.score,
                action,
                priority,
                rationale,
            );

            if self.decisions.insert_if_absent(decision.id, &decision)? {
                created += 1;
            }
        }

        Ok(created)
    }

    /// Runs `run_once` on the configured interval via `tokio-cron-scheduler`. Returns the
    /// scheduler handle so the caller can hold it alive for the process lifetime.
    pub async fn schedule(self: Arc<Self>, interval_secs: u64) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| crate::error::AppError::Configuration(e.to_string()))?;

        let engine = self.clone();
        let cron = format!("*/{interval_secs} * * * * *");
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                match engine.run_once().await {
                    Ok(count) if count > 0 => tracing::info!(count, "decision engine created new decisions"),
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "decision engine poll failed"),
                }
            })
        })
        .map_err(|e| crate::error::AppError::Configuration(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| crate::error::AppError::Configuration(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| crate::error::AppError::Configuration(e.to_string()))?;

        Ok(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertDetails, DetectorReasons, EventType, Features};
    use crate::storage::RecordStore;

    fn alert(event_type: EventType, score: f64, features: Features) -> Alert {
        Alert::new(Uuid::new_v4(), "agent-1".to_string(), event_type, score, features, DetectorReasons::default())
    }

    fn stores() -> (RecordTree, RecordTree, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        (store.tree("alerts").unwrap(), store.tree("decisions").unwrap(), dir)
    }

    #[tokio::test]
    async fn critical_alerts_recommend_isolation() {
        let (alerts, decisions, _dir) = stores();
        let engine = DecisionEngine::new(alerts.clone(), decisions.clone());

        let alert = alert(EventType::Process, 92.0, Features::new());
        alerts.insert(alert.id, &alert).unwrap();

        let created = engine.run_once().await.unwrap();
        assert_eq!(created, 1);

        let stored: Vec<Decision> = decisions.scan_all().unwrap();
        assert_eq!(stored[0].recommended_action, RecommendedAction::IsolateHost);
        assert_eq!(stored[0].status, DecisionStatus::Pending);
    }

    #[tokio::test]
    async fn rerunning_does_not_duplicate_decisions() {
        let (alerts, decisions, _dir) = stores();
        let engine = DecisionEngine::new(alerts.clone(), decisions.clone());

        let alert = alert(EventType::Network, 55.0, Features::new());
        alerts.insert(alert.id, &alert).unwrap();

        engine.run_once().await.unwrap();
        let second_pass = engine.run_once().await.unwrap();

        assert_eq!(second_pass, 0);
        assert_eq!(decisions.len(), 1);
    }

    #[tokio::test]
    async fn suspicious_process_path_recommends_quarantine() {
        let (alerts, decisions, _dir) = stores();
        let engine = DecisionEngine::new(alerts.clone(), decisions.clone());

        let mut features = Features::new();
        features.insert("is_suspicious_path", true);
        let alert = alert(EventType::Process, 55.0, features);
        alerts.insert(alert.id, &alert).unwrap();

        engine.run_once().await.unwrap();
        let stored: Vec<Decision> = decisions.scan_all().unwrap();
        assert_eq!(stored[0].recommended_action, RecommendedAction::QuarantineFile);
    }
}
