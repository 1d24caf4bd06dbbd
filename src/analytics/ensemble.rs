//! Weighted-sum combination of the three detectors (§4.4).

use crate::analytics::anomaly::AnomalyDetector;
use crate::analytics::detectors::{BehavioralDetector, Detector, RuleDetector};
use crate::models::{DetectorReasons, Features};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct EnsembleWeights {
    pub rule: f64,
    pub anomaly: f64,
    pub behavioral: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self { rule: 0.4, anomaly: 0.3, behavioral: 0.3 }
    }
}

pub struct DetectorEnsemble {
    rule: RuleDetector,
    anomaly: AnomalyDetector,
    behavioral: BehavioralDetector,
    weights: EnsembleWeights,
}

impl DetectorEnsemble {
    pub fn new(models_dir: PathBuf) -> Self {
        Self::with_weights(models_dir, EnsembleWeights::default())
    }

    pub fn with_weights(models_dir: PathBuf, weights: EnsembleWeights) -> Self {
        Self {
            rule: RuleDetector,
            anomaly: AnomalyDetector::new(models_dir),
            behavioral: BehavioralDetector::new(),
            weights,
        }
    }

    /// Runs all three detectors and combines them by weighted sum, rounded to 2
    /// decimals. Any individual detector failing contributes `(0.0, [])` (§4.4) — the
    /// `Detector` trait already bakes that in by never returning an error.
    pub async fn score(&self, agent_id: &str, event_type: &str, features: &Features) -> (f64, DetectorReasons) {
        let (rule_score, rule_reasons) = self.rule.detect(agent_id, event_type, features).await;
        let (anomaly_score, anomaly_reasons) = self.anomaly.detect(agent_id, event_type, features).await;
        let (behavioral_score, behavioral_reasons) = self.behavioral.detect(agent_id, event_type, features).await;

        let combined = rule_score * self.weights.rule
            + anomaly_score * self.weights.anomaly
            + behavioral_score * self.weights.behavioral;
        let rounded = (combined * 100.0).round() / 100.0;

        (
            rounded,
            DetectorReasons {
                rule: rule_reasons,
                anomaly: anomaly_reasons,
                behavioral: behavioral_reasons,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn combines_detectors_by_default_weights() {
        let ensemble = DetectorEnsemble::new(PathBuf::from("/nonexistent"));
        let mut features = Features::new();
        features.insert("threat_score", 95.0);
        features.insert("vt_positives", 67.0);
        features.insert("yara_hits_count", 3.0);
        features.insert("is_system_parent", true);
        features.insert("proc_freq_per_hour", 9.0);
        features.insert("is_suspicious_path", true);

        let (score, reasons) = ensemble.score("agent-1", "process", &features).await;
        // rule alone maxes at 100 * 0.4 = 40; anomaly/behavioral are 0 with no model/history.
        assert_eq!(score, 40.0);
        assert_eq!(reasons.rule.len(), 5);
        assert!(reasons.anomaly.is_empty());
    }
}
