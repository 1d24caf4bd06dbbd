//! Rule-based and online-behavioral detectors (§4.4). The isolation-forest anomaly
//! detector lives in `analytics::anomaly` since it needs its own model-loading concerns.

use crate::models::Features;
use async_trait::async_trait;
use dashmap::DashMap;

/// Shared capability: score a feature set, return reason tags. Implementations never
/// fail the event on error — a detector that can't score contributes `(0.0, [])`.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    async fn detect(&self, agent_id: &str, event_type: &str, features: &Features) -> (f64, Vec<String>);
}

/// Five fixed predicates, deterministic and pure, each worth +20 capped at 100 (§4.4).
pub struct RuleDetector;

#[async_trait]
impl Detector for RuleDetector {
    fn name(&self) -> &'static str {
        "rule"
    }

    async fn detect(&self, _agent_id: &str, _event_type: &str, features: &Features) -> (f64, Vec<String>) {
        let predicates: [(usize, bool); 5] = [
            (1, features.get_f64("threat_score").unwrap_or(0.0) >= 80.0),
            (2, features.get_f64("vt_positives").unwrap_or(0.0) > 10.0),
            (3, features.get_f64("yara_hits_count").unwrap_or(0.0) >= 2.0),
            (
                4,
                features.get_bool("is_system_parent") && features.get_f64("proc_freq_per_hour").unwrap_or(0.0) > 5.0,
            ),
            (5, features.get_bool("is_suspicious_path")),
        ];

        let mut score = 0.0;
        let mut reasons = Vec::new();
        for (i, hit) in predicates {
            if hit {
                score = (score + 20.0_f64).min(100.0);
                reasons.push(format!("rule_{i}"));
            }
        }
        (score, reasons)
    }
}

/// Tracks per-dimension mean/variance online (Welford's algorithm); gives a z-score for
/// new observations before folding them into the running statistics.
#[derive(Debug, Clone, Default)]
struct RunningStat {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStat {
    fn z_score(&self, x: f64) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let variance = self.m2 / (self.count as f64 - 1.0);
        let stddev = variance.sqrt();
        // A baseline with no observed spread yet still has to treat any departure as
        // maximally surprising, not invisible (sklearn's StandardScaler does the same:
        // a zero-variance column gets scale 1.0 rather than a division by zero).
        let scale = if stddev < f64::EPSILON { 1.0 } else { stddev };
        (x - self.mean) / scale
    }

    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }
}

/// z-value at which a standard normal's two-sided tail reaches 5% (quantile 0.95),
/// the threshold the spec's streaming detector filters against.
const QUANTILE_95_Z: f64 = 1.645;

/// One online model per `(agent_id, event_type)`: a per-dimension standard scaler
/// feeding a quantile-filtered outlier score, standing in for the source's
/// standard-scaler + half-space-trees streaming pipeline (no such crate is in the
/// dependency stack; this hand-rolled model keeps the score-then-learn discipline and
/// the 0.95-quantile threshold without inventing a dependency).
#[derive(Debug, Clone, Default)]
struct StreamingModel {
    dims: Vec<RunningStat>,
}

impl StreamingModel {
    fn score_one(&self, x: &[f64]) -> f64 {
        if self.dims.len() != x.len() {
            return 0.0;
        }
        let mean_abs_z: f64 = self
            .dims
            .iter()
            .zip(x)
            .map(|(dim, &v)| dim.z_score(v).abs())
            .sum::<f64>()
            / x.len().max(1) as f64;

        // Squash so scores stay near 0 below the quantile threshold and climb toward 1
        // as the observation moves further into the tail.
        1.0 - (-((mean_abs_z / QUANTILE_95_Z).powi(2))).exp()
    }

    fn learn_one(&mut self, x: &[f64]) {
        if self.dims.len() != x.len() {
            self.dims = vec![RunningStat::default(); x.len()];
        }
        for (dim, &v) in self.dims.iter_mut().zip(x) {
            dim.update(v);
        }
    }
}

fn behavioral_vector(event_type: &str, features: &Features) -> Vec<f64> {
    match event_type {
        "process" => vec![
            features.get_f64("command_line_len").unwrap_or(0.0),
            features.get_f64("proc_freq_per_hour").unwrap_or(0.0),
        ],
        "file" => vec![
            features.get_f64("file_size").unwrap_or(0.0),
            features.get_f64("temp_file_freq").unwrap_or(0.0),
            features.get_f64("yara_hits").unwrap_or(0.0),
        ],
        "network" => vec![
            features.get_f64("bytes_sent").unwrap_or(0.0) + features.get_f64("bytes_received").unwrap_or(0.0),
            features.get_f64("remote_port").unwrap_or(0.0),
        ],
        "system" => vec![
            features.get_f64("cpu_usage").unwrap_or(0.0),
            features.get_f64("memory_used_pct").unwrap_or(0.0),
            features.get_f64("disk_usage").unwrap_or(0.0),
        ],
        _ => vec![],
    }
}

/// Holds one `StreamingModel` per `(agent_id, event_type)`, created on first sighting.
/// Models are in-process, not shared across replicas (§4.4).
pub struct BehavioralDetector {
    models: DashMap<(String, String), StreamingModel>,
}

impl BehavioralDetector {
    pub fn new() -> Self {
        Self { models: DashMap::new() }
    }
}

impl Default for BehavioralDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for BehavioralDetector {
    fn name(&self) -> &'static str {
        "behavioral"
    }

    async fn detect(&self, agent_id: &str, event_type: &str, features: &Features) -> (f64, Vec<String>) {
        let vector = behavioral_vector(event_type, features);
        if vector.is_empty() {
            return (0.0, vec![]);
        }

        let key = (agent_id.to_string(), event_type.to_string());
        let mut model = self.models.entry(key).or_default();

        let score = model.score_one(&vector);
        model.learn_one(&vector);

        if score > 0.8 {
            (((score * 100.0).min(100.0)), vec!["behavioral_outlier".to_string()])
        } else {
            (0.0, vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_detector_hits_all_five_predicates() {
        let mut features = Features::new();
        features.insert("threat_score", 95.0);
        features.insert("vt_positives", 67.0);
        features.insert("yara_hits_count", 3.0);
        features.insert("is_system_parent", true);
        features.insert("proc_freq_per_hour", 9.0);
        features.insert("is_suspicious_path", true);

        let (score, reasons) = RuleDetector.detect("agent-1", "process", &features).await;
        assert_eq!(score, 100.0);
        assert_eq!(reasons, vec!["rule_1", "rule_2", "rule_3", "rule_4", "rule_5"]);
    }

    #[tokio::test]
    async fn rule_detector_scores_zero_on_benign_features() {
        let features = Features::new();
        let (score, reasons) = RuleDetector.detect("agent-1", "process", &features).await;
        assert_eq!(score, 0.0);
        assert!(reasons.is_empty());
    }

    #[tokio::test]
    async fn behavioral_detector_is_quiet_until_enough_history_exists() {
        let detector = BehavioralDetector::new();
        let mut features = Features::new();
        features.insert("cpu_usage", 40.0);
        features.insert("memory_used_pct", 50.0);
        features.insert("disk_usage", 60.0);

        let (score, _) = detector.detect("agent-1", "system", &features).await;
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn behavioral_detector_flags_a_sharp_departure_from_baseline() {
        let detector = BehavioralDetector::new();
        let mut baseline = Features::new();
        baseline.insert("cpu_usage", 40.0);
        baseline.insert("memory_used_pct", 50.0);
        baseline.insert("disk_usage", 60.0);

        for _ in 0..30 {
            detector.detect("agent-1", "system", &baseline).await;
        }

        let mut spike = Features::new();
        spike.insert("cpu_usage", 400.0);
        spike.insert("memory_used_pct", 500.0);
        spike.insert("disk_usage", 600.0);

        let (score, reasons) = detector.detect("agent-1", "system", &spike).await;
        assert!(score > 0.0);
        assert_eq!(reasons, vec!["behavioral_outlier".to_string()]);
    }
}
