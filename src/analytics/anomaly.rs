//! Isolation-forest anomaly detector (§4.4): scores a feature vector against a
//! pre-trained model loaded from `enrichment.models_dir` (models are produced offline —
//! training is explicitly out of scope here, only loading and scoring).

use crate::analytics::detectors::Detector;
use crate::models::Features;
use async_trait::async_trait;
use dashmap::DashMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn path_length(&self, x: &Array1<f64>, depth: u32) -> f64 {
        match self {
            TreeNode::Leaf { size } => depth as f64 + average_path_length(*size),
            TreeNode::Split { feature, threshold, left, right } => {
                let value = x.get(*feature).copied().unwrap_or(0.0);
                if value < *threshold {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` nodes, the standard
/// isolation-forest normalization constant `c(n)`.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * harmonic(n - 1.0) - (2.0 * (n - 1.0) / n)
}

fn harmonic(n: f64) -> f64 {
    const EULER_MASCHERONI: f64 = 0.5772156649015329;
    n.ln() + EULER_MASCHERONI
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<TreeNode>,
    feature_names: Vec<String>,
    sample_size: usize,
}

impl IsolationForest {
    fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn feature_vector(&self, features: &Features) -> Array1<f64> {
        let pairs: std::collections::HashMap<String, f64> = features.numeric_vector().into_iter().collect();
        Array1::from_iter(self.feature_names.iter().map(|name| pairs.get(name).copied().unwrap_or(0.0)))
    }

    /// Average normalized path length across all trees, mapped to sklearn's
    /// `decision_function` convention: negative values are anomalous.
    fn decision_function(&self, x: &Array1<f64>) -> f64 {
        let c = average_path_length(self.sample_size);
        if c <= 0.0 || self.trees.is_empty() {
            return 0.0;
        }
        let avg_path: f64 =
            self.trees.iter().map(|t| t.path_length(x, 0)).sum::<f64>() / self.trees.len() as f64;
        let anomaly_score = 2f64.powf(-avg_path / c);
        0.5 - anomaly_score
    }

    fn predict(&self, decision: f64) -> i32 {
        if decision < 0.0 {
            -1
        } else {
            1
        }
    }
}

/// One model per `event_type`, lazily loaded and cached; a missing model file is
/// swallowed into a zero score rather than failing the event (§4.4).
pub struct AnomalyDetector {
    models_dir: PathBuf,
    loaded: DashMap<String, Option<IsolationForest>>,
}

impl AnomalyDetector {
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir, loaded: DashMap::new() }
    }

    fn model_for(&self, event_type: &str) -> Option<IsolationForest> {
        if let Some(cached) = self.loaded.get(event_type) {
            return cached.clone();
        }
        let path = self.models_dir.join(format!("{event_type}.json"));
        let model = match IsolationForest::load(&path) {
            Ok(model) => Some(model),
            Err(err) => {
                tracing::debug!(event_type, error = %err, "no isolation-forest model available, anomaly detector contributes 0");
                None
            }
        };
        self.loaded.insert(event_type.to_string(), model.clone());
        model
    }
}

#[async_trait]
impl Detector for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    async fn detect(&self, _agent_id: &str, event_type: &str, features: &Features) -> (f64, Vec<String>) {
        let vector = features.numeric_vector();
        if vector.is_empty() {
            return (0.0, vec![]);
        }

        let Some(model) = self.model_for(event_type) else {
            return (0.0, vec![]);
        };

        let x = model.feature_vector(features);
        let decision = model.decision_function(&x);
        if model.predict(decision) == -1 {
            let score = (100.0 + decision * 100.0).clamp(0.0, 100.0);
            (score, vec!["anomaly_high".to_string()])
        } else {
            (0.0, vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_split_forest() -> IsolationForest {
        IsolationForest {
            trees: vec![TreeNode::Split {
                feature: 0,
                threshold: 5.0,
                left: Box::new(TreeNode::Leaf { size: 1 }),
                right: Box::new(TreeNode::Leaf { size: 50 }),
            }],
            feature_names: vec!["x".to_string()],
            sample_size: 50,
        }
    }

    #[test]
    fn a_short_path_yields_a_negative_decision_function() {
        let model = single_split_forest();
        let x = Array1::from_vec(vec![1.0]);
        let decision = model.decision_function(&x);
        assert_eq!(model.predict(decision), -1);
    }

    #[tokio::test]
    async fn detector_contributes_zero_on_empty_feature_vector() {
        let detector = AnomalyDetector::new(PathBuf::from("/nonexistent"));
        let features = Features::new();
        let (score, reasons) = detector.detect("agent-1", "process", &features).await;
        assert_eq!(score, 0.0);
        assert!(reasons.is_empty());
    }

    #[tokio::test]
    async fn detector_contributes_zero_when_model_file_is_missing() {
        let detector = AnomalyDetector::new(PathBuf::from("/nonexistent"));
        let mut features = Features::new();
        features.insert("cpu_usage", 99.0);
        let (score, reasons) = detector.detect("agent-1", "system", &features).await;
        assert_eq!(score, 0.0);
        assert!(reasons.is_empty());
    }
}
