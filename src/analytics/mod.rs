//! Feature extraction, detector ensemble, and the alert-routing consumer loop (§4.3, §4.4, §4.2).

mod anomaly;
mod detectors;
mod ensemble;
pub mod features;
mod service;

pub use detectors::Detector;
pub use ensemble::{DetectorEnsemble, EnsembleWeights};
pub use features::FeatureExtractor;
pub use service::AnalyticsService;
