//! Minimal `/health` + `/metrics` surface shared by all three binaries (§12): liveness
//! plus the per-service counters each exposes, no management API, no websockets.

use axum::{http::header, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

/// Implemented by each service's stats struct so `router` can read its counters without
/// caring which service it's attached to.
pub trait ServiceStats: Send + Sync + 'static {
    fn processed(&self) -> u64;
    fn failed(&self) -> u64;
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    processed: u64,
    failed: u64,
}

pub fn router<S: ServiceStats>(stats: Arc<S>) -> Router {
    Router::new()
        .route(
            "/health",
            get(move || {
                let stats = stats.clone();
                async move {
                    Json(HealthResponse {
                        status: "healthy",
                        version: env!("CARGO_PKG_VERSION"),
                        processed: stats.processed(),
                        failed: stats.failed(),
                    })
                }
            }),
        )
        .route("/metrics", get(metrics))
}

/// Renders the default Prometheus registry (messaging counters, detector/cache gauges
/// registered elsewhere via `lazy_static`) as text exposition format.
async fn metrics() -> impl axum::response::IntoResponse {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf)
}

pub fn init_tracing(log_level: &str, json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
