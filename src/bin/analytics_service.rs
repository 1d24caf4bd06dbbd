//! Analytics Service entrypoint: consumes `events.enriched.#`, scores alerts, publishes
//! `alerts.#` (§4.2-§4.4).

use edr_backplane::config::Config;
use edr_backplane::analytics::AnalyticsService;
use edr_backplane::health;
use edr_backplane::kv::create_kv_store;
use edr_backplane::storage::RecordStore;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    health::init_tracing(&config.observability.log_level, config.observability.json_logs);

    tracing::info!("starting analytics-service v{}", env!("CARGO_PKG_VERSION"));

    let kv = create_kv_store(&config.redis).await?;
    let store = RecordStore::open(config.data.base_dir.join("db"))?;
    let alerts = store.tree("alerts")?;

    let service = AnalyticsService::connect(&config, kv, alerts).await?;
    let stats = service.stats.clone();

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.health_port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, health::router(stats)).await {
            tracing::error!(error = %err, "health server exited");
        }
    });

    service.run().await?;
    Ok(())
}
