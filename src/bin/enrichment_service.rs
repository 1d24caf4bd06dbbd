//! Enrichment Service entrypoint: consumes `events.raw.#`, publishes `events.enriched.#`.

use edr_backplane::config::Config;
use edr_backplane::enrichment::EnrichmentService;
use edr_backplane::health;
use edr_backplane::storage::RecordStore;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    health::init_tracing(&config.observability.log_level, config.observability.json_logs);

    tracing::info!("starting enrichment-service v{}", env!("CARGO_PKG_VERSION"));

    let store = RecordStore::open(config.data.base_dir.join("db"))?;
    let enrichments = store.tree("enrichments")?;

    let service = EnrichmentService::connect(&config, enrichments).await?;
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
