//! Playbook Engine entrypoint: consumes `alerts.#`, resolves and executes playbooks
//! (§4.6-§4.9), and hosts the Decision Engine's scheduled poll in the same process (§4.5).

use edr_backplane::config::Config;
use edr_backplane::health;
use edr_backplane::kv::create_kv_store;
use edr_backplane::playbooks::PlaybookEngineService;
use edr_backplane::storage::RecordStore;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    health::init_tracing(&config.observability.log_level, config.observability.json_logs);

    tracing::info!("starting playbook-engine v{}", env!("CARGO_PKG_VERSION"));

    let kv = create_kv_store(&config.redis).await?;
    let store = RecordStore::open(config.data.base_dir.join("db"))?;
    let alerts = store.tree("alerts")?;
    let decisions = store.tree("decisions")?;
    let executions = store.tree("executions")?;

    let (service, decision_engine) = PlaybookEngineService::connect(&config, kv, alerts, decisions, executions).await?;
    let stats = service.stats.clone();

    // Kept alive for the process lifetime; dropping it stops the cron job.
    let _scheduler = PlaybookEngineService::schedule_decisions(decision_engine, config.execution.decision_interval_secs).await?;

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
