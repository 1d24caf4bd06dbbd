//! Consumer loop: `events.raw.#` in, `events.enriched.{agent}.{type}` out (§4.1).

use crate::config::Config;
use crate::enrichment::pipeline::EnrichmentPipeline;
use crate::error::{AppError, Result};
use crate::messaging::{enriched_event_key, raw_event_wildcard, MessagingService};
use crate::models::RawEvent;
use crate::storage::RecordTree;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters exposed on the `/health` surface (§12).
#[derive(Debug, Default)]
pub struct EnrichmentStats {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

impl crate::health::ServiceStats for EnrichmentStats {
    fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
    fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct EnrichmentService {
    bus: Arc<MessagingService>,
    pipeline: EnrichmentPipeline,
    enrichments: RecordTree,
    routing_key_prefix: String,
    pub stats: Arc<EnrichmentStats>,
}

impl EnrichmentService {
    pub async fn connect(config: &Config, enrichments: RecordTree) -> Result<Self> {
        let bus = MessagingService::connect(
            config.messaging.clone(),
            "enrichment-service",
            "enrichment-service-group",
        )
        .await
        .map_err(|e| AppError::Messaging(e.to_string()))?;

        let pipeline = EnrichmentPipeline::new(&config.enrichment)?;

        Ok(Self {
            bus: Arc::new(bus),
            pipeline,
            enrichments,
            routing_key_prefix: config.messaging.routing_key_prefix.clone(),
            stats: Arc::new(EnrichmentStats::default()),
        })
    }

    /// Consumes raw events until the process is killed. Each message is processed to
    /// completion before ack; any error nacks without requeue (§4.1 concurrency).
    pub async fn run(&self) -> Result<()> {
        let subject = raw_event_wildcard(&self.routing_key_prefix);
        let mut stream = self
            .bus
            .subscribe::<RawEvent>(&subject)
            .await
            .map_err(|e| AppError::Messaging(e.to_string()))?;

        loop {
            let message = stream.next().await.map_err(|e| AppError::Messaging(e.to_string()))?;
            let Some(event) = message else {
                continue;
            };

            match self.process_one(&event).await {
                Ok(()) => {
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                    stream.ack().await.map_err(|e| AppError::Messaging(e.to_string()))?;
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %err, agent_id = %event.agent_id, "enrichment failed, nacking without requeue");
                    stream.nack().await.map_err(|e| AppError::Messaging(e.to_string()))?;
                }
            }
        }
    }

    async fn process_one(&self, event: &RawEvent) -> Result<()> {
        event.validate().map_err(AppError::SchemaValidation)?;

        let enriched = self.pipeline.enrich(event).await?;

        self.enrichments.insert(event.event_id, &enriched)?;

        let routing_key = enriched_event_key(&self.routing_key_prefix, &enriched.raw.agent_id, &enriched.raw.event_type.to_string());
        self.bus
            .publish(&routing_key, &enriched)
            .await
            .map_err(|e| AppError::Messaging(e.to_string()))?;

        Ok(())
    }
}
