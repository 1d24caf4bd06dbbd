//! Unified bus client: a producer+consumer pair selected by `[messaging].backend`,
//! bound to one service's client/group identity (§5, §6).

use crate::config::{MessagingBackend, MessagingConfig};
use crate::messaging::config::{KafkaConfig, NatsConfig};
use crate::messaging::kafka::{KafkaConsumer, KafkaProducer};
use crate::messaging::memory::{InMemoryConsumer, InMemoryProducer};
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::nats::{NatsConsumer, NatsProducer};
use crate::messaging::traits::{MessageConsumer, MessageProducer, MessageStream};
use crate::messaging::MessagingResult;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Instant;

enum Producer {
    Nats(Arc<NatsProducer>),
    Kafka(Arc<KafkaProducer>),
    Memory(Arc<InMemoryProducer>),
}

enum Consumer {
    Nats(Arc<NatsConsumer>),
    Kafka(Arc<KafkaConsumer>),
    Memory(Arc<InMemoryConsumer>),
}

pub struct MessagingService {
    config: MessagingConfig,
    producer: Producer,
    consumer: Consumer,
}

impl MessagingService {
    /// `client_id` names this process for the broker; `group_id` is the consumer group
    /// replicas of the same service share so a message lands on exactly one of them.
    pub async fn connect(config: MessagingConfig, client_id: &str, group_id: &str) -> MessagingResult<Self> {
        let (producer, consumer) = match config.backend {
            MessagingBackend::Nats => {
                let nats_cfg = NatsConfig::from_app_config(&config, client_id);
                let producer = NatsProducer::new(nats_cfg.clone()).await?;
                let consumer = NatsConsumer::new(nats_cfg).await?;
                (Producer::Nats(Arc::new(producer)), Consumer::Nats(Arc::new(consumer)))
            }
            MessagingBackend::Kafka => {
                let kafka_cfg = KafkaConfig::from_app_config(&config, client_id, group_id);
                let producer = KafkaProducer::new(kafka_cfg.clone()).await?;
                let consumer = KafkaConsumer::new(kafka_cfg).await?;
                (Producer::Kafka(Arc::new(producer)), Consumer::Kafka(Arc::new(consumer)))
            }
            MessagingBackend::InMemory => (
                Producer::Memory(Arc::new(InMemoryProducer::new())),
                Consumer::Memory(Arc::new(InMemoryConsumer::new())),
            ),
        };

        if config.enabled {
            crate::messaging::metrics::init_messaging_metrics();
        }

        Ok(Self { config, producer, consumer })
    }

    fn backend_label(&self) -> &'static str {
        match self.config.backend {
            MessagingBackend::Nats => "nats",
            MessagingBackend::Kafka => "kafka",
            MessagingBackend::InMemory => "memory",
        }
    }

    /// Publish to a fully-qualified routing key built by `messaging::events`'s helpers.
    pub async fn publish<T: Serialize + Send + Sync>(&self, routing_key: &str, message: &T) -> MessagingResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let start = Instant::now();
        let result = match &self.producer {
            Producer::Nats(p) => p.publish(routing_key, message).await,
            Producer::Kafka(p) => p.publish(routing_key, message).await,
            Producer::Memory(p) => p.publish(routing_key, message).await,
        };

        let backend = self.backend_label();
        if result.is_ok() {
            MESSAGING_METRICS
                .messages_published
                .with_label_values(&[routing_key, backend])
                .inc();
            MESSAGING_METRICS
                .publish_latency
                .with_label_values(&[routing_key, backend])
                .observe(start.elapsed().as_secs_f64());
        } else {
            MESSAGING_METRICS
                .publish_failures
                .with_label_values(&[routing_key, backend, "publish"])
                .inc();
        }

        result
    }

    /// Subscribe to a subject, which may carry NATS-style `*` wildcards (§6).
    pub async fn subscribe<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        subject: &str,
    ) -> MessagingResult<Box<dyn MessageStream<T>>> {
        let stream = match &self.consumer {
            Consumer::Nats(c) => c.subscribe(subject).await?,
            Consumer::Kafka(c) => c.subscribe(subject).await?,
            Consumer::Memory(c) => c.subscribe(subject).await?,
        };
        MESSAGING_METRICS
            .active_connections
            .with_label_values(&[self.backend_label()])
            .inc();
        Ok(stream)
    }

    pub async fn is_connected(&self) -> bool {
        match &self.producer {
            Producer::Nats(p) => p.is_connected().await,
            Producer::Kafka(p) => p.is_connected().await,
            Producer::Memory(p) => p.is_connected().await,
        }
    }

    pub async fn close(&self) -> MessagingResult<()> {
        match &self.producer {
            Producer::Nats(p) => p.close().await?,
            Producer::Kafka(p) => p.close().await?,
            Producer::Memory(p) => p.close().await?,
        }
        match &self.consumer {
            Consumer::Nats(c) => c.close().await?,
            Consumer::Kafka(c) => c.close().await?,
            Consumer::Memory(c) => c.close().await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessagingBackend as Backend;

    fn in_memory_config() -> MessagingConfig {
        MessagingConfig {
            backend: Backend::InMemory,
            enabled: true,
            url: "nats://localhost:4222".to_string(),
            exchange: "edr".to_string(),
            routing_key_prefix: "events".to_string(),
            kafka_brokers: vec![],
            enrichment_prefetch: 1,
            analytics_prefetch: 10,
            playbook_prefetch: 10,
            file_input: None,
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_over_in_memory_backend() {
        let service = MessagingService::connect(in_memory_config(), "test", "test-group")
            .await
            .unwrap();
        let topic = format!("events.raw.{}.process", uuid::Uuid::new_v4());

        let mut stream = service.subscribe::<serde_json::Value>(&topic).await.unwrap();
        service
            .publish(&topic, &serde_json::json!({"hello": "world"}))
            .await
            .unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received["hello"], "world");
    }
}
