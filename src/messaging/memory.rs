//! In-memory bus backend (§13): a process-wide topic registry over `tokio::sync::broadcast`
//! channels, standing in for NATS subjects in tests so E1-E6 scenarios run without a
//! broker.

use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::traits::{MessageConsumer, MessageProducer, MessageStream};
use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

static TOPICS: Lazy<DashMap<String, broadcast::Sender<Vec<u8>>>> = Lazy::new(DashMap::new);

fn sender_for(topic: &str) -> broadcast::Sender<Vec<u8>> {
    TOPICS
        .entry(topic.to_string())
        .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
        .clone()
}

#[derive(Default)]
pub struct InMemoryProducer;

impl InMemoryProducer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    async fn publish<T: Serialize + Send + Sync>(&self, topic: &str, message: &T) -> MessagingResult<()> {
        let payload = serde_json::to_vec(message)?;
        // Sending with no subscribers is not an error, mirroring NATS core fire-and-forget.
        let _ = sender_for(topic).send(payload);
        Ok(())
    }

    async fn publish_batch<T: Serialize + Send + Sync>(
        &self,
        topic: &str,
        messages: &[T],
    ) -> MessagingResult<usize> {
        for message in messages {
            self.publish(topic, message).await?;
        }
        Ok(messages.len())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) -> MessagingResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConsumer;

impl InMemoryConsumer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn subscribe<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        topic: &str,
    ) -> MessagingResult<Box<dyn MessageStream<T>>> {
        Ok(Box::new(InMemoryMessageStream::<T> {
            rx: sender_for(topic).subscribe(),
            _phantom: std::marker::PhantomData,
        }))
    }

    async fn consume_one<T: DeserializeOwned>(&self, topic: &str, timeout_ms: u64) -> MessagingResult<Option<T>> {
        let mut rx = sender_for(topic).subscribe();
        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx.recv()).await {
            Ok(Ok(payload)) => Ok(Some(serde_json::from_slice(&payload)?)),
            Ok(Err(_)) => Ok(None),
            Err(_) => Err(MessagingError::Timeout("in-memory consume timeout".to_string())),
        }
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) -> MessagingResult<()> {
        Ok(())
    }
}

pub struct InMemoryMessageStream<T> {
    rx: broadcast::Receiver<Vec<u8>>,
    _phantom: std::marker::PhantomData<T>,
}

#[async_trait]
impl<T: DeserializeOwned + Send + Sync> MessageStream<T> for InMemoryMessageStream<T> {
    async fn next(&mut self) -> MessagingResult<Option<T>> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Ok(Some(serde_json::from_slice(&payload)?)),
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }

    async fn ack(&mut self) -> MessagingResult<()> {
        Ok(())
    }

    async fn nack(&mut self) -> MessagingResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_subscribe_roundtrips() {
        let topic = format!("test.{}", uuid::Uuid::new_v4());
        let consumer = InMemoryConsumer::new();
        let mut stream = consumer.subscribe::<String>(&topic).await.unwrap();

        let producer = InMemoryProducer::new();
        producer.publish(&topic, &"hello".to_string()).await.unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn consume_one_times_out_with_no_publisher() {
        let topic = format!("test.{}", uuid::Uuid::new_v4());
        let consumer = InMemoryConsumer::new();
        let result = consumer.consume_one::<String>(&topic, 20).await;
        assert!(matches!(result, Err(MessagingError::Timeout(_))));
    }
}
