//! Message bus abstraction over multiple backends (NATS core, Kafka, and an in-memory
//! backend for tests), used to move `RawEvent`/`EnrichedEvent`/`Alert` payloads between
//! the three services (§5, §6).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              MessagingService                    │
//! │   publish(routing_key, msg)  subscribe(subject)  │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │      MessageProducer / MessageConsumer           │
//! └─────────────────────────────────────────────────┘
//!        │              │                  │
//!        ▼              ▼                  ▼
//! ┌───────────┐  ┌───────────┐     ┌───────────────┐
//! │   NATS    │  │   Kafka   │     │  in-memory     │
//! │ core pub/ │  │ consumer  │     │ broadcast      │
//! │ sub, no   │  │ groups,   │     │ channels       │
//! │ ack/nack  │  │ durable   │     │ (tests only)   │
//! └───────────┘  └───────────┘     └───────────────┘
//! ```
//!
//! Routing keys follow `events.raw.{agent_id}.{event_type}`,
//! `events.enriched.{agent_id}.{event_type}`, and `alerts.{severity}`; NATS subjects
//! support the same `*` single-token wildcard used to subscribe across every agent or
//! event type.

mod config;
mod error;
mod events;
mod kafka;
mod memory;
mod metrics;
mod nats;
mod service;
mod traits;

pub use config::{KafkaConfig, NatsConfig};
pub use error::{MessagingError, MessagingResult};
pub use events::{
    alert_key, alert_wildcard, enriched_event_key, enriched_event_wildcard, raw_event_key,
    raw_event_wildcard, MessageEnvelope, MessageMetadata,
};
pub use metrics::{init_messaging_metrics, MESSAGING_METRICS};
pub use service::MessagingService;
pub use traits::{MessageConsumer, MessageProducer, MessageStream};
