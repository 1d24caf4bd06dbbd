//! Threat-intel enrichment (§4.1): four per-event-type enrichers over VT/OTX/GeoIP/YARA
//! lookups, additive threat scoring, and the consumer loop that republishes enriched
//! events.

mod enrichers;
mod lookups;
mod pipeline;
pub mod service;

pub use enrichers::{Enricher, FileEnricher, NetworkEnricher, ProcessEnricher, SystemEnricher};
pub use lookups::{GeoIpClient, OtxClient, VtClient, YaraScanner};
pub use pipeline::EnrichmentPipeline;
pub use service::EnrichmentService;
