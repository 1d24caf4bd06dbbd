use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, layered: embedded defaults -> optional file -> env vars (§10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub messaging: MessagingConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub genai: GenaiConfig,
    pub execution: ExecutionConfig,
    pub data: DataConfig,
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration: embedded default.toml, then an optional override file
    /// (`EDR_CONFIG_FILE` or `./config/local.toml`), then `EDR_` env vars.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("EDR_CONFIG_FILE").unwrap_or_else(|_| "config/local.toml".to_string());

        let mut cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("EDR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.resolve_paths();
        Ok(cfg)
    }

    /// Any data-subdirectory left unset resolves relative to `data.base_dir`, evaluated
    /// once at load time rather than scattered through call sites.
    fn resolve_paths(&mut self) {
        let base = self.data.base_dir.clone();

        if self.data.playbooks_static.as_os_str().is_empty() {
            self.data.playbooks_static = base.join("playbooks/static");
        }
        if self.data.playbooks_generated.as_os_str().is_empty() {
            self.data.playbooks_generated = base.join("playbooks/generated");
        }
        if self.data.executions.as_os_str().is_empty() {
            self.data.executions = base.join("executions");
        }
        if self.execution.quarantine_dir.as_os_str().is_empty() {
            self.execution.quarantine_dir = base.join("quarantine");
        }
        if self.enrichment.models_dir.as_os_str().is_empty() {
            self.enrichment.models_dir = base.join("models");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            health_port: default_health_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MessagingBackend {
    #[default]
    Nats,
    Kafka,
    InMemory,
}

/// `messaging` section (§6): url, exchange, routing_key, enabled, file_input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default)]
    pub backend: MessagingBackend,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_nats_url")]
    pub url: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_routing_key_prefix")]
    pub routing_key_prefix: String,
    #[serde(default)]
    pub kafka_brokers: Vec<String>,
    #[serde(default = "default_enrichment_prefetch")]
    pub enrichment_prefetch: usize,
    #[serde(default = "default_analytics_prefetch")]
    pub analytics_prefetch: usize,
    #[serde(default = "default_playbook_prefetch")]
    pub playbook_prefetch: usize,
    /// Optional newline-delimited-JSON file to replay RawEvents from instead of the bus
    /// (supplements the source's file-tailing ingestion mode).
    pub file_input: Option<PathBuf>,
}

/// `redis` section (§6): url, lock_ttl, cooldown_ttl, cooldown_enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_cooldown_ttl")]
    pub cooldown_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub cooldown_enabled: bool,
    /// Fall back to the embedded Sled KV backend when Redis is not configured (dev/test).
    #[serde(default)]
    pub use_embedded: bool,
    pub embedded_path: Option<PathBuf>,
}

/// `genai` section (§6): inert unless a generator plugin is registered (§4.9, §9).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenaiConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Enforce,
    DryRun,
}

/// `execution` section (§6): mode, allow_isolate_host, quarantine_dir, persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub allow_isolate_host: bool,
    #[serde(default)]
    pub quarantine_dir: PathBuf,
    #[serde(default = "default_true")]
    pub persist: bool,
    #[serde(default = "default_decision_interval")]
    pub decision_interval_secs: u64,
}

/// `data` section (§6): base_dir and the derived subdirectories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub playbooks_static: PathBuf,
    #[serde(default)]
    pub playbooks_generated: PathBuf,
    #[serde(default)]
    pub executions: PathBuf,
}

/// `enrichment` section (§6): geoip_db, yara rules path, plus the VT/OTX keys from §6's
/// environment-variable list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub geoip_db: Option<PathBuf>,
    pub yara_rules: Option<PathBuf>,
    #[serde(default)]
    pub models_dir: PathBuf,
    pub vt_api_key_env: Option<String>,
    pub otx_api_key_env: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_health_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}
fn default_exchange() -> String {
    "edr".to_string()
}
fn default_routing_key_prefix() -> String {
    "events".to_string()
}
fn default_enrichment_prefetch() -> usize {
    1
}
fn default_analytics_prefetch() -> usize {
    10
}
fn default_playbook_prefetch() -> usize {
    10
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_lock_ttl() -> u64 {
    60
}
fn default_cooldown_ttl() -> u64 {
    300
}
fn default_decision_interval() -> u64 {
    60
}
fn default_base_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_http_timeout() -> u64 {
    10
}
fn default_cache_ttl() -> u64 {
    24 * 3600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert_eq!(default_cooldown_ttl(), 300);
        assert_eq!(default_lock_ttl(), 60);
        assert_eq!(default_cache_ttl(), 86400);
    }

    #[test]
    fn path_resolution_fills_in_unset_dirs() {
        let mut cfg = Config {
            server: ServerConfig::default(),
            messaging: MessagingConfig {
                backend: MessagingBackend::InMemory,
                enabled: true,
                url: default_nats_url(),
                exchange: default_exchange(),
                routing_key_prefix: default_routing_key_prefix(),
                kafka_brokers: vec![],
                enrichment_prefetch: 1,
                analytics_prefetch: 10,
                playbook_prefetch: 10,
                file_input: None,
            },
            redis: RedisConfig {
                url: default_redis_url(),
                lock_ttl_secs: 60,
                cooldown_ttl_secs: 300,
                cooldown_enabled: true,
                use_embedded: true,
                embedded_path: None,
            },
            genai: GenaiConfig::default(),
            execution: ExecutionConfig {
                mode: ExecutionMode::Enforce,
                allow_isolate_host: false,
                quarantine_dir: PathBuf::new(),
                persist: true,
                decision_interval_secs: 60,
            },
            data: DataConfig {
                base_dir: PathBuf::from("/tmp/edr-test"),
                playbooks_static: PathBuf::new(),
                playbooks_generated: PathBuf::new(),
                executions: PathBuf::new(),
            },
            enrichment: EnrichmentConfig {
                geoip_db: None,
                yara_rules: None,
                models_dir: PathBuf::new(),
                vt_api_key_env: None,
                otx_api_key_env: None,
                http_timeout_secs: 10,
                cache_ttl_secs: 86400,
            },
            observability: ObservabilityConfig::default(),
        };

        cfg.resolve_paths();
        assert_eq!(cfg.data.playbooks_static, PathBuf::from("/tmp/edr-test/playbooks/static"));
        assert_eq!(cfg.execution.quarantine_dir, PathBuf::from("/tmp/edr-test/quarantine"));
    }
}
