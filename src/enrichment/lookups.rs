//! VT/OTX/GeoIP clients and the shared cache-then-retry-with-backoff contract (§4.1).

use crate::error::{AppError, Result};
use crate::kv::AppCache;
use crate::models::{GeoIp, OtxReputation, VtReputation};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MIN_DELAY: Duration = Duration::from_secs(4);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Retries `f` up to 3 attempts total with exponential backoff (base 1s, clamped to
/// [4s, 10s]) before giving up.
async fn retry_with_backoff<F, Fut, T>(mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
            Err(_) => {
                let delay = BASE_DELAY.saturating_mul(1 << (attempt - 1)).clamp(MIN_DELAY, MAX_DELAY);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("reqwest client builds with a static config")
}

/// VirusTotal file-hash reputation lookup, cached 24h, a 404 treated as "unknown".
pub struct VtClient {
    http: reqwest::Client,
    api_key: Option<String>,
    cache: AppCache<String, VtReputation>,
}

impl VtClient {
    /// `api_key_env` names the environment variable holding the VT API key (§10); absent
    /// or unset, lookups resolve to "unknown" without making a network call.
    pub fn new(api_key_env: Option<&str>, timeout_secs: u64, cache_ttl_secs: u64) -> Self {
        Self {
            http: http_client(timeout_secs),
            api_key: api_key_env.and_then(|name| std::env::var(name).ok()),
            cache: AppCache::new(50_000, Duration::from_secs(cache_ttl_secs)),
        }
    }

    pub async fn lookup_hash(&self, hash: &str) -> Result<VtReputation> {
        if let Some(cached) = self.cache.get(&hash.to_string()).await {
            return Ok(cached);
        }
        let Some(api_key) = self.api_key.clone() else {
            return Ok(VtReputation::default());
        };

        let http = self.http.clone();
        let hash_owned = hash.to_string();
        let reputation = retry_with_backoff(move || {
            let http = http.clone();
            let api_key = api_key.clone();
            let hash = hash_owned.clone();
            async move {
                let url = format!("https://www.virustotal.com/api/v3/files/{hash}");
                let resp = http.get(&url).header("x-apikey", api_key).send().await?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(VtReputation::default());
                }
                if !resp.status().is_success() {
                    return Err(AppError::ExternalLookup(format!(
                        "VirusTotal returned {}",
                        resp.status()
                    )));
                }
                let body: serde_json::Value = resp.json().await?;
                let stats = &body["data"]["attributes"]["last_analysis_stats"];
                let positives = stats["malicious"].as_i64().unwrap_or(0);
                let total = stats
                    .as_object()
                    .map(|m| m.values().filter_map(|v| v.as_i64()).sum())
                    .unwrap_or(0);
                Ok(VtReputation { positives, total })
            }
        })
        .await?;

        self.cache.insert(hash.to_string(), reputation).await;
        Ok(reputation)
    }
}

/// AlienVault OTX pulse-count lookup for file hashes and IPv4 addresses.
pub struct OtxClient {
    http: reqwest::Client,
    api_key: Option<String>,
    cache: AppCache<String, OtxReputation>,
}

impl OtxClient {
    pub fn new(api_key_env: Option<&str>, timeout_secs: u64, cache_ttl_secs: u64) -> Self {
        Self {
            http: http_client(timeout_secs),
            api_key: api_key_env.and_then(|name| std::env::var(name).ok()),
            cache: AppCache::new(50_000, Duration::from_secs(cache_ttl_secs)),
        }
    }

    async fn lookup(&self, indicator_type: &str, indicator: &str) -> Result<OtxReputation> {
        let cache_key = format!("{indicator_type}:{indicator}");
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }
        let Some(api_key) = self.api_key.clone() else {
            return Ok(OtxReputation::default());
        };

        let http = self.http.clone();
        let indicator_owned = indicator.to_string();
        let indicator_type_owned = indicator_type.to_string();
        let reputation = retry_with_backoff(move || {
            let http = http.clone();
            let api_key = api_key.clone();
            let indicator = indicator_owned.clone();
            let indicator_type = indicator_type_owned.clone();
            async move {
                let url = format!(
                    "https://otx.alienvault.com/api/v1/indicators/{indicator_type}/{indicator}/general"
                );
                let resp = http.get(&url).header("X-OTX-API-KEY", api_key).send().await?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(OtxReputation::default());
                }
                if !resp.status().is_success() {
                    return Err(AppError::ExternalLookup(format!("OTX returned {}", resp.status())));
                }
                let body: serde_json::Value = resp.json().await?;
                let pulses = body["pulse_info"]["count"].as_i64().unwrap_or(0);
                Ok(OtxReputation { pulses })
            }
        })
        .await?;

        self.cache.insert(cache_key, reputation).await;
        Ok(reputation)
    }

    pub async fn lookup_hash(&self, hash: &str) -> Result<OtxReputation> {
        self.lookup("file", hash).await
    }

    pub async fn lookup_ip(&self, ip: &str) -> Result<OtxReputation> {
        self.lookup("IPv4", ip).await
    }
}

/// GeoIP city lookup, cached 24h. Loopback/unspecified addresses are filtered out by
/// the caller before this is ever invoked (§4.1).
pub struct GeoIpClient {
    http: reqwest::Client,
    cache: AppCache<String, GeoIp>,
}

impl GeoIpClient {
    pub fn new(timeout_secs: u64, cache_ttl_secs: u64) -> Self {
        Self {
            http: http_client(timeout_secs),
            cache: AppCache::new(50_000, Duration::from_secs(cache_ttl_secs)),
        }
    }

    pub async fn lookup(&self, ip: &str) -> Result<GeoIp> {
        if let Some(cached) = self.cache.get(&ip.to_string()).await {
            return Ok(cached);
        }

        let http = self.http.clone();
        let ip_owned = ip.to_string();
        let geo = retry_with_backoff(move || {
            let http = http.clone();
            let ip = ip_owned.clone();
            async move {
                let url = format!("https://ipapi.co/{ip}/json/");
                let resp = http.get(&url).send().await?;
                if !resp.status().is_success() {
                    return Err(AppError::ExternalLookup(format!("GeoIP lookup returned {}", resp.status())));
                }
                let body: serde_json::Value = resp.json().await?;
                Ok(GeoIp {
                    country: body["country_name"].as_str().map(str::to_string),
                    city: body["city"].as_str().map(str::to_string),
                    lat: body["latitude"].as_f64(),
                    lon: body["longitude"].as_f64(),
                    org: body["org"].as_str().map(str::to_string),
                })
            }
        })
        .await?;

        self.cache.insert(ip.to_string(), geo.clone()).await;
        Ok(geo)
    }
}

/// Lightweight substitute for a native YARA engine (not present in the dependency
/// stack): rule name/pattern pairs loaded from a flat `name: regex` file, matched with
/// `regex` against the enricher-supplied text.
pub struct YaraScanner {
    rules: Vec<(String, regex::Regex)>,
}

impl YaraScanner {
    pub fn empty() -> Self {
        Self { rules: vec![] }
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut rules = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((name, pattern)) = line.split_once(':') {
                let regex = regex::Regex::new(pattern.trim())
                    .map_err(|e| AppError::Configuration(format!("invalid yara rule pattern: {e}")))?;
                rules.push((name.trim().to_string(), regex));
            }
        }
        Ok(Self { rules })
    }

    pub fn scan(&self, text: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yara_scanner_matches_loaded_rules() {
        let scanner = YaraScanner {
            rules: vec![(
                "suspicious_powershell".to_string(),
                regex::Regex::new("(?i)invoke-expression").unwrap(),
            )],
        };
        let hits = scanner.scan("powershell.exe -enc Invoke-Expression $payload");
        assert_eq!(hits, vec!["suspicious_powershell".to_string()]);
    }

    #[test]
    fn empty_scanner_matches_nothing() {
        assert!(YaraScanner::empty().scan("anything at all").is_empty());
    }
}
