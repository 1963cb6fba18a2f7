// ⚙️ Configuration - one TOML file, passed explicitly to every component
//
// Example:
//
//   database_path = "radar.db"
//   bind_addr = "0.0.0.0:3000"
//   cache_ttl_hours = 24
//
//   [authoritative]
//   base_url = "https://mirror.example.org/api"
//
//   [preliminary]
//   base_url = "https://board.example.org"
//   region = "SP"
//
//   [[api_tokens]]
//   token = "secret"
//   actor = "ops@example.org"

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound on the delay between two live scrapes of the preliminary board
pub const MIN_SCRAPE_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub bind_addr: String,
    /// Cache entries older than this are ignored
    pub cache_ttl_hours: i64,
    /// Upper bound on one adapter retrieval
    pub adapter_timeout_secs: u64,
    /// Peek fallback caches to cross-validate authoritative results
    pub cross_check_cached: bool,
    pub authoritative: AuthoritativeConfig,
    pub preliminary: Option<PreliminaryConfig>,
    pub api_tokens: Vec<ApiToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthoritativeConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreliminaryConfig {
    pub base_url: String,
    #[serde(default = "default_preliminary_region")]
    pub region: String,
    #[serde(default = "default_request_delay_secs")]
    pub request_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiToken {
    pub token: String,
    pub actor: String,
}

fn default_preliminary_region() -> String {
    "SP".to_string()
}

fn default_request_delay_secs() -> u64 {
    MIN_SCRAPE_DELAY_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("registry_radar.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            cache_ttl_hours: crate::cache::CacheStore::DEFAULT_TTL_HOURS,
            adapter_timeout_secs: 30,
            cross_check_cached: true,
            authoritative: AuthoritativeConfig {
                base_url: "http://localhost:8080".to_string(),
                api_key: None,
            },
            preliminary: None,
            api_tokens: Vec::new(),
        }
    }
}

impl PreliminaryConfig {
    /// Configured delay, never below the politeness floor
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs.max(MIN_SCRAPE_DELAY_SECS))
    }
}

impl Config {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_hours <= 0 {
            bail!("cache_ttl_hours must be positive (got {})", self.cache_ttl_hours);
        }
        if self.adapter_timeout_secs == 0 {
            bail!("adapter_timeout_secs must be positive");
        }
        if self.authoritative.base_url.trim().is_empty() {
            bail!("authoritative.base_url is required");
        }
        if let Some(preliminary) = &self.preliminary {
            if preliminary.base_url.trim().is_empty() {
                bail!("preliminary.base_url is required");
            }
            if crate::company::normalize_region(&preliminary.region).is_none() {
                bail!("preliminary.region is not a valid region code: {:?}", preliminary.region);
            }
            if self.adapter_timeout() < preliminary.request_delay() {
                bail!(
                    "adapter_timeout_secs ({}) must be at least the preliminary request delay ({:?})",
                    self.adapter_timeout_secs,
                    preliminary.request_delay()
                );
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }
}
