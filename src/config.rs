//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::Error;

// Re-export scoring config
pub use crate::scoring::{ScoringConfig, ScoringWeights, TierThresholds};

/// Hard ceiling on the hop limit; deeper walks only add provider load
pub const MAX_HOPS_LIMIT: u32 = 16;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub entities: EntityConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Chain-intelligence provider (Arkham) settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key; falls back to the `ARKHAM_API_KEY` environment variable
    #[serde(default)]
    pub api_key: String,
    /// Chain name passed to the transfers API
    #[serde(default = "default_chain")]
    pub chain: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Transfers fetched per query
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            chain: default_chain(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            page_limit: default_page_limit(),
        }
    }
}

/// Funding trace and signal thresholds
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScanConfig {
    /// Upstream hops walked from the deployer
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    /// Unique-recipient count above which dispersion is considered
    #[serde(default = "default_fan_out_threshold")]
    pub fan_out_threshold: u32,
    /// Max average transfers per recipient for the wash/Sybil pattern
    #[serde(default = "default_low_activity_threshold")]
    pub low_activity_threshold: f64,
    /// Wallets younger than this are fresh
    #[serde(default = "default_freshness_threshold_days")]
    pub freshness_threshold_days: i64,
    /// Wallets older than this are never flagged as distributors
    #[serde(default)]
    pub distributor_exempt_age_days: Option<i64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            fan_out_threshold: default_fan_out_threshold(),
            low_activity_threshold: default_low_activity_threshold(),
            freshness_threshold_days: default_freshness_threshold_days(),
            distributor_exempt_age_days: None,
        }
    }
}

impl ScanConfig {
    /// Reject out-of-range thresholds
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_hops > MAX_HOPS_LIMIT {
            return Err(Error::Config(format!(
                "max_hops must be at most {}, got {}",
                MAX_HOPS_LIMIT, self.max_hops
            )));
        }
        if self.fan_out_threshold == 0 {
            return Err(Error::Config("fan_out_threshold must be positive".to_string()));
        }
        if !self.low_activity_threshold.is_finite() || self.low_activity_threshold <= 0.0 {
            return Err(Error::Config(format!(
                "low_activity_threshold must be a positive number, got {}",
                self.low_activity_threshold
            )));
        }
        if self.freshness_threshold_days < 0 {
            return Err(Error::Config(format!(
                "freshness_threshold_days cannot be negative, got {}",
                self.freshness_threshold_days
            )));
        }
        if let Some(days) = self.distributor_exempt_age_days {
            if days < 0 {
                return Err(Error::Config(format!(
                    "distributor_exempt_age_days cannot be negative, got {}",
                    days
                )));
            }
        }
        Ok(())
    }
}

/// Entity name keyword lists
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    /// Labels containing one of these are recognized exchanges
    #[serde(default = "default_exchange_keywords")]
    pub trusted_exchange_keywords: Vec<String>,
    /// Labels containing one of these are flagged (never trusted)
    #[serde(default = "default_flagged_keywords")]
    pub flagged_keywords: Vec<String>,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            trusted_exchange_keywords: default_exchange_keywords(),
            flagged_keywords: default_flagged_keywords(),
        }
    }
}

impl EntityConfig {
    /// Check if an entity label names a recognized exchange
    pub fn is_trusted_exchange(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.trusted_exchange_keywords
            .iter()
            .any(|k| label.contains(&k.to_lowercase()))
    }

    /// First flagged keyword contained in the label, if any
    pub fn flagged_keyword(&self, label: &str) -> Option<&str> {
        let label = label.to_lowercase();
        self.flagged_keywords
            .iter()
            .find(|k| label.contains(&k.to_lowercase()))
            .map(String::as_str)
    }
}

/// Multi-target scan settings
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Scans running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Pause before each scan to respect provider rate limits
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            delay_ms: default_delay_ms(),
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    std::env::var("ARKHAM_BASE_URL").unwrap_or_else(|_| "https://api.arkm.com".into())
}

fn default_chain() -> String {
    "solana".to_string()
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_page_limit() -> u32 {
    100
}

fn default_max_hops() -> u32 {
    3
}

fn default_fan_out_threshold() -> u32 {
    50
}

fn default_low_activity_threshold() -> f64 {
    2.0
}

fn default_freshness_threshold_days() -> i64 {
    30
}

fn default_exchange_keywords() -> Vec<String> {
    [
        "binance", "coinbase", "kraken", "okx", "bybit", "kucoin", "gate.io", "htx", "bitget",
        "upbit", "crypto.com", "circle", "tether",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_flagged_keywords() -> Vec<String> {
    ["scam", "phish", "rug", "exploit", "hack", "heist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_concurrency() -> usize {
    1
}

fn default_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("provider.base_url", default_base_url())?
            .set_default("provider.timeout_ms", default_timeout_ms() as i64)?
            .set_default("provider.max_retries", default_max_retries() as i64)?
            .set_default("scan.max_hops", default_max_hops() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix RUGSCAN_)
            .add_source(
                config::Environment::with_prefix("RUGSCAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if config.provider.api_key.is_empty() {
            if let Ok(key) = std::env::var("ARKHAM_API_KEY") {
                config.provider.api_key = key;
            }
        }

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::Result<()> {
        self.scan.validate()?;
        self.scoring.validate()?;

        if self.provider.timeout_ms == 0 {
            return Err(Error::Config("provider.timeout_ms must be positive".to_string()));
        }

        if self.provider.page_limit == 0 {
            return Err(Error::Config("provider.page_limit must be positive".to_string()));
        }

        if self.batch.concurrency == 0 {
            return Err(Error::Config("batch.concurrency must be at least 1".to_string()));
        }

        if self.provider.max_retries > 5 {
            tracing::warn!(
                "provider.max_retries={} - long retry chains slow every hop of the trace",
                self.provider.max_retries
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Provider:
    base_url: {}
    chain: {}
    api_key: {}
    timeout: {}ms
    max_retries: {}
    page_limit: {}
  Scan:
    max_hops: {}
    fan_out_threshold: {}
    low_activity_threshold: {}
    freshness_threshold_days: {}
    distributor_exempt_age_days: {}
  Scoring:
    weights: {:?}
    tiers: high>={} medium>={}
  Batch:
    concurrency: {}
    delay: {}ms
"#,
            mask_url(&self.provider.base_url),
            self.provider.chain,
            if self.provider.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.provider.timeout_ms,
            self.provider.max_retries,
            self.provider.page_limit,
            self.scan.max_hops,
            self.scan.fan_out_threshold,
            self.scan.low_activity_threshold,
            self.scan.freshness_threshold_days,
            self.scan
                .distributor_exempt_age_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(disabled)".to_string()),
            self.scoring.weights,
            self.scoring.tiers.high,
            self.scoring.tiers.medium,
            self.batch.concurrency,
            self.batch.delay_ms,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
