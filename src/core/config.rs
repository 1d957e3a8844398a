use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::core::domain::WalletNetwork;
use crate::core::errors::RecoveryError;

pub const CONFIG_PATH_ENV: &str = "RECOVERY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "recovery.toml";
pub const LIVENET_URL_ENV: &str = "INSIGHT_LIVENET_URL";
pub const TESTNET_URL_ENV: &str = "INSIGHT_TESTNET_URL";

/// Indexer endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexerConfig {
    #[serde(default = "IndexerConfig::default_livenet_url")]
    pub livenet_url: String,

    #[serde(default = "IndexerConfig::default_testnet_url")]
    pub testnet_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "IndexerConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl IndexerConfig {
    fn default_livenet_url() -> String { "https://insight.bitpay.com/api".to_string() }
    fn default_testnet_url() -> String { "https://test-insight.bitpay.com/api".to_string() }
    fn default_request_timeout_secs() -> u64 { 30 }

    pub fn url_for(&self, network: WalletNetwork) -> &str {
        match network {
            WalletNetwork::Livenet => &self.livenet_url,
            WalletNetwork::Testnet => &self.testnet_url,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            livenet_url: Self::default_livenet_url(),
            testnet_url: Self::default_testnet_url(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

/// Address scan tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Consecutive unused addresses tolerated before a branch is abandoned
    #[serde(default = "ScanConfig::default_gap_limit")]
    pub gap_limit: u32,

    /// Derivation combinations scanned at once
    #[serde(default = "ScanConfig::default_concurrency")]
    pub concurrency: usize,
}

impl ScanConfig {
    fn default_gap_limit() -> u32 { 20 }
    fn default_concurrency() -> usize { 1 }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            gap_limit: Self::default_gap_limit(),
            concurrency: Self::default_concurrency(),
        }
    }
}

/// Sweep transaction settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepConfig {
    /// Flat fee in BTC
    #[serde(default = "SweepConfig::default_fee_btc")]
    pub default_fee_btc: f64,
}

impl SweepConfig {
    fn default_fee_btc() -> f64 { 0.0001 }

    /// The configured fee in exact satoshis.
    pub fn default_fee(&self) -> Result<Amount, RecoveryError> {
        Amount::from_btc(self.default_fee_btc).map_err(|e| {
            RecoveryError::Config(format!("sweep.default_fee_btc {}: {}", self.default_fee_btc, e))
        })
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { default_fee_btc: Self::default_fee_btc() }
    }
}

/// Recovery tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl RecoveryConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, RecoveryError> {
        toml::from_str(content).map_err(|e| RecoveryError::Config(e.to_string()))
    }

    /// Reads and validates a TOML file, then applies environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RecoveryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecoveryError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `$RECOVERY_CONFIG`, else `recovery.toml`. A missing file falls back to defaults.
    pub fn load() -> Result<Self, RecoveryError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if !Path::new(&path).exists() {
            warn!("Config file {} not found. Using default configuration", path);
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }
        info!("Loading configuration from {}", path);
        Self::from_file(&path)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(LIVENET_URL_ENV) {
            if !url.trim().is_empty() {
                self.indexer.livenet_url = url.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var(TESTNET_URL_ENV) {
            if !url.trim().is_empty() {
                self.indexer.testnet_url = url.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<(), RecoveryError> {
        validate_url("indexer.livenet_url", &self.indexer.livenet_url)?;
        validate_url("indexer.testnet_url", &self.indexer.testnet_url)?;
        if self.indexer.request_timeout_secs == 0 {
            return Err(RecoveryError::Config("indexer.request_timeout_secs must be > 0".into()));
        }
        if self.scan.concurrency == 0 {
            return Err(RecoveryError::Config("scan.concurrency must be > 0".into()));
        }
        if !self.sweep.default_fee_btc.is_finite() || self.sweep.default_fee_btc < 0.0 {
            return Err(RecoveryError::Config("sweep.default_fee_btc must be a non-negative amount".into()));
        }
        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), RecoveryError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(RecoveryError::Config(format!("{} must be an http(s) URL, got '{}'", field, url)))
    }
}
