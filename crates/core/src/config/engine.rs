//! Configuration management with profile support.
//!
//! Provides the runtime settings for the aggregator, quote engine and price
//! oracle, with profiles for local testing and production.

use anyhow::{bail, Context};
use lendwatch_protocol::Network;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use super::sources::{expand_env, SourcesConfig};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Network the monitor watches
    #[serde(default)]
    pub network: Network,

    /// Monitor loop interval (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Fan-out, caching and ordering
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Position quote parameters
    #[serde(default)]
    pub quotes: QuoteConfig,

    /// Price oracle endpoint and cache
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Per-protocol endpoints
    #[serde(default)]
    pub sources: SourcesConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}
fn default_poll_interval() -> u64 {
    30
}

/// Aggregator timing and source ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// TTL of the cross-protocol aggregate (milliseconds)
    #[serde(default = "default_rates_ttl")]
    pub rates_ttl_ms: u64,

    /// TTL of single-protocol snapshots (milliseconds)
    #[serde(default = "default_protocol_rates_ttl")]
    pub protocol_rates_ttl_ms: u64,

    /// Upper bound on a single source call (milliseconds)
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,

    /// Source ids in query order; earlier entries win rate ties
    #[serde(default = "default_protocol_order")]
    pub protocol_order: Vec<String>,
}

fn default_rates_ttl() -> u64 {
    5_000
}
fn default_protocol_rates_ttl() -> u64 {
    10_000
}
fn default_source_timeout() -> u64 {
    3_000
}
fn default_protocol_order() -> Vec<String> {
    vec!["kamino".to_string(), "marginfi".to_string(), "solend".to_string()]
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            rates_ttl_ms: default_rates_ttl(),
            protocol_rates_ttl_ms: default_protocol_rates_ttl(),
            source_timeout_ms: default_source_timeout(),
            protocol_order: default_protocol_order(),
        }
    }
}

impl AggregatorConfig {
    pub fn rates_ttl(&self) -> Duration {
        Duration::from_millis(self.rates_ttl_ms)
    }
    pub fn protocol_rates_ttl(&self) -> Duration {
        Duration::from_millis(self.protocol_rates_ttl_ms)
    }
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

/// Position quote parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Fee charged on collateral value (fraction, 0.001 = 0.1%)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
}

fn default_fee_rate() -> f64 {
    0.001
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
        }
    }
}

/// Price oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Price API base URL
    #[serde(default = "default_oracle_url")]
    pub base_url: String,

    /// Price cache TTL (seconds)
    #[serde(default = "default_price_ttl")]
    pub price_ttl_secs: u64,

    /// Extra symbol to mint address entries for symbol-only lookups
    #[serde(default)]
    pub mints: BTreeMap<String, String>,
}

fn default_oracle_url() -> String {
    "https://api.jup.ag/price/v2".to_string()
}
fn default_price_ttl() -> u64 {
    30
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_url(),
            price_ttl_secs: default_price_ttl(),
            mints: BTreeMap::new(),
        }
    }
}

impl OracleConfig {
    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            network: Network::default(),
            poll_interval_secs: default_poll_interval(),
            aggregator: AggregatorConfig::default(),
            quotes: QuoteConfig::default(),
            oracle: OracleConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Create a testing profile against devnet with short TTLs.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            network: Network::Devnet,
            poll_interval_secs: 5,
            aggregator: AggregatorConfig {
                rates_ttl_ms: 1_000,
                protocol_rates_ttl_ms: 1_000,
                source_timeout_ms: 1_500,
                ..Default::default()
            },
            quotes: QuoteConfig { fee_rate: 0.0 },
            oracle: OracleConfig {
                price_ttl_secs: 5,
                ..Default::default()
            },
            sources: SourcesConfig::default(),
        }
    }

    /// Create a production profile with conservative settings.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            network: Network::Mainnet,
            poll_interval_secs: 60,
            aggregator: AggregatorConfig {
                rates_ttl_ms: 10_000,
                protocol_rates_ttl_ms: 30_000,
                source_timeout_ms: 5_000,
                ..Default::default()
            },
            quotes: QuoteConfig::default(),
            oracle: OracleConfig::default(),
            sources: SourcesConfig::default(),
        }
    }

    /// Resolve configuration from the environment.
    ///
    /// `LENDWATCH_CONFIG` points at a TOML file; otherwise `LENDWATCH_PROFILE`
    /// selects a built-in profile (testing, production, default).
    /// `LENDWATCH_NETWORK` overrides the network either way.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var("LENDWATCH_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => {
                let profile =
                    std::env::var("LENDWATCH_PROFILE").unwrap_or_else(|_| "default".to_string());
                Self::profile(&profile)
            }
        };

        if let Ok(network) = std::env::var("LENDWATCH_NETWORK") {
            config.network = network
                .parse()
                .with_context(|| "invalid LENDWATCH_NETWORK".to_string())?;
        }

        config.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Built-in profile by name. Unknown names fall back to the default.
    pub fn profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Expand environment variables in config values.
    pub fn expand_env_vars(&mut self) {
        self.oracle.base_url = expand_env(&self.oracle.base_url);
        self.sources.expand_env_vars();
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.aggregator.rates_ttl_ms == 0 || self.aggregator.protocol_rates_ttl_ms == 0 {
            bail!("cache TTLs must be greater than zero");
        }
        if self.aggregator.source_timeout_ms == 0 {
            bail!("source_timeout_ms must be greater than zero");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if !(0.0..1.0).contains(&self.quotes.fee_rate) {
            bail!("fee_rate must be in [0, 1), got {}", self.quotes.fee_rate);
        }
        if self.aggregator.protocol_order.is_empty() {
            bail!("protocol_order must list at least one protocol");
        }

        let mut seen = HashSet::new();
        for id in &self.aggregator.protocol_order {
            if !seen.insert(id.as_str()) {
                bail!("protocol '{}' listed twice in protocol_order", id);
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, network = %self.network, "Engine configuration loaded");
        tracing::info!(
            rates_ttl_ms = self.aggregator.rates_ttl_ms,
            protocol_rates_ttl_ms = self.aggregator.protocol_rates_ttl_ms,
            source_timeout_ms = self.aggregator.source_timeout_ms,
            order = ?self.aggregator.protocol_order,
            "Aggregator settings"
        );
        tracing::info!(
            fee_rate = self.quotes.fee_rate,
            poll_interval_secs = self.poll_interval_secs,
            "Quote settings"
        );
        tracing::info!(
            base_url = %self.oracle.base_url,
            price_ttl_secs = self.oracle.price_ttl_secs,
            "Price oracle"
        );
    }
}
