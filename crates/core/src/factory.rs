//! Source registry and engine wiring.
//!
//! Turns an [`EngineConfig`] into concrete [`RateSource`] implementations,
//! a cached price oracle, and the aggregator/quote engine pair built on them.

use crate::aggregator::RateAggregator;
use crate::cache::RateCache;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::EngineError;
use crate::quote::PositionQuoteEngine;
use anyhow::{Context, Result};
use lendwatch_api::{JupiterPriceOracle, KaminoSource, MarginfiSource, SolendSource};
use lendwatch_protocol::{CachedPriceOracle, PriceOracle, RateSource};
use std::sync::Arc;
use tracing::{info, warn};

/// Protocol ids with a registered adapter.
pub const KNOWN_PROTOCOLS: &[&str] = &[
    KaminoSource::PROTOCOL_ID,
    MarginfiSource::PROTOCOL_ID,
    SolendSource::PROTOCOL_ID,
];

/// Creates rate sources sharing one HTTP client.
#[derive(Debug, Clone, Default)]
pub struct SourceFactory {
    client: reqwest::Client,
}

impl SourceFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create the adapter for `protocol`.
    pub fn create(
        &self,
        protocol: &str,
        config: &SourceConfig,
    ) -> Result<Arc<dyn RateSource>, EngineError> {
        let source: Arc<dyn RateSource> = match protocol {
            KaminoSource::PROTOCOL_ID => {
                let mut source =
                    KaminoSource::with_base_url(&config.base_url).with_client(self.client.clone());
                if let Some(market) = &config.market {
                    source = source.with_market(market);
                }
                Arc::new(source)
            }
            MarginfiSource::PROTOCOL_ID => Arc::new(
                MarginfiSource::with_base_url(&config.base_url).with_client(self.client.clone()),
            ),
            SolendSource::PROTOCOL_ID => Arc::new(
                SolendSource::with_base_url(&config.base_url).with_client(self.client.clone()),
            ),
            other => return Err(EngineError::UnknownProtocol(other.to_string())),
        };
        Ok(source)
    }

    /// Create every enabled source in `protocol_order`.
    ///
    /// Disabled sources and sources whose URL still has an unresolved
    /// `${VAR}` are skipped with a warning; unknown ids are an error.
    pub fn build_sources(&self, config: &EngineConfig) -> Result<Vec<Arc<dyn RateSource>>> {
        let mut sources = Vec::with_capacity(config.aggregator.protocol_order.len());

        for protocol in &config.aggregator.protocol_order {
            let source_config = config
                .sources
                .get(protocol)
                .ok_or_else(|| EngineError::UnknownProtocol(protocol.clone()))?;

            if !source_config.enabled {
                info!(protocol = %protocol, "Source disabled");
                continue;
            }
            if source_config.has_unresolved_url() {
                warn!(
                    protocol = %protocol,
                    base_url = %source_config.base_url,
                    "Source URL has unresolved variables, skipping"
                );
                continue;
            }

            sources.push(self.create(protocol, source_config)?);
        }

        info!(
            sources = ?sources.iter().map(|s| s.protocol_id()).collect::<Vec<_>>(),
            "Rate sources initialized"
        );
        Ok(sources)
    }

    /// Jupiter oracle behind a TTL price cache.
    pub fn build_oracle(&self, config: &EngineConfig) -> Arc<CachedPriceOracle> {
        let jupiter = config.oracle.mints.iter().fold(
            JupiterPriceOracle::with_base_url(&config.oracle.base_url).with_client(self.client.clone()),
            |oracle, (symbol, mint)| oracle.with_mint(symbol, mint.as_str()),
        );
        Arc::new(CachedPriceOracle::new(Arc::new(jupiter)).with_cache_ttl(config.oracle.price_ttl()))
    }
}

/// Everything a caller needs, wired from one config.
#[derive(Debug, Clone)]
pub struct Engine {
    pub aggregator: RateAggregator,
    pub quotes: PositionQuoteEngine,
    pub oracle: Arc<CachedPriceOracle>,
}

impl Engine {
    /// Build sources, oracle, cache, aggregator and quote engine.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::from_config_with_cache(config, RateCache::in_memory())
    }

    /// Same as [`Engine::from_config`] with a caller-provided cache.
    pub fn from_config_with_cache(config: &EngineConfig, cache: RateCache) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.aggregator.source_timeout())
            .build()
            .context("failed to build HTTP client")?;
        let factory = SourceFactory::new(client);

        let sources = factory.build_sources(config)?;
        Ok(Self::with_parts(
            sources,
            factory.build_oracle(config),
            cache,
            config,
        ))
    }

    /// Wire an engine from prebuilt parts.
    pub fn with_parts(
        sources: Vec<Arc<dyn RateSource>>,
        oracle: Arc<CachedPriceOracle>,
        cache: RateCache,
        config: &EngineConfig,
    ) -> Self {
        let aggregator = RateAggregator::new(sources, cache, &config.aggregator);
        let quotes = PositionQuoteEngine::new(
            aggregator.clone(),
            Arc::clone(&oracle) as Arc<dyn PriceOracle>,
            config.quotes.fee_rate,
        );

        Self {
            aggregator,
            quotes,
            oracle,
        }
    }
}
