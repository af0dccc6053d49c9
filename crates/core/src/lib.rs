//! Rate aggregation and position quoting.
//!
//! This crate provides the engine on top of the protocol adapters:
//! - TTL cache with pluggable backends
//! - Concurrent rate aggregation with per-source timeouts and best-rate indices
//! - Leveraged position quotes with liquidation and health figures
//! - Profile-based configuration and source registry
//!
//! Construct an [`Engine`] from an [`EngineConfig`] at startup and pass
//! its handles around; nothing here is global.

mod aggregated;
mod aggregator;
pub mod cache;
pub mod config;
mod error;
mod factory;
mod quote;

#[cfg(test)]
mod testing;

pub use aggregated::{AggregatedRates, BestRate, ComparisonRow, TokenComparison};
pub use aggregator::RateAggregator;
pub use cache::{CacheError, CacheStore, MemoryCache, RateCache};
pub use config::{AggregatorConfig, EngineConfig, OracleConfig, QuoteConfig, SourceConfig, SourcesConfig};
pub use error::EngineError;
pub use factory::{Engine, SourceFactory, KNOWN_PROTOCOLS};
pub use quote::{
    build_quote, health_factor, liquidation_price, recommend, LegPrices, PositionQuote,
    PositionQuoteEngine, PositionQuoteParams, QuoteLeg, LOWEST_BORROW_RATE,
};
