//! Engine configuration.
//!
//! This module provides:
//! - Runtime configuration with profiles (cache TTLs, timeouts, fees)
//! - Per-protocol source endpoints with `${VAR}` expansion

mod engine;
mod sources;

pub use engine::{AggregatorConfig, EngineConfig, OracleConfig, QuoteConfig};
pub use sources::{SourceConfig, SourcesConfig};
