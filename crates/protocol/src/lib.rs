//! Lending protocol abstraction layer.
//!
//! This crate provides:
//! - The rate data model (token rates, per-protocol snapshots, networks)
//! - The [`RateSource`] trait implemented once per lending protocol
//! - The [`PriceOracle`] trait plus a TTL-cached oracle wrapper
//!
//! Concrete HTTP adapters live in `lendwatch-api`; orchestration lives in
//! `lendwatch-core`.

mod model;
pub mod oracle;
mod source;

pub use model::{max_leverage, Network, ProtocolRates, RateViolation, TokenRate, UnknownNetwork};
pub use oracle::{CachedPriceOracle, OracleError, PriceOracle, StaticPriceOracle};
pub use source::{RateSource, SourceError};
