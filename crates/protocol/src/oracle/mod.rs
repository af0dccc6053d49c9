//! Price oracle abstraction.
//!
//! The quote engine needs USD prices for the collateral and borrow legs.
//! This module provides:
//!
//! - [`PriceOracle`]: core trait for price lookups by token symbol
//! - [`CachedPriceOracle`]: TTL cache in front of any oracle
//! - [`StaticPriceOracle`]: fixed prices (tests, pinned deployments)
//!
//! A missing price is always an error. Callers must never substitute a
//! unit price.

mod fixed;
mod provider;

pub use fixed::StaticPriceOracle;
pub use provider::{CachedPriceOracle, PriceCache};

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Price lookup failure.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("price unavailable for {token}")]
    PriceUnavailable { token: String },

    #[error("invalid price for {token}: {price}")]
    InvalidPrice { token: String, price: f64 },

    #[error("malformed price response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Core trait for USD price lookups.
#[async_trait]
pub trait PriceOracle: Send + Sync + Debug {
    /// Oracle name for logging.
    fn name(&self) -> &str;

    /// Current USD price of `token`.
    async fn get_price(&self, token: &str) -> Result<f64, OracleError>;

    /// Current USD price of `token`, given its mint address.
    ///
    /// Oracles keyed by address override this; the default looks up the
    /// symbol.
    async fn get_mint_price(&self, token: &str, mint: &str) -> Result<f64, OracleError> {
        let _ = mint;
        self.get_price(token).await
    }
}

/// Basic sanity check: positive and finite.
pub fn validate_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Normalize a symbol for use as a price key.
pub(crate) fn price_key(token: &str) -> String {
    token.trim().to_ascii_uppercase()
}
