//! Fixed-price oracle.

use super::{price_key, validate_price, OracleError, PriceOracle};
use async_trait::async_trait;
use dashmap::DashMap;

/// Oracle serving prices that were set explicitly.
#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    prices: DashMap<String, f64>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style price registration.
    pub fn with_price(self, token: &str, price: f64) -> Self {
        self.set_price(token, price);
        self
    }

    pub fn set_price(&self, token: &str, price: f64) {
        self.prices.insert(price_key(token), price);
    }

    pub fn remove_price(&self, token: &str) {
        self.prices.remove(&price_key(token));
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_price(&self, token: &str) -> Result<f64, OracleError> {
        let price = self
            .prices
            .get(&price_key(token))
            .map(|p| *p)
            .ok_or_else(|| OracleError::PriceUnavailable {
                token: token.to_string(),
            })?;

        if !validate_price(price) {
            return Err(OracleError::InvalidPrice {
                token: token.to_string(),
                price,
            });
        }
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_prices() {
        let oracle = StaticPriceOracle::new().with_price("SOL", 140.0).with_price("USDC", 1.0);

        assert_eq!(oracle.get_price("sol").await.unwrap(), 140.0);
        assert!(matches!(
            oracle.get_price("BONK").await,
            Err(OracleError::PriceUnavailable { .. })
        ));

        oracle.set_price("USDC", 0.0);
        assert!(matches!(
            oracle.get_price("USDC").await,
            Err(OracleError::InvalidPrice { .. })
        ));

        oracle.remove_price("SOL");
        assert!(oracle.get_price("SOL").await.is_err());
    }
}
