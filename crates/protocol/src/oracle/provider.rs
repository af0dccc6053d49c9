//! TTL-cached price oracle.

use super::{price_key, OracleError, PriceOracle};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Price cache entry.
#[derive(Debug, Clone, Copy)]
pub struct PriceCache {
    /// Cached USD price
    pub price: f64,
    /// When the entry was stored
    pub cached_at: Instant,
}

impl PriceCache {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            cached_at: Instant::now(),
        }
    }

    /// Check if the entry is older than `max_age`.
    pub fn is_cache_stale(&self, max_age: Duration) -> bool {
        self.cached_at.elapsed() >= max_age
    }
}

/// Wraps any [`PriceOracle`] with a per-symbol TTL cache.
pub struct CachedPriceOracle {
    /// Upstream oracle
    inner: Arc<dyn PriceOracle>,
    /// Price cache by normalized symbol
    price_cache: DashMap<String, PriceCache>,
    /// Cache TTL
    cache_ttl: Duration,
}

impl std::fmt::Debug for CachedPriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedPriceOracle")
            .field("inner", &self.inner.name())
            .field("cache_size", &self.price_cache.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl CachedPriceOracle {
    /// Create a cached oracle with a 30 second TTL.
    pub fn new(inner: Arc<dyn PriceOracle>) -> Self {
        Self {
            inner,
            price_cache: DashMap::new(),
            cache_ttl: Duration::from_secs(30),
        }
    }

    /// Set cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Get cached price for a token, if still fresh.
    pub fn get_cached_price(&self, token: &str) -> Option<f64> {
        let key = price_key(token);
        let entry = *self.price_cache.get(&key)?;

        if entry.is_cache_stale(self.cache_ttl) {
            self.price_cache.remove(&key);
            return None;
        }

        Some(entry.price)
    }

    /// Store a price in the cache.
    pub fn update_cache(&self, token: &str, price: f64) {
        self.price_cache.insert(price_key(token), PriceCache::new(price));
    }

    /// Get prices for several tokens. Missing prices are `None`.
    pub async fn get_prices(&self, tokens: &[&str]) -> Vec<(String, Option<f64>)> {
        let mut results = Vec::with_capacity(tokens.len());

        for token in tokens {
            let price = match self.get_price(token).await {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(token = %token, error = %e, "Price lookup failed");
                    None
                }
            };
            results.push((token.to_string(), price));
        }

        results
    }

    /// Drop all cached prices.
    pub fn clear_cache(&self) {
        self.price_cache.clear();
    }

    /// Number of cached prices (fresh or not).
    pub fn cache_size(&self) -> usize {
        self.price_cache.len()
    }
}

#[async_trait]
impl PriceOracle for CachedPriceOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_price(&self, token: &str) -> Result<f64, OracleError> {
        if let Some(price) = self.get_cached_price(token) {
            debug!(token = %token, price, "Price cache hit");
            return Ok(price);
        }

        let price = self.inner.get_price(token).await?;
        self.update_cache(token, price);

        debug!(token = %token, price, oracle = self.inner.name(), "Fetched fresh price");
        Ok(price)
    }

    async fn get_mint_price(&self, token: &str, mint: &str) -> Result<f64, OracleError> {
        if let Some(price) = self.get_cached_price(token) {
            debug!(token = %token, price, "Price cache hit");
            return Ok(price);
        }

        let price = self.inner.get_mint_price(token, mint).await?;
        self.update_cache(token, price);

        debug!(token = %token, mint = %mint, price, oracle = self.inner.name(), "Fetched fresh price");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StaticPriceOracle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingOracle {
        inner: StaticPriceOracle,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceOracle for CountingOracle {
        fn name(&self) -> &str {
            "counting"
        }

        async fn get_price(&self, token: &str) -> Result<f64, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_price(token).await
        }
    }

    fn counting() -> Arc<CountingOracle> {
        Arc::new(CountingOracle {
            inner: StaticPriceOracle::new().with_price("SOL", 140.0),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let upstream = counting();
        let oracle = CachedPriceOracle::new(upstream.clone());

        assert_eq!(oracle.get_price("SOL").await.unwrap(), 140.0);
        assert_eq!(oracle.get_price("sol").await.unwrap(), 140.0);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(oracle.cache_size(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let upstream = counting();
        let oracle =
            CachedPriceOracle::new(upstream.clone()).with_cache_ttl(Duration::from_millis(20));

        oracle.get_price("SOL").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(oracle.get_cached_price("SOL").is_none());

        oracle.get_price("SOL").await.unwrap();
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }

    #[derive(Debug, Default)]
    struct MintOnlyOracle;

    #[async_trait]
    impl PriceOracle for MintOnlyOracle {
        fn name(&self) -> &str {
            "mint-only"
        }

        async fn get_price(&self, token: &str) -> Result<f64, OracleError> {
            Err(OracleError::PriceUnavailable { token: token.to_string() })
        }

        async fn get_mint_price(&self, token: &str, mint: &str) -> Result<f64, OracleError> {
            match mint {
                "mint-jitosol" => Ok(155.0),
                _ => Err(OracleError::PriceUnavailable { token: token.to_string() }),
            }
        }
    }

    #[tokio::test]
    async fn test_mint_lookup_reaches_upstream_and_caches_by_symbol() {
        let oracle = CachedPriceOracle::new(Arc::new(MintOnlyOracle));

        assert!(oracle.get_price("JITOSOL").await.is_err());
        assert_eq!(oracle.get_mint_price("JitoSOL", "mint-jitosol").await.unwrap(), 155.0);
        assert_eq!(oracle.get_price("JITOSOL").await.unwrap(), 155.0);
        assert_eq!(oracle.cache_size(), 1);
    }

    #[tokio::test]
    async fn test_default_mint_lookup_uses_symbol() {
        let upstream = counting();
        assert_eq!(upstream.get_mint_price("SOL", "ignored").await.unwrap(), 140.0);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_price_not_cached() {
        let upstream = counting();
        let oracle = CachedPriceOracle::new(upstream.clone());

        let prices = oracle.get_prices(&["SOL", "BONK"]).await;
        assert_eq!(prices[0], ("SOL".to_string(), Some(140.0)));
        assert_eq!(prices[1], ("BONK".to_string(), None));
        assert_eq!(oracle.cache_size(), 1);

        oracle.clear_cache();
        assert_eq!(oracle.cache_size(), 0);
    }
}
