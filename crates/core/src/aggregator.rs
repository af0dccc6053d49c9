//! Concurrent rate aggregation across protocols.
//!
//! Each cycle queries every configured [`RateSource`] in parallel, bounds
//! each call with a timeout, and merges whatever succeeded. A failing
//! source never fails the cycle: it is logged and left out of the result.

use crate::aggregated::{AggregatedRates, TokenComparison};
use crate::cache::{keys, RateCache};
use crate::config::AggregatorConfig;
use crate::error::EngineError;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use lendwatch_protocol::{Network, ProtocolRates, RateSource, SourceError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Fan-out/fan-in aggregator over an ordered list of sources.
///
/// Cheap to clone; clones share sources and cache.
#[derive(Clone)]
pub struct RateAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    sources: Vec<Arc<dyn RateSource>>,
    cache: RateCache,
    rates_ttl: Duration,
    protocol_rates_ttl: Duration,
    source_timeout: Duration,
    /// One refresh at a time per network
    refresh_locks: DashMap<Network, Arc<Mutex<()>>>,
}

impl fmt::Debug for RateAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateAggregator")
            .field("protocols", &self.protocols())
            .field("rates_ttl", &self.inner.rates_ttl)
            .field("source_timeout", &self.inner.source_timeout)
            .finish()
    }
}

impl RateAggregator {
    /// Create an aggregator. Source order decides best-rate ties.
    pub fn new(sources: Vec<Arc<dyn RateSource>>, cache: RateCache, config: &AggregatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sources,
                cache,
                rates_ttl: config.rates_ttl(),
                protocol_rates_ttl: config.protocol_rates_ttl(),
                source_timeout: config.source_timeout(),
                refresh_locks: DashMap::new(),
            }),
        }
    }

    /// Configured protocol ids, in query order.
    pub fn protocols(&self) -> Vec<&str> {
        self.inner.sources.iter().map(|s| s.protocol_id()).collect()
    }

    /// Rates from every protocol that answered, with best-rate indices.
    ///
    /// Served from cache within the TTL. On a miss the refresh runs on its
    /// own task, so dropping this future does not abort the cycle and the
    /// result still lands in the cache. Concurrent misses for the same
    /// network share one refresh.
    #[instrument(skip(self))]
    pub async fn get_all_rates(&self, network: Network) -> Result<AggregatedRates, EngineError> {
        let key = keys::all_rates(network);
        if let Some(cached) = self.inner.cache.get::<AggregatedRates>(&key).await {
            return Ok(cached);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.refresh_once(network).await })
            .await
            .map_err(|e| EngineError::Internal(format!("aggregation task failed: {}", e)))
    }

    /// Rates for one protocol.
    ///
    /// Returns `Ok(None)` when the source fails, and
    /// [`EngineError::UnknownProtocol`] when no source has that id.
    #[instrument(skip(self))]
    pub async fn get_protocol_rates(
        &self,
        protocol: &str,
        network: Network,
    ) -> Result<Option<ProtocolRates>, EngineError> {
        let source = self
            .inner
            .sources
            .iter()
            .find(|s| s.protocol_id() == protocol)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProtocol(protocol.to_string()))?;

        let key = keys::protocol_rates(protocol, network);
        if let Some(cached) = self.inner.cache.get::<ProtocolRates>(&key).await {
            return Ok(Some(cached));
        }

        match fetch_source(source, network, self.inner.source_timeout).await {
            Ok(rates) => {
                self.inner
                    .cache
                    .set(&key, &rates, self.inner.protocol_rates_ttl)
                    .await;
                Ok(Some(rates))
            }
            Err(e) => {
                warn!(protocol = protocol, error = %e, "Rate source failed");
                Ok(None)
            }
        }
    }

    /// Per-protocol terms for one token, with best supply and borrow.
    #[instrument(skip(self))]
    pub async fn compare_token_rates(
        &self,
        token: &str,
        network: Network,
    ) -> Result<TokenComparison, EngineError> {
        let aggregate = self.get_all_rates(network).await?;
        Ok(TokenComparison::from_aggregate(token, &aggregate))
    }

    /// Drop cached aggregate and per-protocol entries for a network.
    pub async fn invalidate(&self, network: Network) {
        self.inner.cache.invalidate(&keys::all_rates(network)).await;
        for source in &self.inner.sources {
            self.inner
                .cache
                .invalidate(&keys::protocol_rates(source.protocol_id(), network))
                .await;
        }
        debug!(network = %network, "Invalidated cached rates");
    }
}

impl Inner {
    /// Refresh unless another caller filled the cache while we waited.
    async fn refresh_once(&self, network: Network) -> AggregatedRates {
        let lock = Arc::clone(self.refresh_locks.entry(network).or_default().value());
        let _guard = lock.lock().await;

        if let Some(cached) = self.cache.get::<AggregatedRates>(&keys::all_rates(network)).await {
            debug!(network = %network, "Aggregate refreshed by a concurrent caller");
            return cached;
        }

        self.refresh(network).await
    }

    async fn refresh(&self, network: Network) -> AggregatedRates {
        let started = Instant::now();
        let cycle_start = Utc::now();

        let branches = self
            .sources
            .iter()
            .filter(|source| {
                let supported = source.supports(network);
                if !supported {
                    debug!(protocol = source.protocol_id(), network = %network, "Skipping unsupported network");
                }
                supported
            })
            .map(|source| {
                let id = source.protocol_id().to_string();
                let call = fetch_source(Arc::clone(source), network, self.source_timeout);
                async move { (id, call.await) }
            });

        // join_all keeps input order, so tie-breaks follow the source list
        let results = join_all(branches).await;
        let attempted = results.len();

        let mut protocols = Vec::with_capacity(attempted);
        for (id, result) in results {
            match result {
                Ok(rates) => {
                    let key = keys::protocol_rates(&id, network);
                    self.cache.set(&key, &rates, self.protocol_rates_ttl).await;
                    protocols.push(rates);
                }
                Err(e) => {
                    warn!(protocol = %id, error = %e, timeout = e.is_timeout(), "Rate source failed");
                }
            }
        }

        let aggregate = AggregatedRates::from_protocols(network, protocols, cycle_start);
        self.cache
            .set(&keys::all_rates(network), &aggregate, self.rates_ttl)
            .await;

        info!(
            network = %network,
            succeeded = aggregate.protocols.len(),
            attempted,
            tokens = aggregate.best_supply_rates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rate aggregation cycle complete"
        );

        aggregate
    }
}

/// Call one source on its own task, bounded by `timeout`.
///
/// Panics inside the source become [`SourceError::TaskFailed`].
async fn fetch_source(
    source: Arc<dyn RateSource>,
    network: Network,
    timeout: Duration,
) -> Result<ProtocolRates, SourceError> {
    let protocol = source.protocol_id().to_string();
    let started = Instant::now();
    let mut task = tokio::spawn(async move { source.get_rates(network).await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(SourceError::TaskFailed {
            protocol,
            reason: join_error.to_string(),
        }),
        Err(_) => {
            task.abort();
            Err(SourceError::Timeout {
                protocol,
                elapsed_ms: started.elapsed().as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rate, Behavior, FailingCache, MockSource};

    fn config() -> AggregatorConfig {
        AggregatorConfig {
            rates_ttl_ms: 60_000,
            protocol_rates_ttl_ms: 60_000,
            source_timeout_ms: 200,
            ..Default::default()
        }
    }

    fn aggregator(sources: Vec<Arc<MockSource>>) -> RateAggregator {
        aggregator_with_cache(sources, RateCache::in_memory(), &config())
    }

    fn aggregator_with_cache(
        sources: Vec<Arc<MockSource>>,
        cache: RateCache,
        config: &AggregatorConfig,
    ) -> RateAggregator {
        let sources = sources
            .into_iter()
            .map(|s| s as Arc<dyn RateSource>)
            .collect();
        RateAggregator::new(sources, cache, config)
    }

    fn kamino() -> Arc<MockSource> {
        MockSource::new("kamino", vec![rate("SOL", 5.2, 7.0, 75.0), rate("USDC", 8.0, 10.0, 80.0)]).shared()
    }

    fn marginfi() -> Arc<MockSource> {
        marginfi_as("marginfi")
    }

    fn marginfi_as(id: &str) -> Arc<MockSource> {
        MockSource::new(id, vec![rate("SOL", 4.8, 6.5, 80.0)]).shared()
    }

    #[tokio::test]
    async fn test_best_supply_across_protocols() {
        let agg = aggregator(vec![kamino(), marginfi()]);
        let rates = agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert_eq!(rates.protocols.len(), 2);
        assert_eq!(rates.best_supply_rates["SOL"].protocol, "kamino");
        assert_eq!(rates.best_supply_rates["SOL"].rate, 5.2);
        assert_eq!(rates.best_borrow_rates["SOL"].protocol, "marginfi");
    }

    #[tokio::test]
    async fn test_failed_source_excluded() {
        let agg = aggregator(vec![kamino(), MockSource::failing("marginfi").shared(), marginfi_as("solend")]);
        let rates = agg.get_all_rates(Network::Mainnet).await.unwrap();

        let ids: Vec<_> = rates.protocols.iter().map(|p| p.protocol.as_str()).collect();
        assert_eq!(ids, vec!["kamino", "solend"]);
    }

    #[tokio::test]
    async fn test_all_sources_fail_is_empty_not_error() {
        let agg = aggregator(vec![
            MockSource::failing("kamino").shared(),
            MockSource::failing("marginfi").shared(),
            MockSource::failing("solend").shared(),
        ]);
        let rates = agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert!(rates.protocols.is_empty());
        assert!(rates.best_supply_rates.is_empty());
        assert!(rates.best_borrow_rates.is_empty());
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let source = kamino();
        let agg = aggregator(vec![Arc::clone(&source)]);

        agg.get_all_rates(Network::Mainnet).await.unwrap();
        agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let source = kamino();
        let config = AggregatorConfig {
            rates_ttl_ms: 20,
            ..config()
        };
        let agg = aggregator_with_cache(vec![Arc::clone(&source)], RateCache::in_memory(), &config);

        agg.get_all_rates(Network::Mainnet).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_networks_cached_separately() {
        let source = kamino();
        let agg = aggregator(vec![Arc::clone(&source)]);

        let mainnet = agg.get_all_rates(Network::Mainnet).await.unwrap();
        let devnet = agg.get_all_rates(Network::Devnet).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(mainnet.network, Network::Mainnet);
        assert_eq!(devnet.protocols[0].network, Network::Devnet);
    }

    #[tokio::test]
    async fn test_timeout_excluded() {
        let slow = MockSource::new("marginfi", vec![rate("SOL", 9.9, 1.0, 80.0)])
            .with_behavior(Behavior::Delay(Duration::from_secs(2)))
            .shared();
        let agg = aggregator(vec![kamino(), slow]);

        let started = Instant::now();
        let rates = agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(rates.protocols.len(), 1);
        assert_eq!(rates.best_supply_rates["SOL"].protocol, "kamino");
    }

    #[tokio::test]
    async fn test_panicking_source_excluded() {
        let broken = MockSource::new("marginfi", Vec::new())
            .with_behavior(Behavior::Panic)
            .shared();
        let agg = aggregator(vec![kamino(), broken]);

        let rates = agg.get_all_rates(Network::Mainnet).await.unwrap();
        assert_eq!(rates.protocols.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_cache_does_not_fail_aggregation() {
        let source = kamino();
        let agg = aggregator_with_cache(
            vec![Arc::clone(&source)],
            RateCache::new(Arc::new(FailingCache)),
            &config(),
        );

        let first = agg.get_all_rates(Network::Mainnet).await.unwrap();
        let second = agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert_eq!(first.protocols.len(), 1);
        assert_eq!(second.protocols.len(), 1);
        // Every call recomputes
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_still_populates_cache() {
        let source = MockSource::new("kamino", vec![rate("SOL", 5.2, 7.0, 75.0)])
            .with_behavior(Behavior::Delay(Duration::from_millis(50)))
            .shared();
        let agg = aggregator(vec![Arc::clone(&source)]);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), agg.get_all_rates(Network::Mainnet)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let rates = agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert_eq!(rates.protocols.len(), 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_network_skipped() {
        let mainnet_only = MockSource::new("marginfi", vec![rate("SOL", 9.9, 1.0, 80.0)])
            .on_networks(&[Network::Mainnet])
            .shared();
        let agg = aggregator(vec![kamino(), Arc::clone(&mainnet_only)]);

        let devnet = agg.get_all_rates(Network::Devnet).await.unwrap();
        assert_eq!(mainnet_only.calls(), 0);
        let ids: Vec<_> = devnet.protocols.iter().map(|p| p.protocol.as_str()).collect();
        assert_eq!(ids, vec!["kamino"]);
        assert_eq!(devnet.best_supply_rates["SOL"].protocol, "kamino");

        let mainnet = agg.get_all_rates(Network::Mainnet).await.unwrap();
        assert_eq!(mainnet_only.calls(), 1);
        assert_eq!(mainnet.best_supply_rates["SOL"].protocol, "marginfi");
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_refresh() {
        let source = MockSource::new("kamino", vec![rate("SOL", 5.2, 7.0, 75.0)])
            .with_behavior(Behavior::Delay(Duration::from_millis(50)))
            .shared();
        let agg = aggregator(vec![Arc::clone(&source)]);

        let callers = (0..8).map(|_| {
            let agg = agg.clone();
            async move { agg.get_all_rates(Network::Mainnet).await }
        });
        let results = join_all(callers).await;

        assert_eq!(source.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap().protocols.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_refresh_lock_is_per_network() {
        let source = MockSource::new("kamino", vec![rate("SOL", 5.2, 7.0, 75.0)])
            .with_behavior(Behavior::Delay(Duration::from_millis(50)))
            .shared();
        let agg = aggregator(vec![Arc::clone(&source)]);

        let (mainnet, devnet) = tokio::join!(
            agg.get_all_rates(Network::Mainnet),
            agg.get_all_rates(Network::Devnet)
        );

        assert_eq!(mainnet.unwrap().network, Network::Mainnet);
        assert_eq!(devnet.unwrap().network, Network::Devnet);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_protocol_rates() {
        let source = kamino();
        let agg = aggregator(vec![Arc::clone(&source), marginfi()]);

        let rates = agg
            .get_protocol_rates("kamino", Network::Mainnet)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rates.protocol, "kamino");

        agg.get_protocol_rates("kamino", Network::Mainnet).await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_protocol_rates_reuses_cycle_snapshot() {
        let source = kamino();
        let agg = aggregator(vec![Arc::clone(&source)]);

        agg.get_all_rates(Network::Mainnet).await.unwrap();
        agg.get_protocol_rates("kamino", Network::Mainnet).await.unwrap();

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_protocol_rates_unknown_id() {
        let agg = aggregator(vec![kamino()]);
        let result = agg.get_protocol_rates("drift", Network::Mainnet).await;

        assert!(matches!(result, Err(EngineError::UnknownProtocol(id)) if id == "drift"));
    }

    #[tokio::test]
    async fn test_protocol_rates_failure_is_none() {
        let agg = aggregator(vec![MockSource::failing("kamino").shared()]);
        let result = agg.get_protocol_rates("kamino", Network::Mainnet).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_compare_token_rates() {
        let agg = aggregator(vec![kamino(), marginfi()]);

        let sol = agg.compare_token_rates("SOL", Network::Mainnet).await.unwrap();
        assert_eq!(sol.rows.len(), 2);
        assert_eq!(sol.best_supply.unwrap().protocol, "kamino");
        assert_eq!(sol.best_borrow.unwrap().protocol, "marginfi");

        let bonk = agg.compare_token_rates("BONK", Network::Mainnet).await.unwrap();
        assert!(bonk.rows.is_empty());
        assert!(bonk.best_supply.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = kamino();
        let agg = aggregator(vec![Arc::clone(&source)]);

        agg.get_all_rates(Network::Mainnet).await.unwrap();
        agg.invalidate(Network::Mainnet).await;
        agg.get_all_rates(Network::Mainnet).await.unwrap();

        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_protocols_in_order() {
        let agg = aggregator(vec![kamino(), marginfi()]);
        assert_eq!(agg.protocols(), vec!["kamino", "marginfi"]);
    }
}
