//! Test doubles for sources and cache backends.

use crate::cache::{CacheError, CacheStore};
use async_trait::async_trait;
use lendwatch_protocol::{Network, ProtocolRates, RateSource, SourceError, TokenRate};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Token row with liquidity and a liquidation threshold 5 points above LTV.
pub fn rate(token: &str, supply_apy: f64, borrow_apy: f64, ltv: f64) -> TokenRate {
    TokenRate::new(token, format!("mint-{}", token.to_lowercase()))
        .with_apys(supply_apy, borrow_apy)
        .with_liquidity(1000.0, 500.0)
        .with_risk(ltv, ltv + 5.0, 5.0)
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Ok,
    Fail,
    Delay(Duration),
    Panic,
}

/// Rate source returning canned rows and counting calls.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    rates: Vec<TokenRate>,
    behavior: Behavior,
    /// `None` serves every network
    networks: Option<Vec<Network>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(id: &str, rates: Vec<TokenRate>) -> Self {
        Self {
            id: id.to_string(),
            rates,
            behavior: Behavior::Ok,
            networks: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: &str) -> Self {
        Self::new(id, Vec::new()).with_behavior(Behavior::Fail)
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Restrict the source to `networks`.
    pub fn on_networks(mut self, networks: &[Network]) -> Self {
        self.networks = Some(networks.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl RateSource for MockSource {
    fn protocol_id(&self) -> &str {
        &self.id
    }

    fn supports(&self, network: Network) -> bool {
        self.networks.as_ref().map_or(true, |n| n.contains(&network))
    }

    async fn get_rates(&self, network: Network) -> Result<ProtocolRates, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Ok => {}
            Behavior::Fail => {
                return Err(SourceError::Upstream {
                    protocol: self.id.clone(),
                    status: 503,
                    body: "service unavailable".to_string(),
                })
            }
            Behavior::Delay(delay) => tokio::time::sleep(*delay).await,
            Behavior::Panic => panic!("mock source {} panicked", self.id),
        }

        Ok(ProtocolRates::new(self.id.clone(), network, self.rates.clone()))
    }
}

/// Cache backend whose every operation fails.
#[derive(Debug)]
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}
