//! TTL cache shared by the aggregator and anything built on top of it.
//!
//! [`CacheStore`] is the backend contract: string keys, JSON values,
//! per-entry TTL. [`MemoryCache`] is the in-process backend; an external
//! key-value store only needs to implement the same trait.
//!
//! [`RateCache`] is the typed view the engine actually uses. It never
//! returns cache errors: a failing backend is logged and treated as a miss,
//! so callers always fall through to recomputing.

mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Cache backend failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value backend with per-entry expiry.
///
/// Implementations must be safe for concurrent use; per-key atomicity is
/// sufficient. A read after expiry must behave like a miss.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache key layout.
pub mod keys {
    use lendwatch_protocol::Network;

    /// Aggregate view across every protocol.
    pub fn all_rates(network: Network) -> String {
        format!("rates:all:{}", network)
    }

    /// Single protocol snapshot.
    pub fn protocol_rates(protocol: &str, network: Network) -> String {
        format!("rates:{}:{}", protocol, network)
    }
}

/// Typed, failure-tolerant handle over a [`CacheStore`].
#[derive(Debug, Clone)]
pub struct RateCache {
    store: Arc<dyn CacheStore>,
}

impl RateCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Cache backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// Read and decode a value. Backend or decode failures are a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.store.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key = key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => {
                debug!(key = key, "Cache hit");
                Some(decoded)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cached value has unexpected shape, treating as miss");
                None
            }
        }
    }

    /// Encode and store a value. Failures are logged and dropped.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to encode cache value");
                return;
            }
        };

        if let Err(e) = self.store.set(key, value, ttl).await {
            warn!(key = key, error = %e, "Cache write failed");
        }
    }

    /// Drop a key. Failures are logged and dropped.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = key, error = %e, "Cache delete failed");
        }
    }
}
