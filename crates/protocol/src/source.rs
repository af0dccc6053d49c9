//! Rate source abstraction for multi-protocol support.
//!
//! Every lending protocol is exposed through one [`RateSource`]
//! implementation. The aggregator holds an ordered list of
//! `Arc<dyn RateSource>`; adding a protocol means adding one implementation
//! and one registry entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use lendwatch_protocol::{Network, RateSource};
//!
//! let source = KaminoSource::new(config);
//! let rates = source.get_rates(Network::Mainnet).await?;
//! for rate in &rates.rates {
//!     println!("{}: supply {:.2}% borrow {:.2}%", rate.token, rate.supply_apy, rate.borrow_apy);
//! }
//! ```

use crate::model::{Network, ProtocolRates};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Failure of a single rate source.
///
/// The aggregator recovers from every variant by excluding the protocol
/// from the current cycle.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{protocol}: request timed out after {elapsed_ms}ms")]
    Timeout { protocol: String, elapsed_ms: u64 },

    #[error("{protocol}: upstream returned {status}: {body}")]
    Upstream {
        protocol: String,
        status: u16,
        body: String,
    },

    #[error("{protocol}: malformed response: {reason}")]
    Malformed { protocol: String, reason: String },

    #[error("{protocol}: network {network} is not supported")]
    UnsupportedNetwork { protocol: String, network: Network },

    #[error("{protocol}: source task failed: {reason}")]
    TaskFailed { protocol: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl SourceError {
    /// Whether the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Per-protocol provider of current token rates.
///
/// Implementations may cache internally, but must not assume the caller
/// does not cache as well.
#[async_trait]
pub trait RateSource: Send + Sync + Debug {
    /// Protocol identifier (e.g. "kamino", "marginfi").
    fn protocol_id(&self) -> &str;

    /// Whether the protocol is deployed on `network`.
    fn supports(&self, network: Network) -> bool {
        let _ = network;
        true
    }

    /// Fetch the current rates for every tracked token.
    async fn get_rates(&self, network: Network) -> Result<ProtocolRates, SourceError>;
}
