//! Rate data model shared by sources, the aggregator and the quote engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Network selector passed to every rate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production cluster
    #[default]
    Mainnet,
    /// Development cluster
    Devnet,
}

impl Network {
    /// Identifier used in cache keys and upstream query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Devnet => "devnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network name that did not match any known cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown network '{0}'")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" | "main" => Ok(Self::Mainnet),
            "devnet" | "dev" => Ok(Self::Devnet),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Maximum leverage allowed by a loan-to-value ratio (percent).
///
/// `1 / (1 - ltv/100)`. An LTV of 100% or more has no finite bound.
pub fn max_leverage(ltv_pct: f64) -> f64 {
    let headroom = 1.0 - ltv_pct / 100.0;
    if headroom <= 0.0 {
        f64::INFINITY
    } else {
        1.0 / headroom
    }
}

/// Reason a token rate was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateViolation {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("negative {field}: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("ltv {ltv}% must be below liquidation threshold {threshold}%")]
    LtvNotBelowThreshold { ltv: f64, threshold: f64 },

    #[error("liquidation threshold {0}% exceeds 100%")]
    ThresholdAboveMax(f64),
}

/// Current rates and risk parameters for one token on one protocol.
///
/// All percentages are expressed in percent (5.2 = 5.2%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRate {
    /// Token symbol (e.g. "SOL")
    pub token: String,
    /// Mint address
    pub mint: String,
    /// Supply APY (%)
    pub supply_apy: f64,
    /// Borrow APY (%)
    pub borrow_apy: f64,
    /// Total supplied, in token units
    pub total_supply: f64,
    /// Total borrowed, in token units
    pub total_borrow: f64,
    /// Borrowed / supplied × 100
    pub utilization: f64,
    /// Loan-to-value ratio (%)
    pub ltv: f64,
    /// Liquidation threshold (%)
    pub liquidation_threshold: f64,
    /// Liquidation penalty (%)
    pub liquidation_penalty: f64,
}

impl TokenRate {
    /// Create an empty rate row for a token.
    pub fn new(token: impl Into<String>, mint: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            mint: mint.into(),
            supply_apy: 0.0,
            borrow_apy: 0.0,
            total_supply: 0.0,
            total_borrow: 0.0,
            utilization: 0.0,
            ltv: 0.0,
            liquidation_threshold: 0.0,
            liquidation_penalty: 0.0,
        }
    }

    /// Set supply and borrow APY (%).
    pub fn with_apys(mut self, supply_apy: f64, borrow_apy: f64) -> Self {
        self.supply_apy = supply_apy;
        self.borrow_apy = borrow_apy;
        self
    }

    /// Set supplied/borrowed liquidity and recompute utilization.
    pub fn with_liquidity(mut self, total_supply: f64, total_borrow: f64) -> Self {
        self.total_supply = total_supply;
        self.total_borrow = total_borrow;
        self.utilization = if total_supply > 0.0 {
            (total_borrow / total_supply * 100.0).max(0.0)
        } else {
            0.0
        };
        self
    }

    /// Set LTV, liquidation threshold and liquidation penalty (%).
    pub fn with_risk(mut self, ltv: f64, liquidation_threshold: f64, liquidation_penalty: f64) -> Self {
        self.ltv = ltv;
        self.liquidation_threshold = liquidation_threshold;
        self.liquidation_penalty = liquidation_penalty;
        self
    }

    /// Maximum leverage when this token is used as collateral.
    pub fn max_leverage(&self) -> f64 {
        max_leverage(self.ltv)
    }

    /// Check the row against the model invariants.
    pub fn validate(&self) -> Result<(), RateViolation> {
        let fields = [
            ("supply_apy", self.supply_apy),
            ("borrow_apy", self.borrow_apy),
            ("total_supply", self.total_supply),
            ("total_borrow", self.total_borrow),
            ("ltv", self.ltv),
            ("liquidation_threshold", self.liquidation_threshold),
            ("liquidation_penalty", self.liquidation_penalty),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(RateViolation::NonFinite { field });
            }
        }

        for (field, value) in [
            ("total_supply", self.total_supply),
            ("total_borrow", self.total_borrow),
            ("ltv", self.ltv),
        ] {
            if value < 0.0 {
                return Err(RateViolation::Negative { field, value });
            }
        }

        if self.ltv >= self.liquidation_threshold {
            return Err(RateViolation::LtvNotBelowThreshold {
                ltv: self.ltv,
                threshold: self.liquidation_threshold,
            });
        }
        if self.liquidation_threshold > 100.0 {
            return Err(RateViolation::ThresholdAboveMax(self.liquidation_threshold));
        }

        Ok(())
    }

    /// Case-insensitive symbol match.
    pub fn is_token(&self, symbol: &str) -> bool {
        self.token.eq_ignore_ascii_case(symbol)
    }
}

/// Snapshot of every tracked token on one protocol.
///
/// Produced by a [`crate::RateSource`] and treated as immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRates {
    /// Protocol identifier (e.g. "kamino")
    pub protocol: String,
    /// Network the rates were read from
    pub network: Network,
    /// Token rows in source order, no duplicate symbols
    pub rates: Vec<TokenRate>,
    /// Sum of `total_supply` across rows
    pub tvl: f64,
    /// When the snapshot was computed
    pub timestamp: DateTime<Utc>,
}

impl ProtocolRates {
    /// Build a snapshot stamped with the current time.
    ///
    /// Duplicate symbols are dropped, keeping the first occurrence.
    pub fn new(
        protocol: impl Into<String>,
        network: Network,
        rates: impl IntoIterator<Item = TokenRate>,
    ) -> Self {
        Self::at(protocol, network, rates, Utc::now())
    }

    /// Build a snapshot with an explicit timestamp.
    pub fn at(
        protocol: impl Into<String>,
        network: Network,
        rates: impl IntoIterator<Item = TokenRate>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut seen = HashSet::new();
        let rates: Vec<TokenRate> = rates
            .into_iter()
            .filter(|r| seen.insert(r.token.to_ascii_uppercase()))
            .collect();
        let tvl = rates.iter().map(|r| r.total_supply).sum();

        Self {
            protocol: protocol.into(),
            network,
            rates,
            tvl,
            timestamp,
        }
    }

    /// Look up a token row by symbol (case-insensitive).
    pub fn token(&self, symbol: &str) -> Option<&TokenRate> {
        self.rates.iter().find(|r| r.is_token(symbol))
    }

    /// Iterate over reported symbols.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.rates.iter().map(|r| r.token.as_str())
    }
}
