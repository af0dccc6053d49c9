//! Merged cross-protocol views.

use chrono::{DateTime, Utc};
use lendwatch_protocol::{Network, ProtocolRates, TokenRate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Winning protocol and its rate for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestRate {
    pub protocol: String,
    pub rate: f64,
}

/// Every protocol that answered in one aggregation cycle, plus best-rate
/// indices keyed by token symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRates {
    pub network: Network,
    /// Successful protocols, in configured source order
    pub protocols: Vec<ProtocolRates>,
    /// Highest supply APY per token (upper-cased symbol)
    pub best_supply_rates: BTreeMap<String, BestRate>,
    /// Lowest borrow APY per token (upper-cased symbol)
    pub best_borrow_rates: BTreeMap<String, BestRate>,
    pub updated_at: DateTime<Utc>,
}

impl AggregatedRates {
    /// Merge protocol snapshots. Order of `protocols` decides ties.
    pub fn from_protocols(network: Network, protocols: Vec<ProtocolRates>, updated_at: DateTime<Utc>) -> Self {
        let best_supply_rates = best_by(&protocols, |r| r.supply_apy, |candidate, current| candidate > current);
        let best_borrow_rates = best_by(&protocols, |r| r.borrow_apy, |candidate, current| candidate < current);

        Self {
            network,
            protocols,
            best_supply_rates,
            best_borrow_rates,
            updated_at,
        }
    }

    /// Aggregate with no protocols.
    pub fn empty(network: Network, updated_at: DateTime<Utc>) -> Self {
        Self::from_protocols(network, Vec::new(), updated_at)
    }

    pub fn protocol(&self, id: &str) -> Option<&ProtocolRates> {
        self.protocols.iter().find(|p| p.protocol == id)
    }

    /// Combined TVL across all reporting protocols.
    pub fn total_tvl(&self) -> f64 {
        self.protocols.iter().map(|p| p.tvl).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

/// Pick one rate per symbol, keyed by the upper-cased symbol so that
/// "JitoSOL" and "JITOSOL" compete. `better` must be strict so the
/// first-seen protocol keeps ties.
fn best_by(
    protocols: &[ProtocolRates],
    value: impl Fn(&TokenRate) -> f64,
    better: impl Fn(f64, f64) -> bool,
) -> BTreeMap<String, BestRate> {
    let mut best: BTreeMap<String, BestRate> = BTreeMap::new();

    for protocol in protocols {
        for rate in &protocol.rates {
            let candidate = value(rate);
            let symbol = rate.token.to_ascii_uppercase();
            match best.get_mut(&symbol) {
                Some(current) => {
                    if better(candidate, current.rate) {
                        current.protocol = protocol.protocol.clone();
                        current.rate = candidate;
                    }
                }
                None => {
                    best.insert(
                        symbol,
                        BestRate {
                            protocol: protocol.protocol.clone(),
                            rate: candidate,
                        },
                    );
                }
            }
        }
    }

    best
}

/// One protocol's terms for a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub protocol: String,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    pub utilization: f64,
    pub ltv: f64,
    pub liquidation_threshold: f64,
    pub max_leverage: f64,
    pub total_supply: f64,
    pub total_borrow: f64,
}

impl ComparisonRow {
    fn new(protocol: &str, rate: &TokenRate) -> Self {
        Self {
            protocol: protocol.to_string(),
            supply_apy: rate.supply_apy,
            borrow_apy: rate.borrow_apy,
            utilization: rate.utilization,
            ltv: rate.ltv,
            liquidation_threshold: rate.liquidation_threshold,
            max_leverage: rate.max_leverage(),
            total_supply: rate.total_supply,
            total_borrow: rate.total_borrow,
        }
    }
}

/// Side-by-side view of a single token across protocols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenComparison {
    pub token: String,
    pub network: Network,
    pub rows: Vec<ComparisonRow>,
    pub best_supply: Option<BestRate>,
    pub best_borrow: Option<BestRate>,
    pub updated_at: DateTime<Utc>,
}

impl TokenComparison {
    /// Build the comparison for `token` (case-insensitive) from an aggregate.
    pub fn from_aggregate(token: &str, aggregate: &AggregatedRates) -> Self {
        let mut rows = Vec::new();
        let mut best_supply: Option<BestRate> = None;
        let mut best_borrow: Option<BestRate> = None;

        for protocol in &aggregate.protocols {
            let Some(rate) = protocol.token(token) else {
                continue;
            };
            rows.push(ComparisonRow::new(&protocol.protocol, rate));

            if best_supply.as_ref().map_or(true, |b| rate.supply_apy > b.rate) {
                best_supply = Some(BestRate {
                    protocol: protocol.protocol.clone(),
                    rate: rate.supply_apy,
                });
            }
            if best_borrow.as_ref().map_or(true, |b| rate.borrow_apy < b.rate) {
                best_borrow = Some(BestRate {
                    protocol: protocol.protocol.clone(),
                    rate: rate.borrow_apy,
                });
            }
        }

        Self {
            token: token.to_string(),
            network: aggregate.network,
            rows,
            best_supply,
            best_borrow,
            updated_at: aggregate.updated_at,
        }
    }
}
