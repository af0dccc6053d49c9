//! Leveraged position quotes.
//!
//! For a collateral/borrow pair and a target leverage, every protocol that
//! lists both tokens gets one quote, unless the leverage exceeds what the
//! collateral's LTV allows there. The cheapest borrow is recommended.
//!
//! # Formulas
//!
//! With `C` = collateral value, `L` = leverage, `LT` = liquidation threshold:
//!
//! ```text
//! borrow value      = C × (L − 1)
//! max leverage      = 1 / (1 − LTV/100)
//! health factor     = C × LT/100 / borrow value      (∞ when nothing is borrowed)
//! liquidation price = borrow value / (amount × LT/100)
//! net APY           = supply APY − borrow APY × (L − 1)
//! ```

use crate::aggregator::RateAggregator;
use crate::error::EngineError;
use lendwatch_protocol::{max_leverage, Network, PriceOracle, ProtocolRates, TokenRate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Reason attached to the recommended quote.
pub const LOWEST_BORROW_RATE: &str = "lowest borrow rate";

/// Request for position quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionQuoteParams {
    pub collateral_token: String,
    pub collateral_amount: f64,
    pub borrow_token: String,
    pub leverage: f64,
    #[serde(default)]
    pub network: Network,
}

impl PositionQuoteParams {
    pub fn new(
        collateral_token: impl Into<String>,
        collateral_amount: f64,
        borrow_token: impl Into<String>,
        leverage: f64,
        network: Network,
    ) -> Self {
        Self {
            collateral_token: collateral_token.into(),
            collateral_amount,
            borrow_token: borrow_token.into(),
            leverage,
            network,
        }
    }

    /// Reject parameters no quote can be built from.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.collateral_token.trim().is_empty() || self.borrow_token.trim().is_empty() {
            return Err(EngineError::InvalidParams("token symbols must not be empty".into()));
        }
        if !self.collateral_amount.is_finite() || self.collateral_amount <= 0.0 {
            return Err(EngineError::InvalidParams(format!(
                "collateral amount must be positive, got {}",
                self.collateral_amount
            )));
        }
        if !self.leverage.is_finite() || self.leverage <= 1.0 {
            return Err(EngineError::InvalidParams(format!(
                "leverage must be greater than 1, got {}",
                self.leverage
            )));
        }
        Ok(())
    }
}

/// One side of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLeg {
    pub token: String,
    pub amount: f64,
    pub price_usd: f64,
    pub value_usd: f64,
}

/// Terms for opening a position on one protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionQuote {
    pub protocol: String,
    pub collateral: QuoteLeg,
    pub borrow: QuoteLeg,
    pub leverage: f64,
    pub max_leverage: f64,
    /// Collateral price at which the position becomes liquidatable
    pub liquidation_price: f64,
    /// How far the collateral price can fall before liquidation (%)
    pub liquidation_distance_pct: f64,
    /// Serialized as `null` when infinite
    pub health_factor: f64,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    pub net_apy: f64,
    pub estimated_fees: f64,
    pub is_recommended: bool,
    pub recommendation_reason: Option<String>,
}

/// Risk-adjusted collateral over debt; `+∞` with no debt.
pub fn health_factor(collateral_value_usd: f64, liquidation_threshold_pct: f64, borrow_value_usd: f64) -> f64 {
    if borrow_value_usd <= 0.0 {
        return f64::INFINITY;
    }
    collateral_value_usd * liquidation_threshold_pct / 100.0 / borrow_value_usd
}

/// Collateral price at which the health factor reaches 1.
pub fn liquidation_price(borrow_value_usd: f64, collateral_amount: f64, liquidation_threshold_pct: f64) -> f64 {
    let denominator = collateral_amount * liquidation_threshold_pct / 100.0;
    if denominator <= 0.0 {
        return f64::INFINITY;
    }
    borrow_value_usd / denominator
}

/// USD prices for the two legs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegPrices {
    pub collateral: f64,
    pub borrow: f64,
}

/// Build an unrecommended quote for one protocol.
///
/// Returns `None` when the requested leverage exceeds the collateral's
/// maximum on this protocol.
pub fn build_quote(
    protocol: &str,
    params: &PositionQuoteParams,
    collateral_rate: &TokenRate,
    borrow_rate: &TokenRate,
    prices: LegPrices,
    fee_rate: f64,
) -> Option<PositionQuote> {
    let max_leverage = max_leverage(collateral_rate.ltv);
    if params.leverage > max_leverage {
        debug!(
            protocol = protocol,
            leverage = params.leverage,
            max_leverage,
            "Leverage exceeds protocol maximum"
        );
        return None;
    }

    let collateral_value = params.collateral_amount * prices.collateral;
    let borrow_value = collateral_value * (params.leverage - 1.0);
    let borrow_amount = borrow_value / prices.borrow;
    let lt = collateral_rate.liquidation_threshold;

    let liquidation_price = liquidation_price(borrow_value, params.collateral_amount, lt);
    let liquidation_distance_pct = if liquidation_price.is_finite() {
        (prices.collateral - liquidation_price) / prices.collateral * 100.0
    } else {
        0.0
    };

    Some(PositionQuote {
        protocol: protocol.to_string(),
        collateral: QuoteLeg {
            token: params.collateral_token.clone(),
            amount: params.collateral_amount,
            price_usd: prices.collateral,
            value_usd: collateral_value,
        },
        borrow: QuoteLeg {
            token: params.borrow_token.clone(),
            amount: borrow_amount,
            price_usd: prices.borrow,
            value_usd: borrow_value,
        },
        leverage: params.leverage,
        max_leverage,
        liquidation_price,
        liquidation_distance_pct,
        health_factor: health_factor(collateral_value, lt, borrow_value),
        supply_apy: collateral_rate.supply_apy,
        borrow_apy: borrow_rate.borrow_apy,
        net_apy: collateral_rate.supply_apy - borrow_rate.borrow_apy * (params.leverage - 1.0),
        estimated_fees: fee_rate * collateral_value,
        is_recommended: false,
        recommendation_reason: None,
    })
}

/// Flag the quote with the lowest borrow APY. Ties keep the earliest.
pub fn recommend(quotes: &mut [PositionQuote]) {
    let mut best: Option<usize> = None;
    for (i, quote) in quotes.iter().enumerate() {
        if best.map_or(true, |b| quote.borrow_apy < quotes[b].borrow_apy) {
            best = Some(i);
        }
    }

    if let Some(i) = best {
        quotes[i].is_recommended = true;
        quotes[i].recommendation_reason = Some(LOWEST_BORROW_RATE.to_string());
    }
}

/// Quote engine over the aggregated rate view and a price oracle.
#[derive(Clone)]
pub struct PositionQuoteEngine {
    aggregator: RateAggregator,
    oracle: Arc<dyn PriceOracle>,
    fee_rate: f64,
}

impl fmt::Debug for PositionQuoteEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionQuoteEngine")
            .field("oracle", &self.oracle.name())
            .field("fee_rate", &self.fee_rate)
            .finish()
    }
}

impl PositionQuoteEngine {
    pub fn new(aggregator: RateAggregator, oracle: Arc<dyn PriceOracle>, fee_rate: f64) -> Self {
        Self {
            aggregator,
            oracle,
            fee_rate,
        }
    }

    /// One quote per eligible protocol, at most one recommended.
    ///
    /// An empty list is a valid answer (no protocol lists both tokens, or
    /// the leverage is too high everywhere). The oracle is only consulted
    /// once at least one protocol can serve the leverage.
    #[instrument(skip(self), fields(collateral = %params.collateral_token, borrow = %params.borrow_token))]
    pub async fn get_position_quotes(
        &self,
        params: &PositionQuoteParams,
    ) -> Result<Vec<PositionQuote>, EngineError> {
        params.validate()?;

        let aggregate = self.aggregator.get_all_rates(params.network).await?;
        let candidates: Vec<(&ProtocolRates, &TokenRate, &TokenRate)> = aggregate
            .protocols
            .iter()
            .filter_map(|p| {
                let collateral = p.token(&params.collateral_token)?;
                let borrow = p.token(&params.borrow_token)?;
                Some((p, collateral, borrow))
            })
            .collect();

        if candidates.is_empty() {
            debug!("No protocol lists both tokens");
            return Ok(Vec::new());
        }

        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|(_, collateral, _)| params.leverage <= max_leverage(collateral.ltv))
            .collect();

        let Some(&(_, collateral, borrow)) = candidates.first() else {
            debug!(leverage = params.leverage, "Leverage exceeds every protocol maximum");
            return Ok(Vec::new());
        };

        let prices = LegPrices {
            collateral: self.price(&params.collateral_token, &collateral.mint).await?,
            borrow: self.price(&params.borrow_token, &borrow.mint).await?,
        };

        let mut quotes: Vec<PositionQuote> = candidates
            .into_iter()
            .filter_map(|(p, collateral, borrow)| {
                build_quote(&p.protocol, params, collateral, borrow, prices, self.fee_rate)
            })
            .collect();

        recommend(&mut quotes);

        info!(
            quotes = quotes.len(),
            recommended = quotes
                .iter()
                .find(|q| q.is_recommended)
                .map(|q| q.protocol.as_str())
                .unwrap_or("none"),
            "Position quotes built"
        );

        Ok(quotes)
    }

    async fn price(&self, token: &str, mint: &str) -> Result<f64, EngineError> {
        self.oracle
            .get_mint_price(token, mint)
            .await
            .map_err(|source| EngineError::PriceUnavailable {
                token: token.to_string(),
                source,
            })
    }
}
