//! Kamino Lend reserve metrics client.

use async_trait::async_trait;
use lendwatch_protocol::{Network, ProtocolRates, RateSource, SourceError, TokenRate};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::de::{f64_from_string, optional_f64};
use crate::http::{fetch_json, valid_rows};

/// Main market on mainnet.
pub const KAMINO_MAIN_MARKET: &str = "7u3HeHxYDLhnCoErrtycNokbQYbWGzLs6JSDqGAv5PfF";

/// Kamino rate source.
///
/// Reads `/kamino-market/{market}/reserves/metrics`, which reports rates and
/// weights as fractions (0.052 = 5.2%).
#[derive(Debug, Clone)]
pub struct KaminoSource {
    client: reqwest::Client,
    base_url: String,
    market: String,
}

impl KaminoSource {
    pub const PROTOCOL_ID: &'static str = "kamino";

    /// Create a client for the public API and main market.
    pub fn new() -> Self {
        Self::with_base_url("https://api.kamino.finance")
    }

    /// Create a client with custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            market: KAMINO_MAIN_MARKET.to_string(),
        }
    }

    /// Track a different lending market.
    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn env_param(network: Network) -> &'static str {
        match network {
            Network::Mainnet => "mainnet-beta",
            Network::Devnet => "devnet",
        }
    }
}

impl Default for KaminoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateSource for KaminoSource {
    fn protocol_id(&self) -> &str {
        Self::PROTOCOL_ID
    }

    #[instrument(skip(self), fields(market = %self.market))]
    async fn get_rates(&self, network: Network) -> Result<ProtocolRates, SourceError> {
        let url = format!(
            "{}/kamino-market/{}/reserves/metrics",
            self.base_url, self.market
        );

        let reserves: Vec<KaminoReserve> = fetch_json(
            Self::PROTOCOL_ID,
            self.client.get(&url).query(&[("env", Self::env_param(network))]),
        )
        .await?;

        let fetched = reserves.len();
        let rates = valid_rows(
            Self::PROTOCOL_ID,
            reserves.into_iter().map(KaminoReserve::into_rate),
        );

        debug!(fetched, kept = rates.len(), "Fetched Kamino reserves");

        Ok(ProtocolRates::new(Self::PROTOCOL_ID, network, rates))
    }
}

/// One reserve in the metrics response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KaminoReserve {
    /// Reserve address
    pub reserve: String,
    /// Token symbol
    pub liquidity_token: String,
    /// Token mint
    pub liquidity_token_mint: String,
    #[serde(deserialize_with = "f64_from_string")]
    pub supply_apy: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub borrow_apy: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub total_supply: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub total_borrow: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub max_ltv: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub liquidation_threshold: f64,
    /// Liquidation bonus, absent on some reserves
    #[serde(default, deserialize_with = "optional_f64")]
    pub liquidation_bonus: Option<f64>,
}

impl KaminoReserve {
    fn into_rate(self) -> TokenRate {
        TokenRate::new(self.liquidity_token, self.liquidity_token_mint)
            .with_apys(self.supply_apy * 100.0, self.borrow_apy * 100.0)
            .with_liquidity(self.total_supply, self.total_borrow)
            .with_risk(
                self.max_ltv * 100.0,
                self.liquidation_threshold * 100.0,
                self.liquidation_bonus.unwrap_or(0.0) * 100.0,
            )
    }
}
