//! Solend (Save) reserves client.

use async_trait::async_trait;
use lendwatch_protocol::{Network, ProtocolRates, RateSource, SourceError, TokenRate};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::de::f64_from_string;
use crate::http::{fetch_json, valid_rows};

/// Solend rate source.
///
/// Reserve config values are already percentages (LTV 75 = 75%).
#[derive(Debug, Clone)]
pub struct SolendSource {
    client: reqwest::Client,
    base_url: String,
}

impl SolendSource {
    pub const PROTOCOL_ID: &'static str = "solend";

    /// Create a client for the public API.
    pub fn new() -> Self {
        Self::with_base_url("https://api.solend.fi")
    }

    /// Create a client with custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn deployment(network: Network) -> &'static str {
        match network {
            Network::Mainnet => "production",
            Network::Devnet => "devnet",
        }
    }
}

impl Default for SolendSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateSource for SolendSource {
    fn protocol_id(&self) -> &str {
        Self::PROTOCOL_ID
    }

    #[instrument(skip(self))]
    async fn get_rates(&self, network: Network) -> Result<ProtocolRates, SourceError> {
        let url = format!("{}/v1/reserves", self.base_url);
        let response: ReservesResponse = fetch_json(
            Self::PROTOCOL_ID,
            self.client
                .get(&url)
                .query(&[("scope", "all"), ("deployment", Self::deployment(network))]),
        )
        .await?;

        let fetched = response.results.len();
        let rates = valid_rows(
            Self::PROTOCOL_ID,
            response.results.into_iter().map(SolendReserve::into_rate),
        );

        debug!(fetched, kept = rates.len(), "Fetched Solend reserves");

        Ok(ProtocolRates::new(Self::PROTOCOL_ID, network, rates))
    }
}

#[derive(Debug, Deserialize)]
struct ReservesResponse {
    results: Vec<SolendReserve>,
}

/// One reserve in the Solend API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolendReserve {
    pub symbol: String,
    pub mint_address: String,
    /// Supply APY (%)
    #[serde(deserialize_with = "f64_from_string")]
    pub supply_interest: f64,
    /// Borrow APY (%)
    #[serde(deserialize_with = "f64_from_string")]
    pub borrow_interest: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub total_supply: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub total_borrow: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub loan_to_value_ratio: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub liquidation_threshold: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub liquidation_bonus: f64,
}

impl SolendReserve {
    fn into_rate(self) -> TokenRate {
        TokenRate::new(self.symbol, self.mint_address)
            .with_apys(self.supply_interest, self.borrow_interest)
            .with_liquidity(self.total_supply, self.total_borrow)
            .with_risk(
                self.loan_to_value_ratio,
                self.liquidation_threshold,
                self.liquidation_bonus,
            )
    }
}
