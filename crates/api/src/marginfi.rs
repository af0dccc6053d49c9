//! marginfi bank rates client.

use async_trait::async_trait;
use lendwatch_protocol::{Network, ProtocolRates, RateSource, SourceError, TokenRate};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::de::{f64_from_string, optional_f64};
use crate::http::{fetch_json, valid_rows};

/// marginfi rate source.
///
/// marginfi expresses risk as asset weights: the initial weight bounds new
/// borrows (LTV) and the maintenance weight bounds liquidation (threshold).
#[derive(Debug, Clone)]
pub struct MarginfiSource {
    client: reqwest::Client,
    base_url: String,
}

impl MarginfiSource {
    pub const PROTOCOL_ID: &'static str = "marginfi";

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
}

#[async_trait]
impl RateSource for MarginfiSource {
    fn protocol_id(&self) -> &str {
        Self::PROTOCOL_ID
    }

    /// Only the mainnet group is tracked.
    fn supports(&self, network: Network) -> bool {
        network == Network::Mainnet
    }

    #[instrument(skip(self))]
    async fn get_rates(&self, network: Network) -> Result<ProtocolRates, SourceError> {
        if !self.supports(network) {
            return Err(SourceError::UnsupportedNetwork {
                protocol: Self::PROTOCOL_ID.to_string(),
                network,
            });
        }

        let url = format!("{}/banks", self.base_url);
        let response: BanksResponse = fetch_json(
            Self::PROTOCOL_ID,
            self.client.get(&url).query(&[("cluster", network.as_str())]),
        )
        .await?;

        let fetched = response.banks.len();
        let rates = valid_rows(
            Self::PROTOCOL_ID,
            response.banks.into_iter().map(MarginfiBank::into_rate),
        );

        debug!(fetched, kept = rates.len(), "Fetched marginfi banks");

        Ok(ProtocolRates::new(Self::PROTOCOL_ID, network, rates))
    }
}

#[derive(Debug, Deserialize)]
struct BanksResponse {
    banks: Vec<MarginfiBank>,
}

/// One bank in the marginfi group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginfiBank {
    pub token_symbol: String,
    pub mint: String,
    /// Lending rate (fraction)
    #[serde(deserialize_with = "f64_from_string")]
    pub lending_rate: f64,
    /// Borrowing rate (fraction)
    #[serde(deserialize_with = "f64_from_string")]
    pub borrowing_rate: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub total_deposits: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub total_borrows: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub asset_weight_init: f64,
    #[serde(deserialize_with = "f64_from_string")]
    pub asset_weight_maint: f64,
    /// Liquidation fee (fraction)
    #[serde(default, deserialize_with = "optional_f64")]
    pub liquidation_fee: Option<f64>,
}

impl MarginfiBank {
    fn into_rate(self) -> TokenRate {
        TokenRate::new(self.token_symbol, self.mint)
            .with_apys(self.lending_rate * 100.0, self.borrowing_rate * 100.0)
            .with_liquidity(self.total_deposits, self.total_borrows)
            .with_risk(
                self.asset_weight_init * 100.0,
                self.asset_weight_maint * 100.0,
                self.liquidation_fee.unwrap_or(0.025) * 100.0,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_conversion() {
        let json = r#"{
            "banks": [
                {
                    "tokenSymbol": "SOL",
                    "mint": "So11111111111111111111111111111111111111112",
                    "lendingRate": "0.048",
                    "borrowingRate": "0.065",
                    "totalDeposits": "2000000",
                    "totalBorrows": "1000000",
                    "assetWeightInit": "0.8",
                    "assetWeightMaint": "0.9",
                    "liquidationFee": "0.05"
                },
                {
                    "tokenSymbol": "JitoSOL",
                    "mint": "J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn",
                    "lendingRate": 0.071,
                    "borrowingRate": 0.09,
                    "totalDeposits": 400000,
                    "totalBorrows": 20000,
                    "assetWeightInit": 0.7,
                    "assetWeightMaint": 0.8
                }
            ]
        }"#;

        let response: BanksResponse = serde_json::from_str(json).unwrap();
        let rates: Vec<TokenRate> = response.banks.into_iter().map(MarginfiBank::into_rate).collect();

        let sol = &rates[0];
        assert!((sol.supply_apy - 4.8).abs() < 1e-9);
        assert!((sol.borrow_apy - 6.5).abs() < 1e-9);
        assert!((sol.ltv - 80.0).abs() < 1e-9);
        assert!((sol.liquidation_threshold - 90.0).abs() < 1e-9);
        assert!((sol.utilization - 50.0).abs() < 1e-9);

        let jito = &rates[1];
        assert!((jito.liquidation_penalty - 2.5).abs() < 1e-9);
        assert!(jito.validate().is_ok());
    }

    #[tokio::test]
    async fn test_devnet_unsupported() {
        let source = MarginfiSource::with_base_url("http://127.0.0.1:9");
        assert!(!source.supports(Network::Devnet));

        let err = source.get_rates(Network::Devnet).await.unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedNetwork { .. }));
    }
}
