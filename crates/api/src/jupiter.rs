//! Jupiter price API client.

use async_trait::async_trait;
use lendwatch_protocol::oracle::validate_price;
use lendwatch_protocol::{OracleError, PriceOracle};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::de::optional_f64;

/// Mint addresses for symbols that are priced without a reserve at hand.
const KNOWN_MINTS: &[(&str, &str)] = &[
    ("SOL", "So11111111111111111111111111111111111111112"),
    ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
    ("USDT", "Es9vMFrzaCERmJfrF4H2FYD4KNNd7HUnAU5R6c9aW9w"),
];

/// USD price oracle backed by the Jupiter price API.
///
/// Jupiter keys prices by mint address. Symbol lookups go through a
/// symbol-to-mint table and fall back to sending the symbol as-is.
#[derive(Debug, Clone)]
pub struct JupiterPriceOracle {
    client: reqwest::Client,
    base_url: String,
    mints: HashMap<String, String>,
}

impl JupiterPriceOracle {
    /// Create a client for the public API.
    pub fn new() -> Self {
        Self::with_base_url("https://api.jup.ag/price/v2")
    }

    /// Create a client with custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mints: KNOWN_MINTS
                .iter()
                .map(|(symbol, mint)| (symbol.to_string(), mint.to_string()))
                .collect(),
        }
    }

    /// Register the mint address for `symbol`.
    pub fn with_mint(mut self, symbol: &str, mint: impl Into<String>) -> Self {
        self.mints.insert(symbol.trim().to_ascii_uppercase(), mint.into());
        self
    }

    /// Mint address for `symbol`, if registered.
    pub fn mint_for(&self, symbol: &str) -> Option<&str> {
        self.mints.get(&symbol.trim().to_ascii_uppercase()).map(String::as_str)
    }

    async fn fetch(&self, token: &str, id: &str) -> Result<f64, OracleError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ids", id)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Malformed(format!("Jupiter API error: {} - {}", status, body)));
        }

        let body = response.text().await?;
        let data: PriceResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;

        let price = extract_price(token, id, data)?;
        debug!(token = %token, id = %id, price, "Fetched Jupiter price");
        Ok(price)
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for JupiterPriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for JupiterPriceOracle {
    fn name(&self) -> &str {
        "jupiter"
    }

    #[instrument(skip(self))]
    async fn get_price(&self, token: &str) -> Result<f64, OracleError> {
        let id = self.mint_for(token).unwrap_or(token).to_string();
        self.fetch(token, &id).await
    }

    #[instrument(skip(self))]
    async fn get_mint_price(&self, token: &str, mint: &str) -> Result<f64, OracleError> {
        if mint.trim().is_empty() {
            return self.get_price(token).await;
        }
        self.fetch(token, mint).await
    }
}

/// Pull a validated price for `id` out of a response body. Errors name
/// `token` so logs show the symbol rather than the address.
fn extract_price(token: &str, id: &str, response: PriceResponse) -> Result<f64, OracleError> {
    let price = response
        .data
        .into_iter()
        .find(|(key, _)| key == id || key.eq_ignore_ascii_case(token))
        .and_then(|(_, entry)| entry)
        .and_then(|entry| entry.price)
        .ok_or_else(|| OracleError::PriceUnavailable {
            token: token.to_string(),
        })?;

    if !validate_price(price) {
        return Err(OracleError::InvalidPrice {
            token: token.to_string(),
            price,
        });
    }
    Ok(price)
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default, deserialize_with = "optional_f64")]
    price: Option<f64>,
}
