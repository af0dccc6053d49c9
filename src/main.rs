//! Lendwatch rate monitor
//!
//! Polls every configured lending protocol, logs the best supply and borrow
//! rate per token, and optionally quotes a leveraged position each cycle.
//!
//! Environment:
//! - `LENDWATCH_PROFILE` / `LENDWATCH_CONFIG` / `LENDWATCH_NETWORK`: see [`EngineConfig::from_env`]
//! - `LENDWATCH_QUOTE`: JSON position request quoted every cycle, e.g.
//!   `{"collateralToken":"SOL","collateralAmount":10,"borrowToken":"USDC","leverage":2}`

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lendwatch_core::{
    AggregatedRates, Engine, EngineConfig, MemoryCache, PositionQuoteParams, RateCache,
};

/// Environment variable names.
mod env {
    pub const QUOTE: &str = "LENDWATCH_QUOTE";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lendwatch_core=debug,lendwatch_api=debug")),
        )
        .init();

    let config = EngineConfig::from_env()?;
    config.log_config();

    let quote_params = load_quote_params(&config)?;

    let memory = Arc::new(MemoryCache::new());
    let engine = Engine::from_config_with_cache(&config, RateCache::new(memory.clone()))?;
    info!(protocols = ?engine.aggregator.protocols(), "Starting Lendwatch monitor");

    let mut interval = tokio::time::interval(config.poll_interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }

        let purged = memory.purge_expired();
        if purged > 0 {
            info!(purged, remaining = memory.len(), "Purged expired cache entries");
        }

        match engine.aggregator.get_all_rates(config.network).await {
            Ok(rates) => log_best_rates(&rates),
            Err(e) => warn!(error = %e, "Rate aggregation failed"),
        }

        if let Some(params) = &quote_params {
            run_quote(&engine, params).await;
        }
    }

    Ok(())
}

/// Parse the optional position request from the environment.
fn load_quote_params(config: &EngineConfig) -> Result<Option<PositionQuoteParams>> {
    let Ok(raw) = std::env::var(env::QUOTE) else {
        return Ok(None);
    };

    let mut value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("invalid {}", env::QUOTE))?;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("network")
            .or_insert_with(|| serde_json::Value::String(config.network.to_string()));
    }

    let params: PositionQuoteParams =
        serde_json::from_value(value).with_context(|| format!("invalid {}", env::QUOTE))?;
    params.validate()?;
    Ok(Some(params))
}

fn log_best_rates(rates: &AggregatedRates) {
    info!(
        network = %rates.network,
        protocols = rates.protocols.len(),
        tvl = rates.total_tvl(),
        "Rates updated"
    );

    for (token, supply) in &rates.best_supply_rates {
        let borrow = rates.best_borrow_rates.get(token);
        info!(
            token = %token,
            supply_protocol = %supply.protocol,
            supply_apy = supply.rate,
            borrow_protocol = borrow.map(|b| b.protocol.as_str()).unwrap_or("-"),
            borrow_apy = borrow.map(|b| b.rate).unwrap_or(f64::NAN),
            "Best rates"
        );
    }
}

async fn run_quote(engine: &Engine, params: &PositionQuoteParams) {
    let quotes = match engine.quotes.get_position_quotes(params).await {
        Ok(quotes) => quotes,
        Err(e) => {
            warn!(error = %e, "Position quote failed");
            return;
        }
    };

    if quotes.is_empty() {
        info!(leverage = params.leverage, "No protocol can open this position");
        return;
    }

    for quote in &quotes {
        info!(
            protocol = %quote.protocol,
            borrow_amount = quote.borrow.amount,
            borrow_apy = quote.borrow_apy,
            net_apy = quote.net_apy,
            health_factor = quote.health_factor,
            liquidation_price = quote.liquidation_price,
            recommended = quote.is_recommended,
            "Position quote"
        );
    }
}
