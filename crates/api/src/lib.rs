//! HTTP adapters for external lending and price services.
//!
//! This crate provides one [`lendwatch_protocol::RateSource`] per protocol:
//! - Kamino: reserve metrics per lending market
//! - marginfi: bank rates and asset weights
//! - Solend: reserve rates and config
//!
//! and a Jupiter-backed [`lendwatch_protocol::PriceOracle`].

mod de;
mod http;
mod jupiter;
mod kamino;
mod marginfi;
mod solend;

pub use jupiter::JupiterPriceOracle;
pub use kamino::{KaminoReserve, KaminoSource, KAMINO_MAIN_MARKET};
pub use marginfi::{MarginfiBank, MarginfiSource};
pub use solend::{SolendReserve, SolendSource};
