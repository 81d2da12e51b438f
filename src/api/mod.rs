// Exchange connectivity: the abstract client the core consumes, a Bybit
// public-data implementation, and a fully synthetic paper exchange.
pub mod bybit;
pub mod paper;

use anyhow::Result;

use crate::models::{Candle, OrderResult, OrderSide};

pub use bybit::BybitClient;
pub use paper::{PaperExchange, SimulatedAccount};

/// The exchange surface the trading core needs
///
/// Network behavior (timeouts, retries) lives behind this trait; the core
/// only sees an accepted-or-rejected result per order. Completions are
/// awaited inline so they fold back into the sequential evaluation loop.
pub trait ExchangeClient {
    /// Latest closed candle for the symbol at the given timeframe
    fn fetch_latest_candle(
        &mut self,
        symbol: &str,
        timeframe: &str,
    ) -> impl std::future::Future<Output = Result<Candle>> + Send;

    /// Place a market order; `reference_price` is the price the decision was
    /// made at (simulated fills use it, live venues ignore it)
    fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: f64,
        reference_price: Option<f64>,
    ) -> impl std::future::Future<Output = Result<OrderResult>> + Send;

    /// Account equity in quote currency (USDT)
    fn current_equity(&mut self) -> impl std::future::Future<Output = Result<f64>> + Send;
}
