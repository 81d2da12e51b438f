use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::api::ExchangeClient;
use crate::models::{Candle, OrderResult, OrderSide};

/// Simulated spot account marked to the last seen price
///
/// Tracks quote cash and base inventory; fills are instantaneous with no
/// fees or slippage beyond the fill price the caller provides.
#[derive(Debug, Clone)]
pub struct SimulatedAccount {
    cash: f64,
    base_qty: f64,
    last_price: f64,
}

impl SimulatedAccount {
    pub fn new(starting_cash: f64, last_price: f64) -> Self {
        Self {
            cash: starting_cash,
            base_qty: 0.0,
            last_price,
        }
    }

    /// Update the mark price without trading
    pub fn mark(&mut self, price: f64) {
        self.last_price = price;
    }

    /// Settle a fill against the account
    pub fn fill(&mut self, side: OrderSide, size: f64, price: f64) {
        match side {
            OrderSide::Buy => {
                self.cash -= size * price;
                self.base_qty += size;
            }
            OrderSide::Sell => {
                self.cash += size * price;
                self.base_qty -= size;
            }
        }
        self.last_price = price;
    }

    /// Total account value in quote currency at the mark price
    pub fn equity(&self) -> f64 {
        self.cash + self.base_qty * self.last_price
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn base_qty(&self) -> f64 {
        self.base_qty
    }
}

/// Fully synthetic exchange: seeded random-walk candles, instant fills
///
/// Deterministic for a given seed, so tests and dry runs are reproducible.
/// `set_reject_orders` flips every subsequent order to rejected, which is
/// how rollback paths get exercised.
pub struct PaperExchange {
    symbol: String,
    account: SimulatedAccount,
    rng: StdRng,
    price: f64,
    clock: DateTime<Utc>,
    reject_orders: bool,
}

impl PaperExchange {
    pub fn new(
        symbol: impl Into<String>,
        seed: u64,
        start_price: f64,
        starting_cash: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            account: SimulatedAccount::new(starting_cash, start_price),
            rng: StdRng::seed_from_u64(seed),
            price: start_price,
            clock: Utc::now(),
            reject_orders: false,
        }
    }

    pub fn set_reject_orders(&mut self, reject: bool) {
        self.reject_orders = reject;
    }

    pub fn account(&self) -> &SimulatedAccount {
        &self.account
    }

    /// Advance the random walk one step and emit the resulting candle
    fn next_candle(&mut self) -> Candle {
        let open = self.price;
        let change = self.price * self.rng.gen_range(-0.01..0.01);
        let close = (self.price + change).max(open * 0.5);

        let noise_pct = 0.002;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let volume = self.rng.gen_range(500.0..1500.0);

        self.price = close;
        self.clock += Duration::minutes(1);
        self.account.mark(close);

        Candle {
            symbol: self.symbol.clone(),
            timestamp: self.clock,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl ExchangeClient for PaperExchange {
    async fn fetch_latest_candle(&mut self, _symbol: &str, _timeframe: &str) -> Result<Candle> {
        Ok(self.next_candle())
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: f64,
        reference_price: Option<f64>,
    ) -> Result<OrderResult> {
        if self.reject_orders {
            tracing::warn!("{}: paper order rejected (reject toggle on)", symbol);
            return Ok(OrderResult {
                accepted: false,
                order_id: None,
                fill_price: None,
            });
        }

        let fill_price = reference_price.unwrap_or(self.price);
        self.account.fill(side, size, fill_price);

        Ok(OrderResult {
            accepted: true,
            order_id: Some(Uuid::new_v4().to_string()),
            fill_price: Some(fill_price),
        })
    }

    async fn current_equity(&mut self) -> Result<f64> {
        Ok(self.account.equity())
    }
}
