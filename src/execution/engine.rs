use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::api::ExchangeClient;
use crate::execution::PositionManager;
use crate::indicators::IndicatorEngine;
use crate::models::{Candle, EventKind, OrderSide, Side, SignalKind, TradeEvent};
use crate::risk::{RiskController, RiskState};
use crate::strategy::SignalGenerator;

/// Strategy and position parameters for one instrument
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub fast_period: usize,
    pub slow_period: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub allow_short: bool,
}

/// Per-instrument decision pipeline: indicators -> signal -> risk -> position
///
/// `on_tick` is the single entry point and runs strictly sequentially per
/// instrument. The risk state sits behind a mutex so several engines can
/// share one account-level state with serialized updates; everything else is
/// owned here and never touched concurrently.
pub struct TradingEngine<E: ExchangeClient> {
    symbol: String,
    exchange: E,
    indicators: IndicatorEngine,
    positions: PositionManager,
    signals: SignalGenerator,
    risk: RiskController,
    risk_state: Arc<Mutex<RiskState>>,
    allow_short: bool,
}

impl<E: ExchangeClient> TradingEngine<E> {
    pub fn new(
        symbol: impl Into<String>,
        settings: EngineSettings,
        risk: RiskController,
        risk_state: Arc<Mutex<RiskState>>,
        exchange: E,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            indicators: IndicatorEngine::new(settings.fast_period, settings.slow_period),
            positions: PositionManager::new(
                symbol.clone(),
                settings.stop_loss_pct,
                settings.take_profit_pct,
            ),
            signals: SignalGenerator::new(),
            risk,
            risk_state,
            allow_short: settings.allow_short,
            exchange,
            symbol,
        }
    }

    pub fn position_manager(&self) -> &PositionManager {
        &self.positions
    }

    pub fn exchange_mut(&mut self) -> &mut E {
        &mut self.exchange
    }

    /// Fetch the latest candle and run one evaluation cycle
    pub async fn poll_tick(&mut self, timeframe: &str) -> Result<Vec<TradeEvent>> {
        let candle = self
            .exchange
            .fetch_latest_candle(&self.symbol, timeframe)
            .await
            .context("candle fetch failed")?;
        self.on_tick(&candle).await
    }

    /// Process one candle: the only way state advances
    ///
    /// Sequencing per cycle: day-boundary roll, indicator update (an
    /// out-of-order candle skips the cycle), crossover evaluation,
    /// protective stop/TP check, risk gate, position transition. A breached
    /// stop or target takes priority over a fresh signal and consumes the
    /// whole cycle; the signal's sign still enters the history so the next
    /// candle sees a consistent sequence.
    pub async fn on_tick(&mut self, candle: &Candle) -> Result<Vec<TradeEvent>> {
        let mut events = Vec::new();

        self.maybe_roll_day(candle.timestamp.date_naive()).await;

        let snapshot = match self.indicators.update(candle) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("{}: dropping candle: {}", self.symbol, e);
                return Ok(events);
            }
        };

        // The sign history advances on every candle, even on cycles that a
        // protective exit consumes below.
        let signal_kind = self.signals.update(&snapshot).kind;

        if let Some(kind) = self.positions.protective_exit(candle.close) {
            if let Some(event) = self
                .execute_close(kind, candle.close, candle.timestamp)
                .await?
            {
                events.push(event);
            }
            return Ok(events);
        }

        // With shorting disabled an EnterShort still closes longs, it just
        // never opens new short exposure.
        let signal_kind = if signal_kind == SignalKind::EnterShort && !self.allow_short {
            SignalKind::Exit
        } else {
            signal_kind
        };

        match signal_kind {
            SignalKind::Hold => {}
            SignalKind::Exit => {
                let side = self.positions.position().side;
                if let Some(kind) = close_kind(side) {
                    if let Some(event) = self
                        .execute_close(kind, candle.close, candle.timestamp)
                        .await?
                    {
                        events.push(event);
                    }
                }
            }
            SignalKind::EnterLong => {
                self.handle_entry(Side::Long, candle.close, candle.timestamp, &mut events)
                    .await?;
            }
            SignalKind::EnterShort => {
                self.handle_entry(Side::Short, candle.close, candle.timestamp, &mut events)
                    .await?;
            }
        }

        Ok(events)
    }

    /// Reset daily risk accounting when the candle crosses a UTC date
    async fn maybe_roll_day(&mut self, today: NaiveDate) {
        let needs_roll = self.risk_state.lock().unwrap().day != today;
        if !needs_roll {
            return;
        }

        match self.exchange.current_equity().await {
            Ok(equity) => {
                let mut state = self.risk_state.lock().unwrap();
                self.risk.roll_day(&mut state, today, equity);
            }
            Err(e) => {
                tracing::warn!(
                    "{}: equity fetch failed at day boundary ({}); keeping prior baseline",
                    self.symbol,
                    e
                );
            }
        }
    }

    /// Open new exposure on `side`, reversing an opposite position first
    async fn handle_entry(
        &mut self,
        side: Side,
        price: f64,
        timestamp: DateTime<Utc>,
        events: &mut Vec<TradeEvent>,
    ) -> Result<()> {
        let current = self.positions.position().side;
        if current == side {
            tracing::debug!("{}: already {:?}, entry signal ignored", self.symbol, side);
            return Ok(());
        }

        if current != Side::Flat {
            // Reversal: audit trail requires a close event before the open.
            // Closing is risk reduction and is never gated.
            let kind = close_kind(current).context("reversal close on flat position")?;
            match self.execute_close(kind, price, timestamp).await? {
                Some(event) => events.push(event),
                None => {
                    tracing::warn!(
                        "{}: reversal close rejected, keeping {:?} position",
                        self.symbol,
                        current
                    );
                    return Ok(());
                }
            }
        }

        let equity = match self.exchange.current_equity().await {
            Ok(equity) => equity,
            Err(e) => {
                tracing::warn!("{}: equity fetch failed, skipping entry: {}", self.symbol, e);
                return Ok(());
            }
        };

        let size = self.risk.position_size(equity, price);
        if size <= 0.0 {
            tracing::warn!(
                "{}: insufficient equity ({:.2} USDT) for minimum trade",
                self.symbol,
                equity
            );
            return Ok(());
        }

        {
            let mut state = self.risk_state.lock().unwrap();
            if let Err(denied) = self.risk.authorize(&mut state, size * price) {
                tracing::warn!("{}: entry denied: {}", self.symbol, denied);
                return Ok(());
            }
        }

        // Optimistic transition; rejection restores the pre-trade snapshot.
        let before = self.positions.snapshot();
        let mut event = self.positions.open(side, price, size, timestamp)?;
        let order_side = OrderSide::entering(side).context("entry on flat side")?;

        match self
            .exchange
            .place_order(&self.symbol, order_side, size, Some(price))
            .await
        {
            Ok(order) if order.accepted => {
                let fill = order.fill_price.unwrap_or(price);
                if fill != price {
                    // Re-anchor entry and protective levels to the actual fill
                    self.positions.restore(before);
                    event = self.positions.open(side, fill, size, timestamp)?;
                }
                event.order_id = order.order_id;
                events.push(event);
            }
            Ok(_) => {
                self.positions.restore(before);
                tracing::warn!("{}: entry order rejected, rolled back", self.symbol);
            }
            Err(e) => {
                self.positions.restore(before);
                tracing::warn!("{}: entry order failed ({}), rolled back", self.symbol, e);
            }
        }

        Ok(())
    }

    /// Close the open position, with rollback if the exchange rejects it
    ///
    /// On success the realized pnl is folded into the shared risk state and
    /// the close event is returned.
    async fn execute_close(
        &mut self,
        kind: EventKind,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>> {
        let before = self.positions.snapshot();
        let order_side = OrderSide::closing(before.side).context("close on flat position")?;
        let size = before.size;

        let mut event = self.positions.close(price, kind, timestamp)?;

        match self
            .exchange
            .place_order(&self.symbol, order_side, size, Some(price))
            .await
        {
            Ok(order) if order.accepted => {
                let fill = order.fill_price.unwrap_or(price);
                if fill != price {
                    self.positions.restore(before.clone());
                    event = self.positions.close(fill, kind, timestamp)?;
                }
                event.order_id = order.order_id;

                if let Some(pnl) = event.pnl {
                    self.risk_state.lock().unwrap().apply_realized_pnl(pnl);
                }
                Ok(Some(event))
            }
            Ok(_) => {
                self.positions.restore(before);
                tracing::warn!("{}: close order rejected, position kept", self.symbol);
                Ok(None)
            }
            Err(e) => {
                self.positions.restore(before);
                tracing::warn!("{}: close order failed ({}), position kept", self.symbol, e);
                Ok(None)
            }
        }
    }
}

fn close_kind(side: Side) -> Option<EventKind> {
    match side {
        Side::Long => Some(EventKind::CloseLong),
        Side::Short => Some(EventKind::CloseShort),
        Side::Flat => None,
    }
}
