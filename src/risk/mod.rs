use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Risk limits gating new exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub daily_loss_limit_pct: f64,
    pub max_trade_usd: f64,
    pub min_trade_usd: f64,
    pub trade_size_pct: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_limit_pct: 0.05, // -5% daily kill-switch
            max_trade_usd: 100.0,
            min_trade_usd: 10.0,
            trade_size_pct: 0.05, // 5% of equity per entry
        }
    }
}

/// Per-day realized P&L accounting
///
/// `trading_halted` latches once the daily loss limit is breached and only
/// clears at the UTC day boundary.
#[derive(Debug, Clone)]
pub struct RiskState {
    pub starting_equity: f64,
    pub daily_realized_pnl: f64,
    pub day: NaiveDate,
    pub trading_halted: bool,
}

impl RiskState {
    pub fn new(starting_equity: f64, day: NaiveDate) -> Self {
        Self {
            starting_equity,
            daily_realized_pnl: 0.0,
            day,
            trading_halted: false,
        }
    }

    /// Fold a realized pnl from a closed trade into the daily total
    pub fn apply_realized_pnl(&mut self, pnl: f64) {
        self.daily_realized_pnl += pnl;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EntryDenied {
    #[error("trading halted for the day")]
    TradingHalted,
    #[error("daily loss limit breached")]
    DailyLossLimit,
    #[error("trade notional exceeds max_trade_usd")]
    TradeTooLarge,
}

/// Gates new entries against the daily loss limit and trade-size cap
///
/// Exits and protective stop/take-profit closes are never gated: limits
/// block new exposure, not risk reduction.
#[derive(Debug, Clone, Default)]
pub struct RiskController {
    limits: RiskLimits,
}

impl RiskController {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Authorize one new entry with the given notional value in USD
    ///
    /// Breaching the daily loss limit latches `trading_halted`; the latch
    /// survives for the rest of the day even if pnl later recovers.
    pub fn authorize(&self, state: &mut RiskState, notional_usd: f64) -> Result<(), EntryDenied> {
        if state.trading_halted {
            return Err(EntryDenied::TradingHalted);
        }

        let loss_ratio = state.daily_realized_pnl / state.starting_equity.max(f64::EPSILON);
        if loss_ratio <= -self.limits.daily_loss_limit_pct {
            tracing::error!(
                "Kill-switch activated: daily pnl {:.2}% <= limit -{:.2}%",
                loss_ratio * 100.0,
                self.limits.daily_loss_limit_pct * 100.0
            );
            state.trading_halted = true;
            return Err(EntryDenied::DailyLossLimit);
        }

        if notional_usd > self.limits.max_trade_usd {
            return Err(EntryDenied::TradeTooLarge);
        }

        Ok(())
    }

    /// Size one entry from current equity: a fixed fraction of equity,
    /// clamped to [min_trade_usd, max_trade_usd], converted to base units.
    ///
    /// Returns 0.0 when even the minimum trade cannot be funded. Pure
    /// function of its inputs; no hidden state.
    pub fn position_size(&self, equity_usd: f64, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }

        let desired = equity_usd * self.limits.trade_size_pct;
        let notional = desired
            .min(self.limits.max_trade_usd)
            .min(equity_usd)
            .max(self.limits.min_trade_usd);

        if notional > equity_usd {
            return 0.0;
        }

        notional / price
    }

    /// Reset the daily accounting at a UTC date boundary
    ///
    /// Re-baselines starting equity and clears the halt latch.
    pub fn roll_day(&self, state: &mut RiskState, today: NaiveDate, equity_usd: f64) {
        if today == state.day {
            return;
        }

        tracing::info!(
            "New trading day {}: start equity {:.2} USDT (was {:.2}, pnl {:+.2})",
            today,
            equity_usd,
            state.starting_equity,
            state.daily_realized_pnl
        );

        state.day = today;
        state.starting_equity = equity_usd;
        state.daily_realized_pnl = 0.0;
        state.trading_halted = false;
    }
}
