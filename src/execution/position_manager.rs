use chrono::{DateTime, Utc};

use crate::models::{EventKind, Position, Side, TradeEvent};

/// Owns the single logical position for one instrument
///
/// All transitions go through `open` and `close`, which replace the position
/// atomically and emit the matching `TradeEvent`. `snapshot`/`restore` let
/// the caller roll back an optimistic transition when the exchange rejects
/// the order, so the position never stays half-open.
#[derive(Debug, Clone)]
pub struct PositionManager {
    symbol: String,
    position: Position,
    stop_loss_pct: f64,
    take_profit_pct: f64,
}

impl PositionManager {
    pub fn new(symbol: impl Into<String>, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        Self {
            symbol: symbol.into(),
            position: Position::flat(),
            stop_loss_pct,
            take_profit_pct,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Capture the position before an optimistic transition
    pub fn snapshot(&self) -> Position {
        self.position.clone()
    }

    /// Revert to a pre-transition snapshot (order rejected)
    pub fn restore(&mut self, snapshot: Position) {
        self.position = snapshot;
    }

    /// Check the protective stop-loss / take-profit levels against a price
    ///
    /// Runs on every tick, before any signal-driven transition. When a gap
    /// breaches both levels in the same tick, stop-loss wins: the check is
    /// ordered for capital preservation.
    pub fn protective_exit(&self, price: f64) -> Option<EventKind> {
        match self.position.side {
            Side::Flat => None,
            Side::Long => {
                if price <= self.position.stop_loss {
                    Some(EventKind::StopLoss)
                } else if price >= self.position.take_profit {
                    Some(EventKind::TakeProfit)
                } else {
                    None
                }
            }
            Side::Short => {
                if price >= self.position.stop_loss {
                    Some(EventKind::StopLoss)
                } else if price <= self.position.take_profit {
                    Some(EventKind::TakeProfit)
                } else {
                    None
                }
            }
        }
    }

    /// Open a position at the given fill price
    ///
    /// Stop and target are anchored to the fill: long gets
    /// `px * (1 - sl_pct)` / `px * (1 + tp_pct)`, short the mirror image.
    pub fn open(
        &mut self,
        side: Side,
        fill_price: f64,
        size: f64,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<TradeEvent> {
        if !self.position.is_flat() {
            anyhow::bail!("already have open {:?} position", self.position.side);
        }

        let (stop_loss, take_profit, kind) = match side {
            Side::Long => (
                fill_price * (1.0 - self.stop_loss_pct),
                fill_price * (1.0 + self.take_profit_pct),
                EventKind::EnterLong,
            ),
            Side::Short => (
                fill_price * (1.0 + self.stop_loss_pct),
                fill_price * (1.0 - self.take_profit_pct),
                EventKind::EnterShort,
            ),
            Side::Flat => anyhow::bail!("cannot open a flat position"),
        };

        self.position = Position {
            side,
            entry_price: fill_price,
            size,
            stop_loss,
            take_profit,
            opened_at: Some(timestamp),
        };

        tracing::info!(
            "{} opened {:?} {:.6} @ {:.4} (SL {:.4}, TP {:.4})",
            self.symbol,
            side,
            size,
            fill_price,
            stop_loss,
            take_profit
        );

        Ok(TradeEvent {
            timestamp,
            symbol: self.symbol.clone(),
            kind,
            side,
            price: fill_price,
            size,
            pnl: None,
            pnl_pct: None,
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            order_id: None,
        })
    }

    /// Close the open position at the given fill price and realize its pnl
    ///
    /// `kind` classifies the close (signal exit, stop-loss, take-profit).
    /// The realized pnl rides on the returned event; the caller is
    /// responsible for folding it into the daily risk accounting.
    pub fn close(
        &mut self,
        fill_price: f64,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<TradeEvent> {
        if self.position.is_flat() {
            anyhow::bail!("no open position to close");
        }

        let closed = std::mem::replace(&mut self.position, Position::flat());
        let pnl = (fill_price - closed.entry_price) * closed.size * closed.side.direction();
        let cost_basis = closed.entry_price * closed.size;
        let pnl_pct = if cost_basis > 0.0 {
            pnl / cost_basis
        } else {
            0.0
        };

        tracing::info!(
            "{} closed {:?} {:.6} @ {:.4} ({:?}, pnl {:+.2})",
            self.symbol,
            closed.side,
            closed.size,
            fill_price,
            kind,
            pnl
        );

        Ok(TradeEvent {
            timestamp,
            symbol: self.symbol.clone(),
            kind,
            side: closed.side,
            price: fill_price,
            size: closed.size,
            pnl: Some(pnl),
            pnl_pct: Some(pnl_pct),
            stop_loss: Some(closed.stop_loss),
            take_profit: Some(closed.take_profit),
            order_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PositionManager {
        PositionManager::new("BTCUSDT", 0.02, 0.03)
    }

    #[test]
    fn test_open_long_sets_levels() {
        let mut pm = manager();
        let event = pm.open(Side::Long, 100.0, 1.0, Utc::now()).unwrap();

        assert_eq!(event.kind, EventKind::EnterLong);
        assert_eq!(pm.position().side, Side::Long);
        assert_eq!(pm.position().stop_loss, 98.0);
        assert_eq!(pm.position().take_profit, 103.0);
    }

    #[test]
    fn test_open_short_mirrors_levels() {
        let mut pm = manager();
        pm.open(Side::Short, 100.0, 1.0, Utc::now()).unwrap();

        assert_eq!(pm.position().stop_loss, 102.0);
        assert_eq!(pm.position().take_profit, 97.0);
    }

    #[test]
    fn test_cannot_double_open() {
        let mut pm = manager();
        pm.open(Side::Long, 100.0, 1.0, Utc::now()).unwrap();

        let result = pm.open(Side::Long, 105.0, 1.0, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_cannot_open_flat() {
        let mut pm = manager();
        assert!(pm.open(Side::Flat, 100.0, 1.0, Utc::now()).is_err());
    }

    #[test]
    fn test_close_long_realizes_pnl() {
        let mut pm = manager();
        pm.open(Side::Long, 100.0, 2.0, Utc::now()).unwrap();

        let event = pm.close(110.0, EventKind::TakeProfit, Utc::now()).unwrap();
        assert_eq!(event.pnl, Some(20.0));
        assert_eq!(event.pnl_pct, Some(0.1));
        assert!(pm.position().is_flat());
    }

    #[test]
    fn test_close_short_realizes_pnl() {
        let mut pm = manager();
        pm.open(Side::Short, 100.0, 2.0, Utc::now()).unwrap();

        // Short profits when price falls
        let event = pm.close(95.0, EventKind::CloseShort, Utc::now()).unwrap();
        assert_eq!(event.pnl, Some(10.0));
    }

    #[test]
    fn test_close_flat_fails() {
        let mut pm = manager();
        assert!(pm.close(100.0, EventKind::CloseLong, Utc::now()).is_err());
    }

    #[test]
    fn test_protective_exit_long() {
        let mut pm = manager();
        pm.open(Side::Long, 100.0, 1.0, Utc::now()).unwrap();

        assert_eq!(pm.protective_exit(97.9), Some(EventKind::StopLoss));
        assert_eq!(pm.protective_exit(98.0), Some(EventKind::StopLoss));
        assert_eq!(pm.protective_exit(100.0), None);
        assert_eq!(pm.protective_exit(103.0), Some(EventKind::TakeProfit));
    }

    #[test]
    fn test_protective_exit_short() {
        let mut pm = manager();
        pm.open(Side::Short, 100.0, 1.0, Utc::now()).unwrap();

        assert_eq!(pm.protective_exit(102.0), Some(EventKind::StopLoss));
        assert_eq!(pm.protective_exit(100.0), None);
        assert_eq!(pm.protective_exit(97.0), Some(EventKind::TakeProfit));
    }

    #[test]
    fn test_protective_exit_flat_is_none() {
        let pm = manager();
        assert_eq!(pm.protective_exit(0.0), None);
    }

    #[test]
    fn test_gap_through_both_levels_is_stop_loss() {
        // Degenerate config where one price can breach both levels
        let mut pm = PositionManager::new("BTCUSDT", 0.0, 0.0);
        pm.open(Side::Long, 100.0, 1.0, Utc::now()).unwrap();

        // price == stop_loss == take_profit: stop-loss must win
        assert_eq!(pm.protective_exit(100.0), Some(EventKind::StopLoss));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut pm = manager();
        pm.open(Side::Long, 100.0, 1.0, Utc::now()).unwrap();

        let before = pm.snapshot();
        pm.close(110.0, EventKind::CloseLong, Utc::now()).unwrap();
        assert!(pm.position().is_flat());

        pm.restore(before);
        assert_eq!(pm.position().side, Side::Long);
        assert_eq!(pm.position().entry_price, 100.0);
    }
}
