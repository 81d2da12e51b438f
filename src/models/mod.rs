use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick data for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Which side of the market a position (or order) is on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
    Flat,
}

impl Side {
    /// P&L direction multiplier: +1 for long, -1 for short, 0 when flat
    pub fn direction(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
            Side::Flat => 0.0,
        }
    }
}

/// Order direction as the exchange sees it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The order that opens a position on `side`
    pub fn entering(side: Side) -> Option<Self> {
        match side {
            Side::Long => Some(OrderSide::Buy),
            Side::Short => Some(OrderSide::Sell),
            Side::Flat => None,
        }
    }

    /// The order that closes a position on `side`
    pub fn closing(side: Side) -> Option<Self> {
        match side {
            Side::Long => Some(OrderSide::Sell),
            Side::Short => Some(OrderSide::Buy),
            Side::Flat => None,
        }
    }
}

/// Directional signal produced by the crossover strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    Exit,
    Hold,
}

/// A signal together with the indicator values that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
    pub fast_sma: Option<f64>,
    pub slow_sma: Option<f64>,
    pub price: f64,
}

/// The single logical position for one instrument
///
/// `Side::Flat` with zero size is the resting state, not absence. The struct
/// is replaced atomically on open/close and never partially mutated from
/// outside `PositionManager`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            side: Side::Flat,
            entry_price: 0.0,
            size: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            opened_at: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == Side::Flat
    }
}

/// What kind of transition a trade event records
///
/// These are the values written to the `signal` column of the trades CSV.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EnterLong,
    EnterShort,
    CloseLong,
    CloseShort,
    StopLoss,
    TakeProfit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EnterLong => "enter_long",
            EventKind::EnterShort => "enter_short",
            EventKind::CloseLong => "close_long",
            EventKind::CloseShort => "close_short",
            EventKind::StopLoss => "stop_loss",
            EventKind::TakeProfit => "take_profit",
        }
    }

    /// True for events that close out exposure (pnl is realized)
    pub fn is_close(&self) -> bool {
        !matches!(self, EventKind::EnterLong | EventKind::EnterShort)
    }
}

/// Immutable record of one executed transition, appended to the trade log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub kind: EventKind,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub order_id: Option<String>,
}

/// Outcome of an order placement at the exchange
///
/// A rejected order means "no state change" for the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub accepted: bool,
    pub order_id: Option<String>,
    pub fill_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_flat_position() {
        let position = Position::flat();
        assert!(position.is_flat());
        assert_eq!(position.size, 0.0);
        assert_eq!(position.side.direction(), 0.0);
    }

    #[test]
    fn test_side_direction() {
        assert_eq!(Side::Long.direction(), 1.0);
        assert_eq!(Side::Short.direction(), -1.0);
    }

    #[test]
    fn test_event_kind_classification() {
        assert!(!EventKind::EnterLong.is_close());
        assert!(!EventKind::EnterShort.is_close());
        assert!(EventKind::StopLoss.is_close());
        assert!(EventKind::TakeProfit.is_close());
        assert!(EventKind::CloseLong.is_close());
    }

    #[test]
    fn test_trade_event_serializes() {
        let event = TradeEvent {
            timestamp: Utc::now(),
            symbol: "BTCUSDT".to_string(),
            kind: EventKind::EnterLong,
            side: Side::Long,
            price: 50000.0,
            size: 0.002,
            pnl: None,
            pnl_pct: None,
            stop_loss: Some(49000.0),
            take_profit: Some(51500.0),
            order_id: Some("abc".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("enter_long"));
    }
}
