use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::models::Candle;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IndicatorError {
    #[error("out-of-order candle: last seen {last}, got {got}")]
    OutOfOrderCandle {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// Indicator values at one evaluation point
///
/// SMAs are `None` until the corresponding window is full. `None` means
/// "insufficient data" and must never be read as a crossover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub fast_sma: Option<f64>,
    pub slow_sma: Option<f64>,
}

/// Fixed-capacity ring of closing prices with a running sum
#[derive(Debug, Clone)]
struct SmaWindow {
    period: usize,
    closes: VecDeque<f64>,
    sum: f64,
}

impl SmaWindow {
    fn new(period: usize) -> Self {
        Self {
            period,
            closes: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    fn push(&mut self, close: f64) {
        self.closes.push_back(close);
        self.sum += close;

        while self.closes.len() > self.period {
            if let Some(evicted) = self.closes.pop_front() {
                self.sum -= evicted;
            }
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.closes.len() < self.period {
            return None;
        }
        Some(self.sum / self.period as f64)
    }
}

/// Maintains fast/slow SMA windows incrementally as candles arrive
///
/// Candles must arrive with non-decreasing timestamps; a regression is
/// rejected and leaves the prior state untouched.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    fast: SmaWindow,
    slow: SmaWindow,
    last_timestamp: Option<DateTime<Utc>>,
}

impl IndicatorEngine {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast: SmaWindow::new(fast_period),
            slow: SmaWindow::new(slow_period),
            last_timestamp: None,
        }
    }

    /// Fold one candle into both windows and report the current SMA pair
    pub fn update(&mut self, candle: &Candle) -> Result<IndicatorSnapshot, IndicatorError> {
        if let Some(last) = self.last_timestamp {
            if candle.timestamp < last {
                return Err(IndicatorError::OutOfOrderCandle {
                    last,
                    got: candle.timestamp,
                });
            }
        }

        self.fast.push(candle.close);
        self.slow.push(candle.close);
        self.last_timestamp = Some(candle.timestamp);

        Ok(IndicatorSnapshot {
            timestamp: candle.timestamp,
            close: candle.close,
            fast_sma: self.fast.mean(),
            slow_sma: self.slow.mean(),
        })
    }
}
