use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::TradeEvent;

/// Where executed trade events end up
///
/// The engine stays agnostic of the sink; the binary wires up CSV, tests
/// use the in-memory recorder.
pub trait TradeRecorder {
    fn record(&mut self, event: &TradeEvent) -> Result<()>;
}

/// Record a batch of events, logging and skipping any the sink rejects
///
/// The trade log is an audit aid, not a trading dependency: a momentarily
/// unwritable sink must never stop the loop.
pub fn record_all<R: TradeRecorder>(recorder: &mut R, events: &[TradeEvent]) {
    for event in events {
        if let Err(e) = recorder.record(event) {
            tracing::warn!("Failed to record {} event: {:#}", event.kind.as_str(), e);
        }
    }
}

const CSV_HEADER: [&str; 10] = [
    "timestamp",
    "symbol",
    "signal",
    "side",
    "executed_price",
    "executed_size",
    "stop_loss",
    "take_profit",
    "order_id",
    "pnl_usdt",
];

/// Append-only trade log in CSV, one row per event
///
/// Re-opening an existing log appends without duplicating the header, so
/// restarts keep a single continuous audit trail.
pub struct CsvTradeRecorder {
    writer: csv::Writer<std::fs::File>,
}

impl CsvTradeRecorder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let needs_header = match std::fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trade log {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer
                .write_record(CSV_HEADER)
                .context("Failed to write trade log header")?;
            writer.flush().context("Failed to flush trade log")?;
        }

        Ok(Self { writer })
    }
}

impl TradeRecorder for CsvTradeRecorder {
    fn record(&mut self, event: &TradeEvent) -> Result<()> {
        let opt = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

        self.writer
            .write_record([
                event.timestamp.to_rfc3339(),
                event.symbol.clone(),
                event.kind.as_str().to_string(),
                format!("{:?}", event.side).to_lowercase(),
                event.price.to_string(),
                event.size.to_string(),
                opt(event.stop_loss),
                opt(event.take_profit),
                event.order_id.clone().unwrap_or_default(),
                opt(event.pnl),
            ])
            .context("Failed to write trade event")?;
        // Flush per event: the log must survive a crash mid-session
        self.writer.flush().context("Failed to flush trade log")?;
        Ok(())
    }
}

/// Collects events in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Vec<TradeEvent>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TradeEvent] {
        &self.events
    }
}

impl TradeRecorder for MemoryRecorder {
    fn record(&mut self, event: &TradeEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, Side};
    use chrono::Utc;

    fn event(kind: EventKind, pnl: Option<f64>) -> TradeEvent {
        TradeEvent {
            timestamp: Utc::now(),
            symbol: "BTCUSDT".to_string(),
            kind,
            side: Side::Long,
            price: 50000.0,
            size: 0.002,
            pnl,
            pnl_pct: pnl.map(|p| p / 100.0),
            stop_loss: Some(49000.0),
            take_profit: Some(51500.0),
            order_id: Some("order-1".to_string()),
        }
    }

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("trades-{}.csv", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_csv_header_written_once_across_reopens() {
        let path = temp_path();

        {
            let mut recorder = CsvTradeRecorder::open(&path).unwrap();
            recorder.record(&event(EventKind::EnterLong, None)).unwrap();
            recorder
                .record(&event(EventKind::TakeProfit, Some(3.0)))
                .unwrap();
        }
        {
            let mut recorder = CsvTradeRecorder::open(&path).unwrap();
            recorder
                .record(&event(EventKind::EnterShort, None))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("timestamp,symbol,signal,side"));
        assert!(lines[1].contains("enter_long"));
        assert!(lines[2].contains("take_profit"));
        assert!(lines[2].ends_with(",3"));
        assert!(lines[3].contains("enter_short"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_empty_optionals_are_blank_columns() {
        let path = temp_path();

        let mut recorder = CsvTradeRecorder::open(&path).unwrap();
        let mut e = event(EventKind::EnterLong, None);
        e.order_id = None;
        e.stop_loss = None;
        e.take_profit = None;
        recorder.record(&e).unwrap();
        drop(recorder);

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert!(row.ends_with(",,,,"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_record_all_survives_a_failing_sink() {
        // Sink that rejects its first write, then recovers
        struct Flaky {
            failures_left: u32,
            recorded: Vec<TradeEvent>,
        }

        impl TradeRecorder for Flaky {
            fn record(&mut self, event: &TradeEvent) -> Result<()> {
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    anyhow::bail!("disk full");
                }
                self.recorded.push(event.clone());
                Ok(())
            }
        }

        let mut sink = Flaky {
            failures_left: 1,
            recorded: Vec::new(),
        };
        let events = vec![
            event(EventKind::CloseLong, Some(2.0)),
            event(EventKind::EnterShort, None),
        ];

        record_all(&mut sink, &events);

        // The failed event is skipped, the rest still land
        assert_eq!(sink.recorded.len(), 1);
        assert_eq!(sink.recorded[0].kind, EventKind::EnterShort);
    }

    #[test]
    fn test_memory_recorder_collects() {
        let mut recorder = MemoryRecorder::new();
        recorder.record(&event(EventKind::EnterLong, None)).unwrap();
        recorder
            .record(&event(EventKind::StopLoss, Some(-1.0)))
            .unwrap();

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.events()[1].kind, EventKind::StopLoss);
    }
}
