use crate::indicators::IndicatorSnapshot;
use crate::models::{Signal, SignalKind};

/// Detects SMA crossovers from the stream of indicator snapshots
///
/// The crossover is a sign change of (fast - slow): negative to positive
/// produces EnterLong, positive to negative produces EnterShort. A snapshot
/// with an undefined SMA always yields Hold, because insufficient data is
/// never actionable.
///
/// Tie-break: a zero diff is not a sign, it propagates the last nonzero
/// sign forward. When fast and slow touch exactly and then separate in the
/// same direction they came from, no signal fires; only an actual flip
/// through (or across) equality counts. This keeps the generator from
/// oscillating on exact equality and makes the behavior deterministic for
/// a given diff sequence.
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    last_sign: Option<i8>,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one snapshot into the sign history and emit the signal for it
    pub fn update(&mut self, snapshot: &IndicatorSnapshot) -> Signal {
        let (kind, next_sign) = evaluate(self.last_sign, diff(snapshot));
        self.last_sign = next_sign;

        if kind != SignalKind::Hold {
            tracing::debug!(
                "Crossover at {}: fast={:?} slow={:?} -> {:?}",
                snapshot.timestamp,
                snapshot.fast_sma,
                snapshot.slow_sma,
                kind
            );
        }

        Signal {
            kind,
            timestamp: snapshot.timestamp,
            fast_sma: snapshot.fast_sma,
            slow_sma: snapshot.slow_sma,
            price: snapshot.close,
        }
    }
}

fn diff(snapshot: &IndicatorSnapshot) -> Option<f64> {
    Some(snapshot.fast_sma? - snapshot.slow_sma?)
}

/// Pure crossover decision: maps (prior effective sign, current diff) to a
/// signal and the next effective sign. Same inputs always give the same
/// answer; all history lives in the caller.
fn evaluate(last_sign: Option<i8>, diff: Option<f64>) -> (SignalKind, Option<i8>) {
    let Some(d) = diff else {
        return (SignalKind::Hold, last_sign);
    };

    let sign = if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        // Tie: carry the previous sign forward
        return (SignalKind::Hold, last_sign);
    };

    let kind = match last_sign {
        Some(prev) if prev < 0 && sign > 0 => SignalKind::EnterLong,
        Some(prev) if prev > 0 && sign < 0 => SignalKind::EnterShort,
        _ => SignalKind::Hold,
    };

    (kind, Some(sign))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(fast: Option<f64>, slow: Option<f64>, close: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            timestamp: Utc::now(),
            close,
            fast_sma: fast,
            slow_sma: slow,
        }
    }

    fn kinds(generator: &mut SignalGenerator, diffs: &[f64]) -> Vec<SignalKind> {
        diffs
            .iter()
            .map(|d| {
                generator
                    .update(&snapshot(Some(10.0 + d), Some(10.0), 100.0))
                    .kind
            })
            .collect()
    }

    #[test]
    fn test_bullish_crossover() {
        let mut generator = SignalGenerator::new();

        generator.update(&snapshot(Some(9.0), Some(10.0), 100.0));
        let signal = generator.update(&snapshot(Some(11.0), Some(10.0), 101.0));

        assert_eq!(signal.kind, SignalKind::EnterLong);
        assert_eq!(signal.price, 101.0);
        assert_eq!(signal.fast_sma, Some(11.0));
    }

    #[test]
    fn test_bearish_crossover() {
        let mut generator = SignalGenerator::new();

        generator.update(&snapshot(Some(11.0), Some(10.0), 100.0));
        let signal = generator.update(&snapshot(Some(9.0), Some(10.0), 99.0));

        assert_eq!(signal.kind, SignalKind::EnterShort);
    }

    #[test]
    fn test_no_sign_change_holds() {
        let mut generator = SignalGenerator::new();
        assert_eq!(
            kinds(&mut generator, &[1.0, 2.0, 0.5]),
            vec![SignalKind::Hold, SignalKind::Hold, SignalKind::Hold]
        );
    }

    #[test]
    fn test_undefined_sma_holds_and_preserves_sign() {
        let mut generator = SignalGenerator::new();

        generator.update(&snapshot(Some(9.0), Some(10.0), 100.0));
        assert_eq!(
            generator.update(&snapshot(None, Some(10.0), 100.0)).kind,
            SignalKind::Hold
        );

        // Sign history survives the gap
        let signal = generator.update(&snapshot(Some(11.0), Some(10.0), 101.0));
        assert_eq!(signal.kind, SignalKind::EnterLong);
    }

    #[test]
    fn test_first_defined_diff_is_never_a_signal() {
        let mut generator = SignalGenerator::new();
        let signal = generator.update(&snapshot(Some(11.0), Some(10.0), 100.0));
        assert_eq!(signal.kind, SignalKind::Hold);
    }

    #[test]
    fn test_tie_propagates_prior_sign() {
        let mut generator = SignalGenerator::new();

        // negative, tie, positive: the tie carries the negative sign
        // forward, so the flip is still detected when it completes
        assert_eq!(
            kinds(&mut generator, &[-1.0, 0.0, 1.0]),
            vec![SignalKind::Hold, SignalKind::Hold, SignalKind::EnterLong]
        );
    }

    #[test]
    fn test_touch_and_retreat_is_not_a_crossover() {
        let mut generator = SignalGenerator::new();

        // fast touches slow exactly and falls back: no signal anywhere
        assert_eq!(
            kinds(&mut generator, &[-1.0, 0.0, -1.0]),
            vec![SignalKind::Hold; 3]
        );
    }

    #[test]
    fn test_leading_tie_then_positive_is_not_a_signal() {
        let mut generator = SignalGenerator::new();
        assert_eq!(
            kinds(&mut generator, &[0.0, 1.0]),
            vec![SignalKind::Hold, SignalKind::Hold]
        );
    }

    #[test]
    fn test_evaluate_is_pure() {
        let first = evaluate(Some(-1), Some(0.5));
        let second = evaluate(Some(-1), Some(0.5));

        assert_eq!(first, second);
        assert_eq!(first, (SignalKind::EnterLong, Some(1)));
    }

    #[test]
    fn test_exactly_one_entry_across_flip() {
        let mut generator = SignalGenerator::new();
        assert_eq!(
            kinds(&mut generator, &[-1.0, -1.0, 1.0, 2.0, -0.5]),
            vec![
                SignalKind::Hold,
                SignalKind::Hold,
                SignalKind::EnterLong,
                SignalKind::Hold,
                SignalKind::EnterShort,
            ]
        );
    }
}
