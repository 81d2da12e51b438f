use chrono::Utc;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

/// Instant of the next wall-clock-aligned poll boundary
///
/// A 60s interval fires at XX:XX:00, so every tick evaluates a freshly
/// closed candle instead of a partial one.
pub fn next_poll_boundary(poll_interval_secs: u64) -> Instant {
    let now = Utc::now().timestamp().max(0) as u64;
    let remainder = now % poll_interval_secs;
    let wait = if remainder == 0 {
        0
    } else {
        poll_interval_secs - remainder
    };

    Instant::now() + Duration::from_secs(wait)
}

/// Clock-aligned ticker for the trading loop
///
/// Missed ticks are skipped, not replayed: if a cycle overruns, stale
/// boundaries are worthless and the loop just waits for the next one.
pub fn poll_interval(poll_interval_secs: u64) -> Interval {
    let mut interval = interval_at(
        next_poll_boundary(poll_interval_secs),
        Duration::from_secs(poll_interval_secs),
    );
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
