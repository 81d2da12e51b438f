use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::execution::EngineSettings;
use crate::risk::RiskLimits;

/// Runtime configuration, loaded from an optional file plus `SMABOT_*`
/// environment variables (environment wins).
///
/// Every field has a default, so the bot runs with no config file at all.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,

    #[serde(default = "default_trade_size_pct")]
    pub trade_size_pct: f64,
    #[serde(default = "default_max_trade_usd")]
    pub max_trade_usd: f64,
    #[serde(default = "default_min_trade_usd")]
    pub min_trade_usd: f64,

    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
    #[serde(default = "default_allow_short")]
    pub allow_short: bool,

    #[serde(default = "default_starting_equity")]
    pub starting_equity: f64,
    #[serde(default = "default_trades_csv")]
    pub trades_csv: String,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_timeframe() -> String {
    "1m".to_string()
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_fast_period() -> usize {
    5
}
fn default_slow_period() -> usize {
    20
}
fn default_trade_size_pct() -> f64 {
    0.05
}
fn default_max_trade_usd() -> f64 {
    100.0
}
fn default_min_trade_usd() -> f64 {
    10.0
}
fn default_stop_loss_pct() -> f64 {
    0.02
}
fn default_take_profit_pct() -> f64 {
    0.03
}
fn default_daily_loss_limit_pct() -> f64 {
    0.05
}
fn default_allow_short() -> bool {
    true
}
fn default_starting_equity() -> f64 {
    10000.0
}
fn default_trades_csv() -> String {
    "trades.csv".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            poll_interval_secs: default_poll_interval_secs(),
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            trade_size_pct: default_trade_size_pct(),
            max_trade_usd: default_max_trade_usd(),
            min_trade_usd: default_min_trade_usd(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            allow_short: default_allow_short(),
            starting_equity: default_starting_equity(),
            trades_csv: default_trades_csv(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a file (optional) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("smabot").required(false)),
        };
        builder = builder.add_source(config::Environment::with_prefix("SMABOT"));

        let config: BotConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fast_period == 0 || self.slow_period == 0 {
            anyhow::bail!("SMA periods must be positive");
        }
        if self.fast_period >= self.slow_period {
            anyhow::bail!(
                "fast_period ({}) must be shorter than slow_period ({})",
                self.fast_period,
                self.slow_period
            );
        }
        for (name, value) in [
            ("trade_size_pct", self.trade_size_pct),
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("daily_loss_limit_pct", self.daily_loss_limit_pct),
        ] {
            if !(0.0..1.0).contains(&value) || value == 0.0 {
                anyhow::bail!("{} must be in (0, 1), got {}", name, value);
            }
        }
        if self.min_trade_usd <= 0.0 || self.max_trade_usd < self.min_trade_usd {
            anyhow::bail!(
                "Trade size bounds invalid: min {} max {}",
                self.min_trade_usd,
                self.max_trade_usd
            );
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            fast_period: self.fast_period,
            slow_period: self.slow_period,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            allow_short: self.allow_short,
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            daily_loss_limit_pct: self.daily_loss_limit_pct,
            max_trade_usd: self.max_trade_usd,
            min_trade_usd: self.min_trade_usd,
            trade_size_pct: self.trade_size_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<BotConfig> {
        let config: BotConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.fast_period, 5);
        assert_eq!(config.slow_period, 20);
        assert_eq!(config.trades_csv, "trades.csv");
    }

    #[test]
    fn test_empty_file_falls_back_to_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.max_trade_usd, 100.0);
        assert!(config.allow_short);
    }

    #[test]
    fn test_overrides_apply() {
        let config = from_toml(
            r#"
            symbol = "ETHUSDT"
            fast_period = 9
            slow_period = 21
            allow_short = false
            "#,
        )
        .unwrap();

        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.fast_period, 9);
        assert!(!config.allow_short);
        // Untouched fields keep defaults
        assert_eq!(config.stop_loss_pct, 0.02);
    }

    #[test]
    fn test_fast_must_be_shorter_than_slow() {
        assert!(from_toml("fast_period = 20\nslow_period = 20").is_err());
        assert!(from_toml("fast_period = 30\nslow_period = 20").is_err());
    }

    #[test]
    fn test_percentages_must_be_fractional() {
        assert!(from_toml("stop_loss_pct = 2.0").is_err());
        assert!(from_toml("stop_loss_pct = 0.0").is_err());
        assert!(from_toml("daily_loss_limit_pct = 1.0").is_err());
    }

    #[test]
    fn test_trade_bounds_must_be_ordered() {
        assert!(from_toml("min_trade_usd = 200.0\nmax_trade_usd = 100.0").is_err());
    }

    #[test]
    fn test_settings_projections() {
        let config = BotConfig::default();

        let engine = config.engine_settings();
        assert_eq!(engine.fast_period, 5);
        assert_eq!(engine.stop_loss_pct, 0.02);

        let limits = config.risk_limits();
        assert_eq!(limits.max_trade_usd, 100.0);
        assert_eq!(limits.trade_size_pct, 0.05);
    }
}
