use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{ExchangeClient, SimulatedAccount};
use crate::models::{Candle, OrderResult, OrderSide};

const BYBIT_API_BASE: &str = "https://api.bybit.com";
const RATE_LIMIT_RPM: u32 = 60; // Public market data endpoints
const MAX_RETRIES: u32 = 3;

// Type alias for the rate limiter to simplify signatures
type BybitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Bybit market-data client with simulated execution
///
/// Candles come from the live v5 public kline endpoint (no authentication);
/// orders settle against an internal `SimulatedAccount` at the decision
/// price. That gives paper trading over real market data without holding
/// signing keys.
pub struct BybitClient {
    client: Client,
    base_url: String,
    category: String,
    rate_limiter: Arc<BybitRateLimiter>,
    account: SimulatedAccount,
}

/// Envelope every v5 response uses
#[derive(Debug, Deserialize)]
struct KlineResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: KlineResult,
}

/// Kline rows, newest first: [startTime, open, high, low, close, volume, turnover]
#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

impl BybitClient {
    pub fn new(starting_cash: f64) -> Result<Self> {
        Self::with_base_url(BYBIT_API_BASE.to_string(), starting_cash)
    }

    /// Point the client at a different host (testnet, mock server)
    pub fn with_base_url(base_url: String, starting_cash: f64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url,
            category: "spot".to_string(),
            rate_limiter,
            account: SimulatedAccount::new(starting_cash, 0.0),
        })
    }

    pub fn account(&self) -> &SimulatedAccount {
        &self.account
    }

    /// Make a rate-limited API request with retry logic
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Bybit returned {}, backing off for {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    // Other errors (4xx) - don't retry
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Bybit API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    async fn fetch_klines(&self, symbol: &str, timeframe: &str, limit: u32) -> Result<Vec<Candle>> {
        let interval = map_interval(timeframe)?;
        let url = format!(
            "{}/v5/market/kline?category={}&symbol={}&interval={}&limit={}",
            self.base_url, self.category, symbol, interval, limit
        );

        let response = self.make_request(&url).await?;
        let body: KlineResponse = response.json().await.context("Failed to parse klines")?;

        if body.ret_code != 0 {
            anyhow::bail!("Bybit kline error {}: {}", body.ret_code, body.ret_msg);
        }

        body.result
            .list
            .iter()
            .map(|row| parse_kline_row(symbol, row))
            .collect()
    }
}

impl ExchangeClient for BybitClient {
    /// Latest closed candle: Bybit lists newest first and index 0 is the
    /// still-forming bar, so the answer is the second row.
    async fn fetch_latest_candle(&mut self, symbol: &str, timeframe: &str) -> Result<Candle> {
        let candles = self.fetch_klines(symbol, timeframe, 2).await?;
        let closed = candles
            .into_iter()
            .nth(1)
            .context("Bybit returned fewer than 2 klines")?;

        self.account.mark(closed.close);
        Ok(closed)
    }

    async fn place_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: f64,
        reference_price: Option<f64>,
    ) -> Result<OrderResult> {
        let fill_price = reference_price.context("simulated fill needs a reference price")?;
        self.account.fill(side, size, fill_price);

        tracing::info!(
            "{}: simulated {:?} {:.6} @ {:.4} against live market data",
            symbol,
            side,
            size,
            fill_price
        );

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

/// Map a human timeframe to Bybit's v5 interval codes
fn map_interval(timeframe: &str) -> Result<&'static str> {
    let interval = match timeframe {
        "1m" => "1",
        "3m" => "3",
        "5m" => "5",
        "15m" => "15",
        "30m" => "30",
        "1h" => "60",
        "2h" => "120",
        "4h" => "240",
        "6h" => "360",
        "12h" => "720",
        "1d" => "D",
        other => anyhow::bail!("Unsupported timeframe: {}", other),
    };
    Ok(interval)
}

fn parse_kline_row(symbol: &str, row: &[String]) -> Result<Candle> {
    if row.len() < 6 {
        anyhow::bail!("Malformed kline row: expected 6+ fields, got {}", row.len());
    }

    let field = |i: usize, name: &str| -> Result<f64> {
        row[i]
            .parse::<f64>()
            .with_context(|| format!("Invalid kline {}: {}", name, row[i]))
    };

    let start_ms = row[0]
        .parse::<i64>()
        .with_context(|| format!("Invalid kline timestamp: {}", row[0]))?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(start_ms)
        .with_context(|| format!("Kline timestamp out of range: {}", start_ms))?;

    Ok(Candle {
        symbol: symbol.to_string(),
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}
