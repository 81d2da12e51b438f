use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use clap::Parser;

use smabot::api::{BybitClient, ExchangeClient, PaperExchange};
use smabot::config::BotConfig;
use smabot::execution::TradingEngine;
use smabot::recorder::{self, CsvTradeRecorder};
use smabot::risk::{RiskController, RiskState};
use smabot::scheduler;

#[derive(Parser, Debug)]
#[command(name = "smabot", about = "SMA-crossover trading bot")]
struct Args {
    /// Config file (TOML); defaults to smabot.toml if present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trade against the synthetic paper exchange instead of Bybit
    #[arg(long)]
    paper: bool,

    /// Override the configured trading symbol
    #[arg(long)]
    symbol: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let mut config = BotConfig::load(args.config.as_deref())?;
    if let Some(symbol) = args.symbol {
        config.symbol = symbol;
    }

    tracing::info!(
        "smabot starting: {} {} (SMA {}/{}, SL {:.1}%, TP {:.1}%)",
        config.symbol,
        config.timeframe,
        config.fast_period,
        config.slow_period,
        config.stop_loss_pct * 100.0,
        config.take_profit_pct * 100.0
    );

    if args.paper {
        tracing::info!("Paper mode: synthetic market data, no network access");
        let exchange = PaperExchange::new(
            config.symbol.clone(),
            rand::random(),
            100.0,
            config.starting_equity,
        );
        run(config, exchange).await
    } else {
        let exchange = BybitClient::new(config.starting_equity)?;
        run(config, exchange).await
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "smabot=info,smabot::strategy=debug".to_string()),
        )
        .init();
}

async fn run<E: ExchangeClient>(config: BotConfig, mut exchange: E) -> anyhow::Result<()> {
    let equity = exchange.current_equity().await?;
    let risk_state = Arc::new(Mutex::new(RiskState::new(equity, Utc::now().date_naive())));

    let mut engine = TradingEngine::new(
        config.symbol.clone(),
        config.engine_settings(),
        RiskController::new(config.risk_limits()),
        risk_state.clone(),
        exchange,
    );
    let mut recorder = CsvTradeRecorder::open(&config.trades_csv)?;

    let mut ticker = scheduler::poll_interval(config.poll_interval_secs);
    tracing::info!(
        "Polling every {}s (clock-aligned), equity {:.2} USDT, trade log {}",
        config.poll_interval_secs,
        equity,
        config.trades_csv
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = ticker.tick() => {
                match engine.poll_tick(&config.timeframe).await {
                    Ok(events) => {
                        recorder::record_all(&mut recorder, &events);
                        let state = risk_state.lock().unwrap();
                        tracing::info!(
                            "{}: position {:?}, daily pnl {:+.2} USDT{}",
                            config.symbol,
                            engine.position_manager().position().side,
                            state.daily_realized_pnl,
                            if state.trading_halted { " [HALTED]" } else { "" }
                        );
                    }
                    Err(e) => tracing::warn!("Tick failed: {:#}", e),
                }
            }
        }
    }

    Ok(())
}
