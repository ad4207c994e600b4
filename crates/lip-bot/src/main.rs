//! LIP market-making agent entry point.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use lip_bot::{AppConfig, Application, RunMode};
use lip_core::{Price, Ticker};
use lip_exchange::{BookLevel, BookSnapshot, Candle, ExchangeClient, MarketInfo, SimExchange};

/// LIP market-making agent for binary-outcome markets.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (also settable via LIP_CONFIG).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    lip_telemetry::init_logging()?;
    info!("Starting lip-bot v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.config {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::load()?,
    };
    info!(mode = ?config.mode, dt = config.dt, "Configuration loaded");

    let client: Arc<dyn ExchangeClient> = match config.mode {
        RunMode::Paper => paper_exchange(),
        RunMode::Live => {
            anyhow::bail!("live transport is provided by the deployment; this build runs paper mode")
        }
    };

    let app = Application::new(config, client);
    app.run().await?;

    Ok(())
}

/// Seed the simulated venue with a few demo markets so paper mode has
/// something to quote.
fn paper_exchange() -> Arc<SimExchange> {
    let sim = Arc::new(SimExchange::new());
    let now = Utc::now().timestamp();

    for (name, bid, ask, target, days_out) in [
        ("DEMO-ALPHA", 44, 56, 100, 3),
        ("DEMO-BRAVO", 30, 36, 150, 7),
        ("DEMO-CHARLIE", 62, 66, 80, 2),
    ] {
        let ticker = Ticker::from(name);
        let info = MarketInfo {
            ticker: ticker.clone(),
            close_ts: now + days_out * 86_400,
            lip_target: target,
            yes_bid: Some(Price::from_cents(bid)),
            no_bid: Some(Price::from_cents(100 - ask)),
            toxic: false,
        };
        let book = BookSnapshot {
            yes_bids: vec![
                BookLevel {
                    price: Price::from_cents(bid),
                    count: target / 2,
                },
                BookLevel {
                    price: Price::from_cents(bid - 1),
                    count: target * 2,
                },
            ],
            no_bids: vec![
                BookLevel {
                    price: Price::from_cents(100 - ask),
                    count: target / 2,
                },
                BookLevel {
                    price: Price::from_cents(100 - ask - 1),
                    count: target * 2,
                },
            ],
        };
        sim.add_market(info, book);

        // Two days of gently wiggling 5-minute candles.
        let mid = (bid + ask) / 2;
        let candles: Vec<Candle> = (0..576i64)
            .map(|i| {
                let cents = if i % 2 == 0 { mid } else { mid + 1 };
                let p = Price::from_cents(cents);
                Candle {
                    open: p,
                    high: p,
                    low: p,
                    close: p,
                    ts: now - 172_800 + i * 300,
                }
            })
            .collect();
        sim.set_candles(&ticker, candles);
    }

    sim
}
