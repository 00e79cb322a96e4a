mod api;
mod config;
mod error;
mod market;
mod ui;

use api::bybit::BybitClient;
use api::rate_limit::RateLimiter;
use api::telegram::TelegramClient;
use config::Config;
use env_logger::Builder;
use log::{info, LevelFilter};
use market::alerts::{AlertEngine, WatchSet};
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use ui::bot::{self, Dispatcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // A missing .env is fine, the environment may already be set
    dotenvy::dotenv().ok();

    // Configure logger; RUST_LOG overrides the defaults below
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("bybitwatch", LevelFilter::Debug)
        .parse_default_env()
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env()?;

    info!("Starting bybitwatch...");
    info!("Config: {:?}", config);

    let limiter = Arc::new(RateLimiter::new(config.min_request_interval));
    let market = Arc::new(BybitClient::new(
        config.bybit_api_url.clone(),
        config.http_timeout,
        limiter,
    )?);
    let telegram = TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_token,
        config.http_timeout,
    )?;

    let watches = WatchSet::new();
    for watch in config.seed_watches.iter().cloned() {
        info!("Seeded alert: {} >= {}", watch.symbol, watch.target_price);
        watches.insert(watch);
    }

    // Create channels
    let (alert_tx, alert_rx) = tokio::sync::mpsc::channel(100);

    let alert_handle = tokio::spawn(
        AlertEngine::new(watches.clone(), market.clone(), alert_tx, config.alert_period).run(),
    );

    let notifier_handle = tokio::spawn(bot::run_notifier(Arc::new(telegram.clone()), alert_rx));

    let polling_handle = {
        let dispatcher = Dispatcher::new(market, Arc::new(telegram.clone()), watches);
        tokio::spawn(bot::run_polling(telegram, dispatcher))
    };

    // Wait for tasks to complete (they won't unless there's an error)
    tokio::select! {
        _ = alert_handle => {},
        _ = notifier_handle => {},
        _ = polling_handle => {},
    };

    info!("Shutdown complete");
    Ok(())
}
