pub mod rest;
pub mod types;

use std::future::Future;

use crate::error::Result;
pub use rest::{BybitClient, BYBIT_API_URL};
pub use types::{Kline, TickerRow, TickerSnapshot};

/// Source of market data for the command dispatcher and the alert engine.
pub trait MarketData: Send + Sync {
    /// Fresh snapshot of every spot ticker; never cached.
    fn fetch_snapshot(&self) -> impl Future<Output = Result<TickerSnapshot>> + Send;

    /// Recent candles for one symbol, oldest first.
    fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Kline>>> + Send;
}
