use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::api::bybit::BYBIT_API_URL;
use crate::api::telegram::TELEGRAM_API_URL;
use crate::error::{BotError, Result};
use crate::market::alerts::AlertWatch;

const DEFAULT_MIN_INTERVAL_MS: u64 = 2000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ALERT_PERIOD_SECS: u64 = 30;

#[derive(Clone)]
pub struct Config {
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub bybit_api_url: String,
    pub min_request_interval: Duration,
    pub http_timeout: Duration,
    pub alert_period: Duration,
    pub seed_watches: Vec<AlertWatch>,
}

// Keeps the token out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("bybit_api_url", &self.bybit_api_url)
            .field("min_request_interval", &self.min_request_interval)
            .field("http_timeout", &self.http_timeout)
            .field("alert_period", &self.alert_period)
            .field("seed_watches", &self.seed_watches.len())
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_token = get("TELEGRAM_TOKEN").ok_or_else(|| {
            BotError::Config("TELEGRAM_TOKEN is not set; export it or add it to .env".to_string())
        })?;

        let min_interval_ms = parse_or(
            "BYBIT_MIN_INTERVAL_MS",
            get("BYBIT_MIN_INTERVAL_MS"),
            DEFAULT_MIN_INTERVAL_MS,
        )?;
        let http_timeout_secs = parse_or(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        let alert_period_secs = parse_or(
            "ALERT_PERIOD_SECS",
            get("ALERT_PERIOD_SECS"),
            DEFAULT_ALERT_PERIOD_SECS,
        )?;
        if http_timeout_secs == 0 || alert_period_secs == 0 {
            return Err(BotError::Config(
                "HTTP_TIMEOUT_SECS and ALERT_PERIOD_SECS must be positive".to_string(),
            ));
        }

        let seed_watches = match get("ALERT_WATCHES") {
            Some(raw) => parse_watches(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            telegram_token,
            telegram_api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| TELEGRAM_API_URL.to_string()),
            bybit_api_url: get("BYBIT_API_URL").unwrap_or_else(|| BYBIT_API_URL.to_string()),
            min_request_interval: Duration::from_millis(min_interval_ms),
            http_timeout: Duration::from_secs(http_timeout_secs),
            alert_period: Duration::from_secs(alert_period_secs),
            seed_watches,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| BotError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

/// `BTCUSDT:70000,ETHUSDT:4000`. Seeded watches have no chat and are only logged when fired.
fn parse_watches(raw: &str) -> Result<Vec<AlertWatch>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, price) = entry.split_once(':').ok_or_else(|| {
                BotError::Config(format!(
                    "ALERT_WATCHES entry '{}' is not SYMBOL:PRICE",
                    entry
                ))
            })?;
            let target_price = price
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|p| p.is_finite() && *p > 0.0)
                .ok_or_else(|| {
                    BotError::Config(format!("ALERT_WATCHES entry '{}' has a bad price", entry))
                })?;
            Ok(AlertWatch {
                symbol: symbol.trim().to_ascii_uppercase(),
                target_price,
                chat_id: None,
            })
        })
        .collect()
}
