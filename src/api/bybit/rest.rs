use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::types::{Envelope, Kline, KlineList, TickerList, TickerSnapshot};
use super::MarketData;
use crate::api::rate_limit::RateLimiter;
use crate::error::{BotError, Result};

pub const BYBIT_API_URL: &str = "https://api.bybit.com";

const TICKERS_PATH: &str = "/v5/market/tickers";
const KLINE_PATH: &str = "/v5/market/kline";
const CATEGORY: &str = "spot";
const BODY_SNIPPET_LEN: usize = 200;

/// Public market-data client. Every request goes through the shared limiter
/// and is attempted exactly once.
#[derive(Clone)]
pub struct BybitClient {
    http: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl BybitClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        decode_response(status, &body).map_err(|e| {
            warn!("Bybit request to {} failed: {}", path, e);
            e
        })
    }
}

impl MarketData for BybitClient {
    async fn fetch_snapshot(&self) -> Result<TickerSnapshot> {
        let tickers: TickerList = self.get(TICKERS_PATH, &[("category", CATEGORY)]).await?;
        let snapshot = TickerSnapshot::new(tickers.into_rows());
        if snapshot.is_empty() {
            warn!("Bybit returned an empty ticker list");
        } else {
            debug!("Snapshot with {} tickers", snapshot.len());
        }
        Ok(snapshot)
    }

    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let limit = limit.to_string();
        let klines: KlineList = self
            .get(
                KLINE_PATH,
                &[
                    ("category", CATEGORY),
                    ("symbol", symbol),
                    ("interval", interval),
                    ("limit", &limit),
                ],
            )
            .await?;

        // Newest first on the wire
        let mut parsed: Vec<Kline> = klines
            .list
            .iter()
            .filter_map(|row| Kline::from_row(row))
            .collect();
        parsed.reverse();
        Ok(parsed)
    }
}

/// Turns a raw response into the `result` payload.
///
/// A Bybit error envelope wins over the HTTP status so its `retMsg` reaches
/// the user; any other non-2xx response is reported by status rather than as
/// a JSON error.
pub(crate) fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<T> {
    let envelope = match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(BotError::Decode(e)),
        Err(_) => return Err(http_status_error(status, body)),
    };

    if envelope.ret_code != 0 {
        return Err(BotError::Upstream {
            code: envelope.ret_code,
            message: envelope.ret_msg,
        });
    }
    if !status.is_success() {
        return Err(http_status_error(status, body));
    }

    let result = envelope
        .result
        .ok_or_else(|| BotError::MalformedPayload("response has no result".to_string()))?;
    Ok(serde_json::from_value(result)?)
}

fn http_status_error(status: StatusCode, body: &[u8]) -> BotError {
    let text = String::from_utf8_lossy(body);
    BotError::HttpStatus {
        status: status.as_u16(),
        body: text.chars().take(BODY_SNIPPET_LEN).collect(),
    }
}
