use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::market::ranking::parse_decimal;

/// Common v5 response wrapper. `result` is kept raw until `retCode` has been
/// checked, because error responses carry an empty or absent result.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerRow {
    pub symbol: String,
    #[serde(rename = "lastPrice", default)]
    pub last_price: String,
    #[serde(rename = "price24hPcnt", default)]
    pub change_24h: String,
    #[serde(rename = "volume24h", default)]
    pub volume_24h: String,
    #[serde(rename = "turnover24h", default)]
    pub turnover_24h: String,
}

impl TickerRow {
    pub fn last_price(&self) -> Option<f64> {
        parse_decimal(&self.last_price)
    }
}

/// Rows stay raw here so one bad entry can't fail the whole list.
#[derive(Debug, Deserialize)]
pub(crate) struct TickerList {
    #[serde(default)]
    pub list: Vec<Value>,
}

impl TickerList {
    /// Converts every well-formed row, dropping the rest.
    pub fn into_rows(self) -> Vec<TickerRow> {
        self.list
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<TickerRow>(raw) {
                Ok(row) => Some(row),
                Err(e) => {
                    debug!("Dropping malformed ticker row: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// One poll of every spot ticker, in the order the exchange returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerSnapshot {
    rows: Vec<TickerRow>,
}

impl TickerSnapshot {
    pub fn new(rows: Vec<TickerRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TickerRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn find(&self, symbol: &str) -> Option<&TickerRow> {
        self.rows.iter().find(|row| row.symbol == symbol)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct KlineList {
    #[serde(default)]
    pub list: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kline {
    pub start_ms: i64,
    pub close: f64,
}

impl Kline {
    /// Parses a `[startTime, open, high, low, close, volume, turnover]` row.
    /// Bybit sends every field as a string; rows that don't fit are rejected.
    pub(crate) fn from_row(row: &[Value]) -> Option<Self> {
        if row.len() < 5 {
            return None;
        }
        let start_ms = row[0].as_str()?.trim().parse::<i64>().ok()?;
        let close = row[4].as_str().and_then(parse_decimal)?;
        Some(Self { start_ms, close })
    }
}
