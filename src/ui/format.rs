use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};

use crate::api::bybit::{Kline, TickerRow};
use crate::market::alerts::AlertWatch;
use crate::market::ranking::{parse_decimal, RankField, RankedEntry};

const BAR_WIDTH: usize = 20;

pub const NO_DATA: &str = "No data available.";
pub const SYMBOL_NOT_FOUND: &str = "Symbol not found.";

pub fn price_line(row: &TickerRow) -> String {
    format!("{} price: {}", row.symbol, row.last_price)
}

/// Bybit reports the 24h change as a ratio (0.025 = 2.5%).
pub fn change_line(row: &TickerRow) -> String {
    match parse_decimal(&row.change_24h) {
        Some(ratio) => format!("{} 24h change: {}", row.symbol, format_percent(ratio)),
        None => format!("{} 24h change: n/a", row.symbol),
    }
}

pub fn format_percent(ratio: f64) -> String {
    format!("{:+.2}%", ratio * 100.0)
}

/// Whole-number amount with thousands separators.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    if rounded.abs() >= u64::MAX as f64 {
        return format!("{:.0}", rounded);
    }
    let digits = (rounded.abs() as u64).to_formatted_string(&Locale::en);
    if rounded < 0.0 {
        format!("-{}", digits)
    } else {
        digits
    }
}

pub fn format_value(field: RankField, value: f64) -> String {
    match field {
        RankField::Change => format_percent(value),
        RankField::Volume | RankField::Turnover => format_amount(value),
    }
}

pub fn leaderboard(title: &str, field: RankField, entries: &[RankedEntry]) -> String {
    if entries.is_empty() {
        return NO_DATA.to_string();
    }

    let mut out = format!("{}:\n", title);
    for (idx, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}: {}\n",
            idx + 1,
            entry.symbol,
            format_value(field, entry.value)
        ));
    }
    out
}

/// Close prices as horizontal bars scaled against the highest close.
pub fn kline_bars(symbol: &str, klines: &[Kline]) -> String {
    if klines.is_empty() {
        return format!("No data for {}.", symbol);
    }

    let max_close = klines.iter().map(|k| k.close).fold(0.0_f64, f64::max);
    let mut out = format!("Last {} candles {} (close):\n", klines.len(), symbol);

    for (idx, kline) in klines.iter().enumerate() {
        let bar_len = if max_close > 0.0 {
            ((kline.close / max_close) * BAR_WIDTH as f64) as usize
        } else {
            0
        };
        let time = DateTime::<Utc>::from_timestamp_millis(kline.start_ms)
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());

        out.push_str(&format!(
            "{}. {} {:>10.2} {}\n",
            idx + 1,
            time,
            kline.close,
            "█".repeat(bar_len.min(BAR_WIDTH))
        ));
    }
    out
}

pub fn watch_list(watches: &[AlertWatch]) -> String {
    if watches.is_empty() {
        return "No active alerts.".to_string();
    }

    let mut out = String::from("Active alerts:\n");
    for watch in watches {
        out.push_str(&format!("{} >= {}\n", watch.symbol, watch.target_price));
    }
    out
}
