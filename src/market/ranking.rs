use crate::api::bybit::{TickerRow, TickerSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankField {
    Volume,
    Change,
    Turnover,
}

impl RankField {
    fn raw<'a>(&self, row: &'a TickerRow) -> &'a str {
        match self {
            RankField::Volume => &row.volume_24h,
            RankField::Change => &row.change_24h,
            RankField::Turnover => &row.turnover_24h,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Descending,
    Ascending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub symbol: String,
    pub value: f64,
}

/// Parses an exchange decimal string. Blank, malformed and non-finite values
/// yield `None` so callers can drop the row.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Leaderboard of at most `n` rows ordered by `field`.
///
/// Rows whose field does not parse are left out. The sort is stable, so rows
/// with equal values keep their snapshot order.
pub fn top_n(
    snapshot: &TickerSnapshot,
    field: RankField,
    direction: Direction,
    n: usize,
) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = snapshot
        .rows()
        .iter()
        .filter_map(|row| {
            parse_decimal(field.raw(row)).map(|value| RankedEntry {
                symbol: row.symbol.clone(),
                value,
            })
        })
        .collect();

    match direction {
        Direction::Descending => entries.sort_by(|a, b| b.value.total_cmp(&a.value)),
        Direction::Ascending => entries.sort_by(|a, b| a.value.total_cmp(&b.value)),
    }
    entries.truncate(n);
    entries
}
