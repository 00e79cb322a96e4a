#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Price(Option<String>),
    Change(Option<String>),
    Volume,
    Gainers,
    Losers,
    Kline(Option<String>),
    KlinePhoto(Vec<String>),
    VolumePhoto,
    SalesPhoto,
    Alert(Option<(String, f64)>),
    Alerts,
    Unalert(Option<String>),
    Unknown,
}

impl Command {
    /// Parses a chat message. The first word picks the command (a trailing
    /// `@botname` is ignored), the rest are arguments. Missing or invalid
    /// arguments become `None`/empty so the dispatcher can answer with usage.
    pub fn parse(text: &str) -> Command {
        let mut parts = text.split_whitespace();
        let head = match parts.next() {
            Some(head) => head,
            None => return Command::Unknown,
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        match name.as_str() {
            "/start" | "/help" => Command::Start,
            "/price" => Command::Price(symbol_arg(&args)),
            "/change" => Command::Change(symbol_arg(&args)),
            "/volume" => Command::Volume,
            "/gainers" => Command::Gainers,
            "/losers" => Command::Losers,
            "/kline" => Command::Kline(symbol_arg(&args)),
            "/klinephoto" => Command::KlinePhoto(symbol_list(&args.join(" "))),
            "/volumephoto" => Command::VolumePhoto,
            "/salesphoto" => Command::SalesPhoto,
            "/alert" => Command::Alert(alert_args(&args)),
            "/alerts" => Command::Alerts,
            "/unalert" => Command::Unalert(symbol_arg(&args)),
            _ => Command::Unknown,
        }
    }
}

pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn symbol_arg(args: &[&str]) -> Option<String> {
    args.first().map(|s| normalize_symbol(s)).filter(|s| !s.is_empty())
}

/// `BTCUSDT,ETHUSDT` (spaces around commas allowed), duplicates dropped.
fn symbol_list(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(normalize_symbol) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

fn alert_args(args: &[&str]) -> Option<(String, f64)> {
    match args {
        [symbol, price] => {
            let price = price.parse::<f64>().ok().filter(|p| p.is_finite() && *p > 0.0)?;
            Some((normalize_symbol(symbol), price))
        }
        _ => None,
    }
}

pub fn menu_keyboard() -> Vec<Vec<String>> {
    [
        vec!["/price BTCUSDT", "/change BTCUSDT", "/kline BTCUSDT"],
        vec!["/volume", "/gainers", "/losers"],
        vec!["/klinephoto BTCUSDT,ETHUSDT", "/volumephoto", "/salesphoto"],
    ]
    .iter()
    .map(|row| row.iter().map(|s| s.to_string()).collect())
    .collect()
}

pub const HELP_TEXT: &str = "Welcome! Pick a command below or type your own:

Prices
/price SYMBOL - last price
/change SYMBOL - 24h change

Market
/volume - top 5 pairs by volume
/gainers - top 5 gainers
/losers - top 5 losers

Charts
/kline SYMBOL - last 5 one-minute candles
/klinephoto SYM1,SYM2 - price chart for several pairs
/volumephoto - top 5 by volume chart
/salesphoto - top 5 by turnover chart

Alerts
/alert SYMBOL PRICE - notify when the price reaches PRICE
/alerts - list active alerts
/unalert SYMBOL - cancel an alert";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbol_commands() {
        assert_eq!(Command::parse("/price btcusdt"), Command::Price(Some("BTCUSDT".into())));
        assert_eq!(Command::parse("/change ETHUSDT"), Command::Change(Some("ETHUSDT".into())));
        assert_eq!(Command::parse("/kline  solusdt "), Command::Kline(Some("SOLUSDT".into())));
        assert_eq!(Command::parse("/price"), Command::Price(None));
    }

    #[test]
    fn kline_photo_is_not_confused_with_kline() {
        assert_eq!(
            Command::parse("/klinephoto BTCUSDT, ethusdt,BTCUSDT"),
            Command::KlinePhoto(vec!["BTCUSDT".into(), "ETHUSDT".into()])
        );
        assert_eq!(Command::parse("/klinephoto"), Command::KlinePhoto(vec![]));
        assert_eq!(Command::parse("/klinephoto ,,"), Command::KlinePhoto(vec![]));
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(Command::parse("/volume@watch_bot"), Command::Volume);
        assert_eq!(
            Command::parse("/PRICE@watch_bot btcusdt"),
            Command::Price(Some("BTCUSDT".into()))
        );
    }

    #[test]
    fn parses_alert_arguments() {
        assert_eq!(
            Command::parse("/alert btcusdt 65000.5"),
            Command::Alert(Some(("BTCUSDT".into(), 65000.5)))
        );
        assert_eq!(Command::parse("/alert BTCUSDT"), Command::Alert(None));
        assert_eq!(Command::parse("/alert BTCUSDT cheap"), Command::Alert(None));
        assert_eq!(Command::parse("/alert BTCUSDT -5"), Command::Alert(None));
        assert_eq!(Command::parse("/alert BTCUSDT 1 2"), Command::Alert(None));
        assert_eq!(Command::parse("/alerts"), Command::Alerts);
        assert_eq!(Command::parse("/unalert btcusdt"), Command::Unalert(Some("BTCUSDT".into())));
    }

    #[test]
    fn unknown_input() {
        assert_eq!(Command::parse(""), Command::Unknown);
        assert_eq!(Command::parse("hello"), Command::Unknown);
        assert_eq!(Command::parse("/pricey BTCUSDT"), Command::Unknown);
    }

    #[test]
    fn start_and_help_share_the_menu() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/help"), Command::Start);
        assert_eq!(menu_keyboard().len(), 3);
    }
}
