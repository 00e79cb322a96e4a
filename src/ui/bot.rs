use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::chart::{self, PriceSeries};
use super::commands::{menu_keyboard, Command, HELP_TEXT};
use super::format;
use crate::api::bybit::{MarketData, TickerRow, TickerSnapshot};
use crate::api::telegram::{ChatSink, TelegramClient};
use crate::error::{BotError, Result};
use crate::market::alerts::{AlertFired, AlertWatch, WatchSet};
use crate::market::ranking::{top_n, Direction, RankField};

const LEADERBOARD_SIZE: usize = 5;
const KLINE_INTERVAL: &str = "1";
const KLINE_TEXT_LIMIT: u32 = 5;
const KLINE_CHART_LIMIT: u32 = 20;
const POLL_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(3);

/// Turns chat commands into market queries and replies. Handles one command
/// at a time; every failure ends up as reply text.
pub struct Dispatcher<M, S> {
    market: Arc<M>,
    sink: Arc<S>,
    watches: WatchSet,
}

impl<M: MarketData, S: ChatSink> Dispatcher<M, S> {
    pub fn new(market: Arc<M>, sink: Arc<S>, watches: WatchSet) -> Self {
        Self {
            market,
            sink,
            watches,
        }
    }

    pub async fn handle(&self, chat_id: i64, text: &str) {
        let command = Command::parse(text);
        debug!("chat {} -> {:?}", chat_id, command);

        let sent = match command {
            Command::Start => self.sink.send_menu(chat_id, HELP_TEXT, &menu_keyboard()).await,
            Command::KlinePhoto(symbols) => {
                let reply = self.kline_photo(chat_id, &symbols).await;
                self.sink.send_text(chat_id, &reply).await
            }
            Command::VolumePhoto => {
                let reply = self
                    .leaderboard_photo(
                        chat_id,
                        RankField::Volume,
                        "Top 5 by volume",
                        "volume_bar.png",
                    )
                    .await;
                self.sink.send_text(chat_id, &reply).await
            }
            Command::SalesPhoto => {
                let reply = self
                    .leaderboard_photo(
                        chat_id,
                        RankField::Turnover,
                        "Top 5 by turnover",
                        "sales_bar.png",
                    )
                    .await;
                self.sink.send_text(chat_id, &reply).await
            }
            other => {
                let reply = self.reply_text(chat_id, other).await;
                self.sink.send_text(chat_id, &reply).await
            }
        };

        if let Err(e) = sent {
            error!("Failed to reply to chat {}: {}", chat_id, e);
        }
    }

    async fn reply_text(&self, chat_id: i64, command: Command) -> String {
        match command {
            Command::Price(Some(symbol)) => self
                .lookup(&symbol)
                .await
                .map(|row| format::price_line(&row))
                .unwrap_or_else(|e| error_text("Failed to get price", e)),
            Command::Price(None) => "Specify a symbol, e.g. /price BTCUSDT".to_string(),
            Command::Change(Some(symbol)) => self
                .lookup(&symbol)
                .await
                .map(|row| format::change_line(&row))
                .unwrap_or_else(|e| error_text("Failed to get 24h change", e)),
            Command::Change(None) => "Specify a symbol, e.g. /change BTCUSDT".to_string(),
            Command::Volume => {
                self.leaderboard(RankField::Volume, Direction::Descending, "Top 5 by volume")
                    .await
            }
            Command::Gainers => {
                self.leaderboard(RankField::Change, Direction::Descending, "Top 5 gainers")
                    .await
            }
            Command::Losers => {
                self.leaderboard(RankField::Change, Direction::Ascending, "Top 5 losers")
                    .await
            }
            Command::Kline(Some(symbol)) => {
                match self
                    .market
                    .fetch_klines(&symbol, KLINE_INTERVAL, KLINE_TEXT_LIMIT)
                    .await
                {
                    Ok(klines) => format::kline_bars(&symbol, &klines),
                    Err(e) => error_text("Failed to get candles", e),
                }
            }
            Command::Kline(None) => "Specify a symbol, e.g. /kline BTCUSDT".to_string(),
            Command::Alert(Some((symbol, target_price))) => {
                self.register_alert(chat_id, symbol, target_price)
            }
            Command::Alert(None) => {
                "Usage: /alert SYMBOL PRICE, e.g. /alert BTCUSDT 70000".to_string()
            }
            Command::Alerts => format::watch_list(&self.watches.list_for(chat_id)),
            Command::Unalert(Some(symbol)) => match self.watches.remove_for(&symbol, chat_id) {
                Some(_) => format!("Alert for {} removed.", symbol),
                None => format!("No alert for {}.", symbol),
            },
            Command::Unalert(None) => "Specify a symbol, e.g. /unalert BTCUSDT".to_string(),
            Command::Unknown => "Unknown command. Send /help for the list.".to_string(),
            Command::Start
            | Command::KlinePhoto(_)
            | Command::VolumePhoto
            | Command::SalesPhoto => HELP_TEXT.to_string(),
        }
    }

    async fn lookup(&self, symbol: &str) -> Result<TickerRow> {
        let snapshot = self.market.fetch_snapshot().await?;
        find_row(&snapshot, symbol)
    }

    async fn leaderboard(&self, field: RankField, direction: Direction, title: &str) -> String {
        match self.market.fetch_snapshot().await {
            Ok(snapshot) => {
                let top = top_n(&snapshot, field, direction, LEADERBOARD_SIZE);
                format::leaderboard(title, field, &top)
            }
            Err(e) => error_text("Failed to get market data", e),
        }
    }

    fn register_alert(&self, chat_id: i64, symbol: String, target_price: f64) -> String {
        let watch = AlertWatch {
            symbol: symbol.clone(),
            target_price,
            chat_id: Some(chat_id),
        };
        info!("Alert registered: {} >= {} for chat {}", symbol, target_price, chat_id);

        match self.watches.insert(watch) {
            Some(previous) => format!(
                "Alert for {} updated: {} -> {}.",
                symbol, previous.target_price, target_price
            ),
            None => format!("Alert set: {} >= {}.", symbol, target_price),
        }
    }

    async fn leaderboard_photo(
        &self,
        chat_id: i64,
        field: RankField,
        caption: &str,
        file_name: &str,
    ) -> String {
        let snapshot = match self.market.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => return error_text("Failed to get market data", e),
        };

        let top = top_n(&snapshot, field, Direction::Descending, LEADERBOARD_SIZE);
        if top.is_empty() {
            return format::NO_DATA.to_string();
        }

        let bars: Vec<(String, f64)> = top.into_iter().map(|e| (e.symbol, e.value)).collect();
        let png = match chart::render_bar_chart(caption, &bars) {
            Ok(png) => png,
            Err(e) => return error_text("Failed to render chart", e),
        };

        match self.sink.send_photo(chat_id, png, file_name, caption).await {
            Ok(()) => "Chart sent!".to_string(),
            Err(e) => error_text("Failed to send photo", e),
        }
    }

    async fn kline_photo(&self, chat_id: i64, symbols: &[String]) -> String {
        if symbols.is_empty() {
            return "Specify comma-separated symbols, e.g. /klinephoto BTCUSDT,ETHUSDT".to_string();
        }

        let mut series = Vec::new();
        let mut failures = Vec::new();

        for symbol in symbols {
            match self
                .market
                .fetch_klines(symbol, KLINE_INTERVAL, KLINE_CHART_LIMIT)
                .await
            {
                Ok(klines) if klines.is_empty() => failures.push(format!("{}: no data", symbol)),
                Ok(klines) => series.push(PriceSeries {
                    name: symbol.clone(),
                    values: klines.iter().map(|k| k.close).collect(),
                }),
                Err(e) => {
                    warn!("Candles for {} failed: {}", symbol, e);
                    failures.push(format!("{}: {}", symbol, e));
                }
            }
        }

        if series.is_empty() {
            return format!("No data for the requested symbols.\n{}", failures.join("\n"));
        }

        let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
        let caption = format!("Price comparison: {}", names.join(", "));

        let png = match chart::render_line_chart(&caption, &series) {
            Ok(png) => png,
            Err(e) => return error_text("Failed to render chart", e),
        };
        if let Err(e) = self.sink.send_photo(chat_id, png, "kline_compare.png", &caption).await {
            return error_text("Failed to send photo", e);
        }

        if failures.is_empty() {
            "Comparison chart sent!".to_string()
        } else {
            format!("Comparison chart sent!\n{}", failures.join("\n"))
        }
    }
}

fn find_row(snapshot: &TickerSnapshot, symbol: &str) -> Result<TickerRow> {
    snapshot
        .find(symbol)
        .cloned()
        .ok_or_else(|| BotError::NotFound(symbol.to_string()))
}

fn error_text(context: &str, e: BotError) -> String {
    match e {
        BotError::NotFound(_) => format::SYMBOL_NOT_FOUND.to_string(),
        other => {
            warn!("{}: {}", context, other);
            format!("{}: {}", context, other)
        }
    }
}

/// Long-polls Telegram and feeds every text message to the dispatcher.
pub async fn run_polling<M: MarketData>(
    telegram: TelegramClient,
    dispatcher: Dispatcher<M, TelegramClient>,
) {
    let mut offset = 0;
    info!("Polling for updates");

    loop {
        let updates = match telegram.get_updates(offset, POLL_TIMEOUT).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("getUpdates failed: {}", e);
                tokio::time::sleep(POLL_ERROR_PAUSE).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let message = match update.message {
                Some(message) => message,
                None => continue,
            };
            if let Some(text) = message.text.as_deref() {
                dispatcher.handle(message.chat.id, text).await;
            }
        }
    }
}

/// Delivers fired alerts to the chat that registered them.
pub async fn run_notifier<S: ChatSink>(sink: Arc<S>, mut events: mpsc::Receiver<AlertFired>) {
    while let Some(event) = events.recv().await {
        let chat_id = match event.watch.chat_id {
            Some(chat_id) => chat_id,
            None => continue,
        };
        let text = format!(
            "Alert: {} reached {} (target {})",
            event.watch.symbol, event.price, event.watch.target_price
        );
        if let Err(e) = sink.send_text(chat_id, &text).await {
            error!("Failed to send alert to chat {}: {}", chat_id, e);
        }
    }
    info!("Alert channel closed, notifier stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::bybit::Kline;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(i64, String),
        Menu(i64, String, usize),
        Photo(i64, String, String),
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn last_text(&self) -> String {
            match self.sent().last() {
                Some(Sent::Text(_, text)) => text.clone(),
                other => panic!("expected text reply, got {:?}", other),
            }
        }
    }

    impl ChatSink for RecordingSink {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Text(chat_id, text.to_string()));
            Ok(())
        }

        async fn send_menu(
            &self,
            chat_id: i64,
            text: &str,
            keyboard: &[Vec<String>],
        ) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Menu(chat_id, text.to_string(), keyboard.len()));
            Ok(())
        }

        async fn send_photo(
            &self,
            chat_id: i64,
            _png: Vec<u8>,
            file_name: &str,
            caption: &str,
        ) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Photo(
                chat_id,
                file_name.to_string(),
                caption.to_string(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMarket {
        rows: Vec<TickerRow>,
        klines: HashMap<String, Vec<Kline>>,
        fail_with: Option<(i64, String)>,
        snapshot_calls: AtomicUsize,
    }

    impl MarketData for FakeMarket {
        async fn fetch_snapshot(&self) -> Result<TickerSnapshot> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            if let Some((code, message)) = &self.fail_with {
                return Err(BotError::Upstream {
                    code: *code,
                    message: message.clone(),
                });
            }
            Ok(TickerSnapshot::new(self.rows.clone()))
        }

        async fn fetch_klines(
            &self,
            symbol: &str,
            _interval: &str,
            limit: u32,
        ) -> Result<Vec<Kline>> {
            match self.klines.get(symbol) {
                Some(klines) => Ok(klines.iter().take(limit as usize).copied().collect()),
                None => Err(BotError::Upstream {
                    code: 10001,
                    message: "Not supported symbols".to_string(),
                }),
            }
        }
    }

    fn row(symbol: &str, price: &str, change: &str, volume: &str) -> TickerRow {
        TickerRow {
            symbol: symbol.to_string(),
            last_price: price.to_string(),
            change_24h: change.to_string(),
            volume_24h: volume.to_string(),
            turnover_24h: String::new(),
        }
    }

    fn market() -> FakeMarket {
        FakeMarket {
            rows: vec![
                row("BTCUSDT", "50000", "0.025", "1000"),
                row("ETHUSDT", "3000", "-0.01", "5000"),
            ],
            ..FakeMarket::default()
        }
    }

    fn dispatcher(
        market: FakeMarket,
        sink: RecordingSink,
    ) -> (Dispatcher<FakeMarket, RecordingSink>, Arc<RecordingSink>, WatchSet) {
        let sink = Arc::new(sink);
        let watches = WatchSet::new();
        (
            Dispatcher::new(Arc::new(market), sink.clone(), watches.clone()),
            sink,
            watches,
        )
    }

    #[tokio::test]
    async fn start_sends_menu() {
        let (dispatcher, sink, _) = dispatcher(market(), RecordingSink::default());
        dispatcher.handle(1, "/start").await;
        assert_eq!(sink.sent(), vec![Sent::Menu(1, HELP_TEXT.to_string(), 3)]);
    }

    #[tokio::test]
    async fn price_and_change_lookup() {
        let (dispatcher, sink, _) = dispatcher(market(), RecordingSink::default());

        dispatcher.handle(1, "/price btcusdt").await;
        assert_eq!(sink.last_text(), "BTCUSDT price: 50000");

        dispatcher.handle(1, "/change ETHUSDT").await;
        assert_eq!(sink.last_text(), "ETHUSDT 24h change: -1.00%");
    }

    #[tokio::test]
    async fn unknown_symbol_is_reported_not_raised() {
        let (dispatcher, sink, _) = dispatcher(market(), RecordingSink::default());
        dispatcher.handle(1, "/price DOGEUSDT").await;
        assert_eq!(sink.last_text(), format::SYMBOL_NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_symbol_gets_usage_without_fetching() {
        let market = Arc::new(market());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(market.clone(), sink.clone(), WatchSet::new());

        dispatcher.handle(1, "/price").await;
        assert!(sink.last_text().starts_with("Specify a symbol"));
        assert_eq!(market.snapshot_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn leaderboards() {
        let (dispatcher, sink, _) = dispatcher(market(), RecordingSink::default());

        dispatcher.handle(1, "/volume").await;
        assert_eq!(sink.last_text(), "Top 5 by volume:\n1. ETHUSDT: 5,000\n2. BTCUSDT: 1,000\n");

        dispatcher.handle(1, "/gainers").await;
        assert_eq!(sink.last_text(), "Top 5 gainers:\n1. BTCUSDT: +2.50%\n2. ETHUSDT: -1.00%\n");

        dispatcher.handle(1, "/losers").await;
        assert_eq!(sink.last_text(), "Top 5 losers:\n1. ETHUSDT: -1.00%\n2. BTCUSDT: +2.50%\n");
    }

    #[tokio::test]
    async fn empty_snapshot_yields_no_data() {
        let (dispatcher, sink, _) = dispatcher(FakeMarket::default(), RecordingSink::default());

        dispatcher.handle(1, "/volume").await;
        assert_eq!(sink.last_text(), format::NO_DATA);

        dispatcher.handle(1, "/volumephoto").await;
        assert_eq!(sink.last_text(), format::NO_DATA);

        dispatcher.handle(1, "/salesphoto").await;
        assert_eq!(sink.last_text(), format::NO_DATA);
    }

    #[tokio::test]
    async fn upstream_error_becomes_reply_text() {
        let failing = FakeMarket {
            fail_with: Some((10001, "rate limited".to_string())),
            ..FakeMarket::default()
        };
        let (dispatcher, sink, _) = dispatcher(failing, RecordingSink::default());

        dispatcher.handle(1, "/gainers").await;
        let reply = sink.last_text();
        assert!(reply.starts_with("Failed to get market data"));
        assert!(reply.contains("rate limited"));
    }

    #[tokio::test]
    async fn kline_text_bars() {
        let mut market = market();
        market.klines.insert(
            "BTCUSDT".to_string(),
            vec![Kline { start_ms: 0, close: 1.0 }],
        );
        let (dispatcher, sink, _) = dispatcher(market, RecordingSink::default());

        dispatcher.handle(1, "/kline BTCUSDT").await;
        assert!(sink.last_text().starts_with("Last 1 candles BTCUSDT (close):"));

        dispatcher.handle(1, "/kline NOPE").await;
        assert!(sink.last_text().contains("Not supported symbols"));
    }

    #[tokio::test]
    async fn kline_photo_reports_every_failed_symbol() {
        let (dispatcher, sink, _) = dispatcher(market(), RecordingSink::default());

        dispatcher.handle(1, "/klinephoto FOOUSDT,BARUSDT").await;
        let reply = sink.last_text();
        assert!(reply.starts_with("No data for the requested symbols."));
        assert!(reply.contains("FOOUSDT"));
        assert!(reply.contains("BARUSDT"));

        dispatcher.handle(1, "/klinephoto").await;
        assert!(sink.last_text().starts_with("Specify comma-separated symbols"));
    }

    #[tokio::test]
    async fn alert_registration_flow() {
        let (dispatcher, sink, watches) = dispatcher(market(), RecordingSink::default());

        dispatcher.handle(9, "/alert btcusdt 60000").await;
        assert_eq!(sink.last_text(), "Alert set: BTCUSDT >= 60000.");
        assert_eq!(watches.list()[0].chat_id, Some(9));

        dispatcher.handle(9, "/alert BTCUSDT 65000").await;
        assert_eq!(sink.last_text(), "Alert for BTCUSDT updated: 60000 -> 65000.");
        assert_eq!(watches.len(), 1);

        dispatcher.handle(9, "/alerts").await;
        assert_eq!(sink.last_text(), "Active alerts:\nBTCUSDT >= 65000\n");

        dispatcher.handle(9, "/unalert BTCUSDT").await;
        assert_eq!(sink.last_text(), "Alert for BTCUSDT removed.");
        assert!(watches.is_empty());

        dispatcher.handle(9, "/alert BTCUSDT").await;
        assert!(sink.last_text().starts_with("Usage: /alert"));
    }

    #[tokio::test]
    async fn other_chats_cannot_see_or_cancel_an_alert() {
        let (dispatcher, sink, watches) = dispatcher(market(), RecordingSink::default());

        dispatcher.handle(9, "/alert BTCUSDT 60000").await;

        dispatcher.handle(4, "/alerts").await;
        assert_eq!(sink.last_text(), "No active alerts.");

        dispatcher.handle(4, "/unalert BTCUSDT").await;
        assert_eq!(sink.last_text(), "No alert for BTCUSDT.");
        assert_eq!(watches.len(), 1);
        assert_eq!(watches.list()[0].chat_id, Some(9));
    }

    #[tokio::test]
    async fn unknown_command_reply() {
        let (dispatcher, sink, _) = dispatcher(market(), RecordingSink::default());
        dispatcher.handle(1, "what is the price?").await;
        assert_eq!(sink.last_text(), "Unknown command. Send /help for the list.");
    }

    #[tokio::test]
    async fn notifier_messages_the_registering_chat() {
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(4);

        tx.send(AlertFired {
            watch: AlertWatch {
                symbol: "BTCUSDT".into(),
                target_price: 60000.0,
                chat_id: Some(3),
            },
            price: 60100.5,
        })
        .await
        .unwrap();
        tx.send(AlertFired {
            watch: AlertWatch {
                symbol: "ETHUSDT".into(),
                target_price: 1.0,
                chat_id: None,
            },
            price: 2.0,
        })
        .await
        .unwrap();
        drop(tx);

        run_notifier(sink.clone(), rx).await;
        assert_eq!(
            sink.sent(),
            vec![Sent::Text(3, "Alert: BTCUSDT reached 60100.5 (target 60000)".to_string())]
        );
    }
}
