use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::bybit::{MarketData, TickerSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct AlertWatch {
    pub symbol: String,
    pub target_price: f64,
    /// Chat to notify; seeded watches have none and are only logged.
    pub chat_id: Option<i64>,
}

impl AlertWatch {
    fn visible_to(&self, chat_id: i64) -> bool {
        self.chat_id.map_or(true, |owner| owner == chat_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertFired {
    pub watch: AlertWatch,
    pub price: f64,
}

/// Active watches keyed by symbol, shared by the command dispatcher and the
/// alert engine. The lock is never held across an await.
#[derive(Clone, Default)]
pub struct WatchSet {
    inner: Arc<Mutex<HashMap<String, AlertWatch>>>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AlertWatch>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a watch, replacing and returning any previous one for the symbol.
    pub fn insert(&self, watch: AlertWatch) -> Option<AlertWatch> {
        self.lock().insert(watch.symbol.clone(), watch)
    }

    /// Removes the watch on `symbol` if `chat_id` may manage it: its own
    /// watches and seeded ones, which belong to no chat.
    pub fn remove_for(&self, symbol: &str, chat_id: i64) -> Option<AlertWatch> {
        let mut watches = self.lock();
        if !watches.get(symbol)?.visible_to(chat_id) {
            return None;
        }
        watches.remove(symbol)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Watches sorted by symbol.
    pub fn list(&self) -> Vec<AlertWatch> {
        let mut watches: Vec<AlertWatch> = self.lock().values().cloned().collect();
        watches.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        watches
    }

    /// Watches the chat registered plus the seeded ones, sorted by symbol.
    pub fn list_for(&self, chat_id: i64) -> Vec<AlertWatch> {
        let mut watches = self.list();
        watches.retain(|watch| watch.visible_to(chat_id));
        watches
    }

    /// Removes and returns every watch whose symbol trades at or above its
    /// target in `snapshot`. Missing symbols and unparsable prices stay active.
    pub fn evaluate(&self, snapshot: &TickerSnapshot) -> Vec<AlertFired> {
        let mut fired = Vec::new();

        self.lock().retain(|symbol, watch| {
            let price = match snapshot.find(symbol).and_then(|row| row.last_price()) {
                Some(price) => price,
                None => return true,
            };
            if price >= watch.target_price {
                fired.push(AlertFired {
                    watch: watch.clone(),
                    price,
                });
                false
            } else {
                true
            }
        });

        fired.sort_by(|a, b| a.watch.symbol.cmp(&b.watch.symbol));
        fired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No watches, nothing fetched.
    Skipped,
    Evaluated { fired: usize },
    Failed,
}

/// Periodically checks every watch against one fresh snapshot.
pub struct AlertEngine<M> {
    watches: WatchSet,
    market: Arc<M>,
    sender: mpsc::Sender<AlertFired>,
    period: Duration,
}

impl<M: MarketData> AlertEngine<M> {
    pub fn new(
        watches: WatchSet,
        market: Arc<M>,
        sender: mpsc::Sender<AlertFired>,
        period: Duration,
    ) -> Self {
        Self {
            watches,
            market,
            sender,
            period,
        }
    }

    /// Runs until the receiving side of the alert channel is gone.
    pub async fn run(self) {
        info!("Alert engine started (period {:?})", self.period);

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
            if self.sender.is_closed() {
                warn!("Alert receiver dropped, stopping alert engine");
                break;
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        if self.watches.is_empty() {
            return TickOutcome::Skipped;
        }

        let snapshot = match self.market.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Alert fetch error: {}", e);
                return TickOutcome::Failed;
            }
        };

        let fired = self.watches.evaluate(&snapshot);
        debug!(
            "Alert tick: {} fired, {} still active",
            fired.len(),
            self.watches.len()
        );

        let count = fired.len();
        for event in fired {
            info!(
                "ALERT: {} price {:.2} >= {:.2}",
                event.watch.symbol, event.price, event.watch.target_price
            );
            if let Err(e) = self.sender.send(event).await {
                error!("Failed to deliver alert: {}", e);
            }
        }

        TickOutcome::Evaluated { fired: count }
    }
}
