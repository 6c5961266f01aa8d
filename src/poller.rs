// ===============================
// src/poller.rs
// ===============================
//
// Polling loops yang bisa dibatalkan:
// - spawn_poll(...) -> PollHandle; cancel() atau drop handle = loop berhenti
// - hasil fetch hanya dikirim kalau handle masih live dan consumer masih dengar
// - watch_account: saldo + mark price (cepat) dan posisi lending (lambat)
//
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::gateway::Transport;
use crate::info::InfoClient;
use crate::lending::PositionMetrics;
use crate::metrics::{HEALTH_FACTOR, MARK_PRICE, POLLS, WITHDRAWABLE};
use crate::morpho::PositionSource;

/// Owns one polling task. Dropping it stops the task.
pub struct PollHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_live(&self) -> bool {
        !*self.cancel.borrow() && self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Cancel and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

/// Runs `fetch` immediately, then every `every`, sending each result to `out`.
pub fn spawn_poll<T, F, Fut>(name: &'static str, every: Duration, mut fetch: F, out: mpsc::Sender<T>) -> PollHandle
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send,
{
    let (cancel, mut cancelled) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancelled.changed() => break,
                _ = tick.tick() => {}
            }
            let value = tokio::select! {
                _ = cancelled.changed() => break,
                v = fetch() => v,
            };
            // liveness check sebelum publish
            if *cancelled.borrow() {
                break;
            }
            POLLS.with_label_values(&[name]).inc();
            if out.send(value).await.is_err() {
                debug!(poller = name, "consumer gone, stopping");
                break;
            }
        }
        debug!(poller = name, "poll loop stopped");
    });
    PollHandle { cancel, task: Some(task) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub ts_ms: i64,
    pub user: String,
    pub coin: String,
    pub withdrawable: f64,
    pub mark_price: f64,
    pub position: Option<PositionMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountUpdate {
    Market { withdrawable: f64, mark_price: f64 },
    Position(Option<PositionMetrics>),
}

impl AccountSnapshot {
    pub fn apply(&mut self, update: AccountUpdate) {
        self.ts_ms = Utc::now().timestamp_millis();
        match update {
            AccountUpdate::Market { withdrawable, mark_price } => {
                self.withdrawable = withdrawable;
                self.mark_price = mark_price;
            }
            AccountUpdate::Position(p) => self.position = p,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchIntervals {
    pub market: Duration,
    pub position: Duration,
}

impl Default for WatchIntervals {
    fn default() -> Self {
        Self { market: Duration::from_secs(5), position: Duration::from_secs(15) }
    }
}

/// Live account view fed by the polling tasks it owns.
pub struct AccountWatch {
    snapshot: AccountSnapshot,
    rx: mpsc::Receiver<AccountUpdate>,
    handles: Vec<PollHandle>,
}

impl AccountWatch {
    /// Waits for the next update and returns the merged snapshot; `None` once all pollers stopped.
    pub async fn next_snapshot(&mut self) -> Option<AccountSnapshot> {
        let update = self.rx.recv().await?;
        self.snapshot.apply(update);
        Some(self.snapshot.clone())
    }

    pub async fn stop(self) {
        join_all(self.handles.into_iter().map(PollHandle::stop)).await;
    }
}

pub fn watch_account<T>(
    info: Arc<InfoClient<T>>,
    lending: Option<Arc<dyn PositionSource>>,
    user: Address,
    coin: &str,
    every: WatchIntervals,
) -> AccountWatch
where
    T: Transport + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    let coin = coin.to_ascii_uppercase();
    let mut handles = Vec::with_capacity(2);

    let market_coin = coin.clone();
    handles.push(spawn_poll(
        "account_market",
        every.market,
        move || {
            let info = info.clone();
            let coin = market_coin.clone();
            async move {
                let withdrawable = info.withdrawable_balance_or_default(user).await;
                let mark_price = info.mark_price_or_default(&coin).await;
                WITHDRAWABLE.set(withdrawable);
                MARK_PRICE.with_label_values(&[&coin]).set(mark_price);
                AccountUpdate::Market { withdrawable, mark_price }
            }
        },
        tx.clone(),
    ));

    if let Some(source) = lending {
        handles.push(spawn_poll(
            "lending_position",
            every.position,
            move || {
                let source = source.clone();
                async move {
                    match source.position_metrics(user).await {
                        Ok(m) => {
                            HEALTH_FACTOR.set(m.health_factor);
                            if m.is_liquidatable() {
                                warn!(health_factor = m.health_factor, "position is liquidatable");
                            }
                            AccountUpdate::Position(Some(m))
                        }
                        Err(e) => {
                            warn!(error = %e, "position read failed");
                            crate::metrics::QUERY_FAILURES.with_label_values(&["position"]).inc();
                            AccountUpdate::Position(None)
                        }
                    }
                }
            },
            tx,
        ));
    }

    info!(user = %format!("{:#x}", user), %coin, "watching account");
    AccountWatch {
        snapshot: AccountSnapshot { user: format!("{:#x}", user), coin, ..Default::default() },
        rx,
        handles,
    }
}
