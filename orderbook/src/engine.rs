//! Locked engine wrapper and the Good-For-Day pruner.
//!
//! A single mutex guards the book: caller threads and the pruner both
//! serialise on it, and the matching loop runs entirely inside the
//! critical section. The pruner sleeps until the next local session-close
//! boundary, then cancels every resting Good-For-Day order in one batch
//! under one lock acquisition.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::order::{Order, OrderModify};
use crate::types::{MarketDepth, OrderBookError, OrderId, Price, Trade};
use crate::OrderBook;

/// Engine construction options.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Local wall-clock time at which Good-For-Day orders are cancelled.
    pub session_close: NaiveTime,
    /// Set false to run without the pruner thread.
    pub gfd_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_close: NaiveTime::from_hms_opt(16, 0, 0).expect("16:00 is in range"),
            gfd_enabled: true,
        }
    }
}

struct Shared {
    book: Mutex<OrderBook>,
    stop: Mutex<bool>,
    stop_signal: Condvar,
    session_close: NaiveTime,
}

/// Thread-safe order book engine.
///
/// All public operations lock the book for their full duration, so
/// concurrent submissions linearise and each observed trade sequence is
/// consistent with some serial order. Dropping the engine signals the
/// pruner and joins it; an in-flight batch cancel completes first.
pub struct Engine {
    shared: Arc<Shared>,
    pruner: Option<JoinHandle<()>>,
}

impl Engine {
    /// Engine with the default 16:00 session close and the pruner running.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let shared = Arc::new(Shared {
            book: Mutex::new(OrderBook::new()),
            stop: Mutex::new(false),
            stop_signal: Condvar::new(),
            session_close: config.session_close,
        });

        let pruner = config.gfd_enabled.then(|| {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("gfd-pruner".into())
                .spawn(move || prune_good_for_day(&shared))
                .expect("spawning the pruner thread")
        });

        Self { shared, pruner }
    }

    /// Submits an order; see [`OrderBook::add_order`].
    pub fn add_order(&self, order: Order) -> Result<Vec<Trade>, OrderBookError> {
        self.shared.book.lock().add_order(order)
    }

    /// Cancels a resting order; unknown ids are ignored.
    pub fn cancel_order(&self, order_id: OrderId) {
        self.shared.book.lock().cancel_order(order_id);
    }

    /// Replaces a resting order; see [`OrderBook::modify_order`].
    pub fn modify_order(&self, modify: OrderModify) -> Result<Vec<Trade>, OrderBookError> {
        self.shared.book.lock().modify_order(modify)
    }

    /// Value-copy depth snapshot.
    pub fn depth(&self) -> MarketDepth {
        self.shared.book.lock().depth()
    }

    /// Number of resting orders.
    pub fn size(&self) -> usize {
        self.shared.book.lock().size()
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.shared.book.lock().best_bid()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.shared.book.lock().best_ask()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self.pruner.take() {
            *self.shared.stop.lock() = true;
            self.shared.stop_signal.notify_all();
            let _ = handle.join();
        }
    }
}

/// Next session-close boundary strictly after `now`. A boundary that falls
/// into a DST gap re-arms an hour later instead.
fn next_session_close(now: DateTime<Local>, close: NaiveTime) -> DateTime<Local> {
    let mut date = now.date_naive();
    if now.time() >= close {
        date = date.succ_opt().unwrap_or(date);
    }
    match date.and_time(close).and_local_timezone(Local) {
        chrono::LocalResult::Single(boundary) => boundary,
        chrono::LocalResult::Ambiguous(earliest, _) => earliest,
        chrono::LocalResult::None => now + TimeDelta::hours(1),
    }
}

fn prune_good_for_day(shared: &Shared) {
    loop {
        let now = Local::now();
        let boundary = next_session_close(now, shared.session_close);
        let wait = (boundary - now).to_std().unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + wait;
        debug!(%boundary, "good-for-day pruner armed");

        let mut stop = shared.stop.lock();
        while !*stop {
            if shared.stop_signal.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        if *stop {
            return;
        }
        drop(stop);

        let mut book = shared.book.lock();
        let expired = book.good_for_day_ids();
        if !expired.is_empty() {
            info!(count = expired.len(), "session close: cancelling good-for-day orders");
        }
        book.cancel_orders(&expired);
    }
}
