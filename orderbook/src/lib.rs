//! Single-instrument limit order book with price-time priority matching.
//!
//! Core features:
//! - Price-time priority matching (best price first, then FIFO)
//! - GoodTillCancel, FillAndKill, FillOrKill, Market, and GoodForDay policies
//! - O(1) cancellation through stable order handles
//! - Aggregated depth snapshots per price level
//!
//! [`OrderBook`] is the single-threaded core; [`Engine`] wraps it in a mutex
//! and runs the background Good-For-Day pruner.

pub mod engine;
pub mod order;
mod price_levels;
pub mod types;

pub use engine::{Engine, EngineConfig};
pub use order::{Order, OrderModify};
pub use types::{
    LevelInfo, MarketDepth, OrderBookError, OrderId, OrderType, Price, Quantity, Side, Trade,
    TradeLeg,
};

use std::collections::HashMap;

use tracing::warn;

use crate::price_levels::{Handle, PriceLevels};

/// Where a resting order lives: the side whose arena owns it, and its
/// handle there. Handles stay valid until the order is removed.
#[derive(Clone, Copy)]
struct Slot {
    side: Side,
    handle: Handle,
}

/// Central limit order book for a single instrument.
///
/// Orders at each price match in strict FIFO admission order; across
/// prices, the best price matches first. Not thread-safe on its own -
/// [`Engine`] adds the lock and the Good-For-Day pruner.
pub struct OrderBook {
    /// Buy orders, highest price first
    bids: PriceLevels,
    /// Sell orders, lowest price first
    asks: PriceLevels,
    /// Lookup from order id to its resting location
    index: HashMap<OrderId, Slot>,
}

impl OrderBook {
    /// Creates an empty order book.
    pub fn new() -> Self {
        Self {
            bids: PriceLevels::new(Side::Buy),
            asks: PriceLevels::new(Side::Sell),
            index: HashMap::new(),
        }
    }

    fn book(&self, side: Side) -> &PriceLevels {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn book_mut(&mut self, side: Side) -> &mut PriceLevels {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Submits an order and returns the trades produced immediately.
    ///
    /// Duplicate ids and zero-quantity orders are rejected with a logged
    /// warning and no book change. Market orders are dropped when the
    /// opposite side is empty, otherwise re-priced to Good-Till-Cancel at
    /// the worst opposite price. FillAndKill orders must cross immediately
    /// and FillOrKill orders must be coverable in full, or they are not
    /// admitted.
    pub fn add_order(&mut self, mut order: Order) -> Result<Vec<Trade>, OrderBookError> {
        if self.index.contains_key(&order.id()) {
            warn!(order_id = %order.id(), "rejecting order: id already resting in book");
            return Ok(Vec::new());
        }

        // Level queues only ever hold orders with quantity remaining
        if order.initial_quantity() == 0 {
            warn!(order_id = %order.id(), "rejecting order: zero quantity");
            return Ok(Vec::new());
        }

        if order.order_type() == OrderType::Market {
            // Worst opposite price guarantees the order walks every
            // crossable level; a remainder rests outside the spread.
            let worst = match order.side() {
                Side::Buy => self.asks.worst_price(),
                Side::Sell => self.bids.worst_price(),
            };
            match worst {
                Some(price) => order.to_good_till_cancel(price)?,
                None => return Ok(Vec::new()),
            }
        }

        let price = order
            .price()
            .ok_or(OrderBookError::MissingPrice { id: order.id() })?;

        match order.order_type() {
            OrderType::FillAndKill if !self.can_match(order.side(), price) => {
                return Ok(Vec::new());
            }
            OrderType::FillOrKill
                if !self.can_fully_fill(order.side(), price, order.remaining_quantity()) =>
            {
                return Ok(Vec::new());
            }
            _ => {}
        }

        let id = order.id();
        let side = order.side();
        let handle = self.book_mut(side).push_back(order, price);
        self.index.insert(id, Slot { side, handle });

        self.match_orders()
    }

    /// Cancels a resting order. Unknown ids are ignored, so a cancel that
    /// races a fill or the session-close prune is harmless.
    pub fn cancel_order(&mut self, order_id: OrderId) {
        let Some(slot) = self.index.remove(&order_id) else {
            return;
        };
        self.book_mut(slot.side).remove(slot.handle);
    }

    /// Cancels a batch of orders. Used by the Good-For-Day pruner so the
    /// whole sweep happens inside one critical section.
    pub fn cancel_orders(&mut self, order_ids: &[OrderId]) {
        for &order_id in order_ids {
            self.cancel_order(order_id);
        }
    }

    /// Replaces a resting order's side, price, and quantity, keeping its
    /// type. The replacement re-enters at the tail of its level and
    /// matching re-runs; time priority is lost. Unknown ids produce no
    /// trades.
    pub fn modify_order(&mut self, modify: OrderModify) -> Result<Vec<Trade>, OrderBookError> {
        let Some(slot) = self.index.get(&modify.id()).copied() else {
            return Ok(Vec::new());
        };
        let order_type = self.book(slot.side).order(slot.handle).order_type();

        self.cancel_order(modify.id());
        self.add_order(modify.to_order(order_type))
    }

    /// True when an order on `side` at `price` would cross the best
    /// opposite price. An empty opposite side never matches.
    fn can_match(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => self.asks.best_price().is_some_and(|best_ask| price >= best_ask),
            Side::Sell => self.bids.best_price().is_some_and(|best_bid| price <= best_bid),
        }
    }

    /// True when the crossable depth at `price` or better covers
    /// `quantity` in full. Backs FillOrKill admission.
    fn can_fully_fill(&self, side: Side, price: Price, mut quantity: Quantity) -> bool {
        if !self.can_match(side, price) {
            return false;
        }

        let opposite = self.book(side.opposite());
        for (level_price, level_quantity) in opposite.levels_best_first() {
            let crossable = match side {
                Side::Buy => level_price <= price,
                Side::Sell => level_price >= price,
            };
            if !crossable {
                break;
            }
            if quantity <= level_quantity {
                return true;
            }
            quantity -= level_quantity;
        }
        false
    }

    /// Price-time matching loop.
    ///
    /// While the best bid crosses the best ask, the two oldest orders at
    /// those levels fill for the smaller remaining quantity. Filled orders
    /// leave the book, emptied levels are erased, and each fill emits a
    /// trade whose legs carry the resting prices. After the loop, a
    /// FillAndKill order left unfilled at either top is cancelled.
    fn match_orders(&mut self) -> Result<Vec<Trade>, OrderBookError> {
        let mut trades = Vec::new();

        loop {
            let (bid_price, ask_price) = match (self.bids.best_price(), self.asks.best_price()) {
                (Some(b), Some(a)) => (b, a),
                _ => break,
            };
            if bid_price < ask_price {
                break;
            }

            while let (Some(bid), Some(ask)) =
                (self.bids.front(bid_price), self.asks.front(ask_price))
            {
                let quantity = self
                    .bids
                    .order(bid)
                    .remaining_quantity()
                    .min(self.asks.order(ask).remaining_quantity());

                self.bids.fill(bid, quantity)?;
                self.asks.fill(ask, quantity)?;

                let (bid_id, bid_filled) = {
                    let order = self.bids.order(bid);
                    (order.id(), order.is_filled())
                };
                let (ask_id, ask_filled) = {
                    let order = self.asks.order(ask);
                    (order.id(), order.is_filled())
                };

                trades.push(Trade {
                    bid: TradeLeg {
                        order_id: bid_id,
                        price: bid_price,
                        quantity,
                    },
                    ask: TradeLeg {
                        order_id: ask_id,
                        price: ask_price,
                        quantity,
                    },
                });

                if bid_filled {
                    self.index.remove(&bid_id);
                    self.bids.remove(bid);
                }
                if ask_filled {
                    self.index.remove(&ask_id);
                    self.asks.remove(ask);
                }
            }
        }

        // FillAndKill remainders never rest
        self.sweep_fill_and_kill(Side::Buy);
        self.sweep_fill_and_kill(Side::Sell);

        Ok(trades)
    }

    fn sweep_fill_and_kill(&mut self, side: Side) {
        let book = self.book(side);
        let Some(best) = book.best_price() else {
            return;
        };
        let Some(front) = book.front(best) else {
            return;
        };
        if book.order(front).order_type() == OrderType::FillAndKill {
            let id = book.order(front).id();
            self.cancel_order(id);
        }
    }

    /// Aggregated depth per price level: bids descending, asks ascending.
    pub fn depth(&self) -> MarketDepth {
        let level_infos = |levels: &PriceLevels| {
            levels
                .levels_best_first()
                .map(|(price, quantity)| LevelInfo { price, quantity })
                .collect()
        };
        MarketDepth {
            bids: level_infos(&self.bids),
            asks: level_infos(&self.asks),
        }
    }

    /// Number of resting orders.
    pub fn size(&self) -> usize {
        debug_assert_eq!(
            self.index.len(),
            self.bids.order_count() + self.asks.order_count()
        );
        self.index.len()
    }

    /// Highest resting buy price.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    /// Lowest resting sell price.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Ids of every resting Good-For-Day order, for the session-close
    /// sweep.
    pub fn good_for_day_ids(&self) -> Vec<OrderId> {
        self.bids
            .orders()
            .chain(self.asks.orders())
            .filter(|order| order.order_type() == OrderType::GoodForDay)
            .map(|order| order.id())
            .collect()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod ob_tests {
    use super::*;

    fn gtc(id: u64, side: Side, price: Price, qty: Quantity) -> Order {
        Order::new(OrderType::GoodTillCancel, OrderId(id), side, price, qty)
    }

    fn fak(id: u64, side: Side, price: Price, qty: Quantity) -> Order {
        Order::new(OrderType::FillAndKill, OrderId(id), side, price, qty)
    }

    /// The book never rests in a crossed state; levels are non-empty and
    /// sorted best-first on both sides.
    fn assert_book_consistent(book: &OrderBook) {
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "book rests crossed: bid {bid} >= ask {ask}");
        }
        let depth = book.depth();
        for level in depth.bids.iter().chain(depth.asks.iter()) {
            assert!(level.quantity > 0, "empty level retained at {}", level.price);
        }
        // Bids descending, asks ascending
        assert!(depth.bids.windows(2).all(|w| w[0].price > w[1].price));
        assert!(depth.asks.windows(2).all(|w| w[0].price < w[1].price));
    }

    #[test]
    fn simple_cross_fills_both_sides() {
        let mut book = OrderBook::new();
        assert!(book.add_order(gtc(1, Side::Buy, 100, 10)).unwrap().is_empty());

        let trades = book.add_order(gtc(2, Side::Sell, 100, 10)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.order_id, OrderId(1));
        assert_eq!(trades[0].ask.order_id, OrderId(2));
        assert_eq!(trades[0].bid.price, 100);
        assert_eq!(trades[0].ask.price, 100);
        assert_eq!(trades[0].bid.quantity, 10);

        assert_eq!(book.size(), 0);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_book_consistent(&book);
    }

    #[test]
    fn partial_fill_rests_residue() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 10)).unwrap();

        let trades = book.add_order(gtc(2, Side::Sell, 100, 4)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.quantity, 4);

        assert_eq!(book.size(), 1);
        let depth = book.depth();
        assert_eq!(depth.bids, vec![LevelInfo { price: 100, quantity: 6 }]);
        assert!(depth.asks.is_empty());
        assert_book_consistent(&book);
    }

    #[test]
    fn fill_and_kill_rejected_without_cross() {
        let mut book = OrderBook::new();
        let trades = book.add_order(fak(1, Side::Buy, 100, 5)).unwrap();

        assert!(trades.is_empty());
        assert_eq!(book.size(), 0);
        assert_book_consistent(&book);
    }

    #[test]
    fn fill_and_kill_residue_swept_after_match() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 100, 5)).unwrap();

        let trades = book.add_order(fak(2, Side::Buy, 100, 12)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.order_id, OrderId(2));
        assert_eq!(trades[0].ask.order_id, OrderId(1));
        assert_eq!(trades[0].bid.quantity, 5);

        // Remaining 7 on the taker cancelled by the post-match sweep
        assert_eq!(book.size(), 0);
        assert_book_consistent(&book);
    }

    #[test]
    fn market_order_walks_to_worst_price() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 100, 3)).unwrap();
        book.add_order(gtc(2, Side::Sell, 101, 3)).unwrap();

        let trades = book.add_order(Order::market(OrderId(3), Side::Buy, 10)).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].ask.order_id, OrderId(1));
        assert_eq!(trades[0].ask.price, 100);
        assert_eq!(trades[0].bid.quantity, 3);
        assert_eq!(trades[1].ask.order_id, OrderId(2));
        assert_eq!(trades[1].ask.price, 101);
        assert_eq!(trades[1].bid.quantity, 3);

        // Converted remainder rests as GTC at the worst ask price
        assert_eq!(book.size(), 1);
        let depth = book.depth();
        assert!(depth.asks.is_empty());
        assert_eq!(depth.bids, vec![LevelInfo { price: 101, quantity: 4 }]);
        assert_book_consistent(&book);
    }

    #[test]
    fn market_order_dropped_on_empty_opposite_side() {
        let mut book = OrderBook::new();
        let trades = book.add_order(Order::market(OrderId(1), Side::Sell, 10)).unwrap();

        assert!(trades.is_empty());
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn modify_loses_time_priority() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 5)).unwrap();
        book.add_order(gtc(2, Side::Buy, 100, 5)).unwrap();

        // Re-enqueue id 1 with identical parameters: now behind id 2
        let trades = book
            .modify_order(OrderModify::new(OrderId(1), Side::Buy, 100, 5))
            .unwrap();
        assert!(trades.is_empty());

        let trades = book.add_order(gtc(3, Side::Sell, 100, 5)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.order_id, OrderId(2));

        assert_eq!(book.size(), 1);
        let depth = book.depth();
        assert_eq!(depth.bids, vec![LevelInfo { price: 100, quantity: 5 }]);
        assert_book_consistent(&book);
    }

    #[test]
    fn modify_unknown_id_is_a_noop() {
        let mut book = OrderBook::new();
        let trades = book
            .modify_order(OrderModify::new(OrderId(9), Side::Buy, 100, 5))
            .unwrap();
        assert!(trades.is_empty());
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn duplicate_id_rejected_without_book_change() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 10)).unwrap();

        let trades = book.add_order(gtc(1, Side::Sell, 100, 10)).unwrap();
        assert!(trades.is_empty());
        assert_eq!(book.size(), 1);
        assert_eq!(book.best_bid(), Some(100));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn zero_quantity_order_rejected() {
        let mut book = OrderBook::new();
        let trades = book.add_order(gtc(1, Side::Buy, 100, 0)).unwrap();
        assert!(trades.is_empty());
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn cancel_is_idempotent_and_restores_book() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 10)).unwrap();
        book.add_order(gtc(2, Side::Buy, 99, 5)).unwrap();
        let before = book.depth();

        book.add_order(gtc(3, Side::Buy, 98, 7)).unwrap();
        book.cancel_order(OrderId(3));
        assert_eq!(book.depth(), before);
        assert_eq!(book.size(), 2);

        book.cancel_order(OrderId(3));
        assert_eq!(book.depth(), before);
        assert_eq!(book.size(), 2);
    }

    #[test]
    fn time_priority_within_level() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 100, 50)).unwrap();
        book.add_order(gtc(2, Side::Sell, 100, 40)).unwrap();

        let trades = book.add_order(gtc(10, Side::Buy, 100, 70)).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].ask.order_id, OrderId(1));
        assert_eq!(trades[0].ask.quantity, 50);
        assert_eq!(trades[1].ask.order_id, OrderId(2));
        assert_eq!(trades[1].ask.quantity, 20);

        // Order 2 keeps its residue at the same level
        assert_eq!(book.best_ask(), Some(100));
        let depth = book.depth();
        assert_eq!(depth.asks, vec![LevelInfo { price: 100, quantity: 20 }]);
        assert_book_consistent(&book);
    }

    #[test]
    fn matching_walks_price_levels_best_first() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 102, 5)).unwrap();
        book.add_order(gtc(2, Side::Sell, 101, 5)).unwrap();
        book.add_order(gtc(3, Side::Sell, 103, 5)).unwrap();

        let trades = book.add_order(gtc(4, Side::Buy, 102, 12)).unwrap();
        assert_eq!(trades.len(), 2);
        // Best ask (101) consumed before 102; 103 never crosses
        assert_eq!(trades[0].ask.order_id, OrderId(2));
        assert_eq!(trades[1].ask.order_id, OrderId(1));

        let depth = book.depth();
        assert_eq!(depth.bids, vec![LevelInfo { price: 102, quantity: 2 }]);
        assert_eq!(depth.asks, vec![LevelInfo { price: 103, quantity: 5 }]);
        assert_book_consistent(&book);
    }

    #[test]
    fn trade_legs_carry_each_resting_price() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 105, 5)).unwrap();

        let trades = book.add_order(gtc(2, Side::Sell, 100, 5)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.price, 105);
        assert_eq!(trades[0].ask.price, 100);
    }

    #[test]
    fn fill_or_kill_rejected_when_depth_insufficient() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 100, 5)).unwrap();
        book.add_order(gtc(2, Side::Sell, 101, 5)).unwrap();

        let trades = book
            .add_order(Order::new(OrderType::FillOrKill, OrderId(3), Side::Buy, 100, 8))
            .unwrap();
        assert!(trades.is_empty());
        assert_eq!(book.size(), 2);
    }

    #[test]
    fn fill_or_kill_fills_across_levels() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 100, 5)).unwrap();
        book.add_order(gtc(2, Side::Sell, 101, 5)).unwrap();

        let trades = book
            .add_order(Order::new(OrderType::FillOrKill, OrderId(3), Side::Buy, 101, 8))
            .unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].bid.quantity + trades[1].bid.quantity, 8);
        assert_eq!(book.size(), 1);

        let depth = book.depth();
        assert_eq!(depth.asks, vec![LevelInfo { price: 101, quantity: 2 }]);
        assert_book_consistent(&book);
    }

    #[test]
    fn traded_quantity_is_conserved() {
        let mut book = OrderBook::new();
        let buys: Quantity = 10 + 7 + 3;
        book.add_order(gtc(1, Side::Buy, 100, 10)).unwrap();
        book.add_order(gtc(2, Side::Buy, 101, 7)).unwrap();
        book.add_order(gtc(3, Side::Buy, 99, 3)).unwrap();

        let trades = book.add_order(gtc(4, Side::Sell, 99, 25)).unwrap();
        let traded: Quantity = trades.iter().map(|t| t.bid.quantity).sum();
        assert_eq!(traded, buys.min(25));
        assert_eq!(traded, 20);

        // Seller residue rests; every bid is gone
        assert_eq!(book.size(), 1);
        let depth = book.depth();
        assert!(depth.bids.is_empty());
        assert_eq!(depth.asks, vec![LevelInfo { price: 99, quantity: 5 }]);
        assert_book_consistent(&book);
    }

    #[test]
    fn good_for_day_ids_cover_both_sides() {
        let mut book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 99, 5)).unwrap();
        book.add_order(Order::new(OrderType::GoodForDay, OrderId(2), Side::Buy, 98, 5))
            .unwrap();
        book.add_order(Order::new(OrderType::GoodForDay, OrderId(3), Side::Sell, 103, 5))
            .unwrap();

        let mut ids = book.good_for_day_ids();
        ids.sort();
        assert_eq!(ids, vec![OrderId(2), OrderId(3)]);

        book.cancel_orders(&ids);
        assert_eq!(book.size(), 1);
        assert_eq!(book.good_for_day_ids(), Vec::new());
    }
}
