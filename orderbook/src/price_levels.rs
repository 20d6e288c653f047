//! Price-indexed FIFO queues for one side of the book.
//!
//! Resting orders live in a slab arena and are threaded into a doubly-linked
//! list per price level, giving O(1) tail append and O(1) unlink by handle.
//! Each level caches its aggregate remaining quantity and order count, and
//! empty levels are erased immediately.

use std::collections::BTreeMap;

use slab::Slab;

use crate::order::Order;
use crate::types::{OrderBookError, Price, Quantity, Side};

/// Stable reference to a resting order within one side's arena. Valid
/// until the order is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Handle(usize);

struct Node {
    order: Order,
    price: Price,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Per-price queue metadata: list ends plus cached aggregates.
#[derive(Default)]
struct Level {
    head: Option<usize>,
    tail: Option<usize>,
    count: usize,
    total_quantity: Quantity,
}

/// All resting orders on one side of the book.
///
/// Levels are kept in a BTreeMap; the best price sits at the back for bids
/// (highest) and at the front for asks (lowest). The worst price is the
/// opposite end.
pub(crate) struct PriceLevels {
    side: Side,
    levels: BTreeMap<Price, Level>,
    arena: Slab<Node>,
}

impl PriceLevels {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            arena: Slab::new(),
        }
    }

    pub fn order_count(&self) -> usize {
        self.arena.len()
    }

    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.keys().next_back().copied(),
            Side::Sell => self.levels.keys().next().copied(),
        }
    }

    /// Far end of this side. Market orders convert at the opposite side's
    /// worst price so they walk every crossable level.
    pub fn worst_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.keys().next().copied(),
            Side::Sell => self.levels.keys().next_back().copied(),
        }
    }

    /// Appends the order at the tail of the level for `price`, creating
    /// the level if needed.
    pub fn push_back(&mut self, order: Order, price: Price) -> Handle {
        let quantity = order.remaining_quantity();
        let idx = self.arena.insert(Node {
            order,
            price,
            prev: None,
            next: None,
        });

        let level = self.levels.entry(price).or_default();
        if let Some(tail) = level.tail {
            self.arena[tail].next = Some(idx);
            self.arena[idx].prev = Some(tail);
        } else {
            level.head = Some(idx);
        }
        level.tail = Some(idx);
        level.count += 1;
        level.total_quantity += quantity;

        Handle(idx)
    }

    /// Unlinks and returns the order behind `handle`, erasing its level
    /// if that empties it.
    pub fn remove(&mut self, handle: Handle) -> Order {
        let Node {
            order,
            price,
            prev,
            next,
        } = self.arena.remove(handle.0);

        if let Some(p) = prev {
            self.arena[p].next = next;
        }
        if let Some(n) = next {
            self.arena[n].prev = prev;
        }

        let mut level_empty = false;
        if let Some(level) = self.levels.get_mut(&price) {
            if prev.is_none() {
                level.head = next;
            }
            if next.is_none() {
                level.tail = prev;
            }
            level.count -= 1;
            level.total_quantity -= order.remaining_quantity();
            level_empty = level.count == 0;
        }
        if level_empty {
            self.levels.remove(&price);
        }

        order
    }

    /// Handle of the oldest resting order at `price`.
    pub fn front(&self, price: Price) -> Option<Handle> {
        self.levels.get(&price).and_then(|level| level.head).map(Handle)
    }

    pub fn order(&self, handle: Handle) -> &Order {
        &self.arena[handle.0].order
    }

    /// Applies a fill to the order behind `handle`, keeping the level
    /// aggregate in step.
    pub fn fill(&mut self, handle: Handle, quantity: Quantity) -> Result<(), OrderBookError> {
        let node = &mut self.arena[handle.0];
        node.order.fill(quantity)?;
        let price = node.price;
        if let Some(level) = self.levels.get_mut(&price) {
            level.total_quantity -= quantity;
        }
        Ok(())
    }

    /// Levels best-first as (price, aggregate remaining quantity).
    pub fn levels_best_first(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        let iter: Box<dyn Iterator<Item = (&Price, &Level)> + '_> = match self.side {
            Side::Buy => Box::new(self.levels.iter().rev()),
            Side::Sell => Box::new(self.levels.iter()),
        };
        iter.map(|(price, level)| (*price, level.total_quantity))
    }

    /// Every resting order on this side, in arena order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.arena.iter().map(|(_, node)| &node.order)
    }
}
