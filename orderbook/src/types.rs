//! Core data types for the order book.
//!
//! All types use integer ticks for prices to avoid floating-point precision
//! issues. Quantities are unsigned lot counts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Price in integer ticks. Signed so spreads and deltas stay in-domain.
pub type Price = i64;

/// Quantity in shares/lots.
pub type Quantity = u64;

/// Unique order identifier, assigned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side - Buy (bid) or Sell (ask).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order lifetime and execution policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Rests until filled or cancelled
    GoodTillCancel,
    /// Match whatever is possible immediately, cancel the remainder
    FillAndKill,
    /// Execute the entire quantity immediately or reject
    FillOrKill,
    /// No limit price; re-priced on admission to walk the opposite side
    Market,
    /// Good-Till-Cancel semantics, auto-cancelled at session close
    GoodForDay,
}

/// One leg of an execution: the resting order's id and price plus the
/// matched quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLeg {
    pub order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
}

/// Trade execution record pairing a bid leg and an ask leg. Both legs
/// carry the same quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub bid: TradeLeg,
    pub ask: TradeLeg,
}

/// Aggregated resting quantity at a single price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub price: Price,
    pub quantity: Quantity,
}

/// Depth snapshot. Bids are ordered best-first (descending price), asks
/// best-first (ascending price). The snapshot is a value copy and holds
/// no references into the book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub bids: Vec<LevelInfo>,
    pub asks: Vec<LevelInfo>,
}

/// Invariant violations surfaced by the book.
///
/// Per-order rejections (duplicate id, unmatchable FillAndKill, unfillable
/// FillOrKill, Market with no opposite liquidity) are not errors; those
/// return empty trade sets.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OrderBookError {
    #[error("order {id} cannot fill {requested}: only {remaining} remaining")]
    FillExceedsRemaining {
        id: OrderId,
        requested: Quantity,
        remaining: Quantity,
    },

    #[error("order {id} is not a market order and cannot become good-till-cancel")]
    NotConvertible { id: OrderId },

    #[error("order {id} has no limit price")]
    MissingPrice { id: OrderId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_legs_share_quantity() {
        let t = Trade {
            bid: TradeLeg {
                order_id: OrderId(1),
                price: 195_430,
                quantity: 100,
            },
            ask: TradeLeg {
                order_id: OrderId(2),
                price: 195_430,
                quantity: 100,
            },
        };

        assert_eq!(t.bid.quantity, t.ask.quantity);
        assert_ne!(t.bid.order_id, t.ask.order_id);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(OrderId(42).to_string(), "42");
    }
}
