//! Order state and the cancel-and-replace payload.

use serde::{Deserialize, Serialize};

use crate::types::{OrderBookError, OrderId, OrderType, Price, Quantity, Side};

/// A single order.
///
/// Only the book mutates an order after admission: fills decrement the
/// remaining quantity, and Market orders are re-priced to Good-Till-Cancel
/// before they are placed in a level. The price is `None` exactly while
/// the order type is still `Market`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    order_type: OrderType,
    id: OrderId,
    side: Side,
    price: Option<Price>,
    initial_quantity: Quantity,
    remaining_quantity: Quantity,
}

impl Order {
    /// Creates a priced order.
    pub fn new(
        order_type: OrderType,
        id: OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            order_type,
            id,
            side,
            price: Some(price),
            initial_quantity: quantity,
            remaining_quantity: quantity,
        }
    }

    /// Creates a market order. The price stays absent until the book
    /// converts the order on admission.
    pub fn market(id: OrderId, side: Side, quantity: Quantity) -> Self {
        Self {
            order_type: OrderType::Market,
            id,
            side,
            price: None,
            initial_quantity: quantity,
            remaining_quantity: quantity,
        }
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Limit price; `None` only for an unconverted Market order.
    pub fn price(&self) -> Option<Price> {
        self.price
    }

    pub fn initial_quantity(&self) -> Quantity {
        self.initial_quantity
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.remaining_quantity
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.initial_quantity - self.remaining_quantity
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_quantity == 0
    }

    /// Consumes `quantity` from the remaining amount. The quantity must be
    /// positive and no larger than what remains.
    pub fn fill(&mut self, quantity: Quantity) -> Result<(), OrderBookError> {
        if quantity == 0 || quantity > self.remaining_quantity {
            return Err(OrderBookError::FillExceedsRemaining {
                id: self.id,
                requested: quantity,
                remaining: self.remaining_quantity,
            });
        }
        self.remaining_quantity -= quantity;
        Ok(())
    }

    /// Re-prices a Market order as Good-Till-Cancel once a concrete
    /// opposite-side price is known. Any other order type is refused.
    pub(crate) fn to_good_till_cancel(&mut self, price: Price) -> Result<(), OrderBookError> {
        if self.order_type != OrderType::Market {
            return Err(OrderBookError::NotConvertible { id: self.id });
        }
        self.price = Some(price);
        self.order_type = OrderType::GoodTillCancel;
        Ok(())
    }
}

/// Cancel-and-replace payload: new side, price, and quantity for an
/// existing order id. The replacement keeps the original's order type and
/// re-enters the book at the tail of its level, so time priority resets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModify {
    id: OrderId,
    side: Side,
    price: Price,
    quantity: Quantity,
}

impl OrderModify {
    pub fn new(id: OrderId, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            id,
            side,
            price,
            quantity,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Builds the replacement order, carrying over the original's type.
    pub fn to_order(&self, order_type: OrderType) -> Order {
        Order::new(order_type, self.id, self.side, self.price, self.quantity)
    }
}
