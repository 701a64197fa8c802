// ============================================================================
// Order Domain Model
// ============================================================================

use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

/// Caller-supplied order identifier, unique per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Build an identifier from a numeric client reference.
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderType {
    Limit,
    /// No price limit; never rests in the book
    Market,
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    use thiserror::Error;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderState {
        /// Sequenced, not yet seen by the matcher
        Pending,
        Accepted,
        PartiallyFilled,
        Filled,
        Cancelled,
        Rejected,
    }

    impl OrderState {
        pub fn is_terminal(&self) -> bool {
            matches!(
                self,
                OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
            )
        }

        pub fn can_be_cancelled(&self) -> bool {
            matches!(self, OrderState::Accepted | OrderState::PartiallyFilled)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderStateTransition {
        Accept,
        Reject,
        PartialFill,
        Fill,
        Cancel,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    #[error("invalid order state transition from {from:?} via {via:?}")]
    pub struct InvalidTransition {
        pub from: OrderState,
        pub via: OrderStateTransition,
    }

    impl OrderState {
        pub fn transition(
            &self,
            via: OrderStateTransition,
        ) -> Result<OrderState, InvalidTransition> {
            use OrderStateTransition as T;

            match (self, via) {
                (OrderState::Pending, T::Accept) => Ok(OrderState::Accepted),
                (OrderState::Pending, T::Reject) => Ok(OrderState::Rejected),

                (OrderState::Accepted | OrderState::PartiallyFilled, T::PartialFill) => {
                    Ok(OrderState::PartiallyFilled)
                },
                (OrderState::Accepted | OrderState::PartiallyFilled, T::Fill) => {
                    Ok(OrderState::Filled)
                },
                (OrderState::Accepted | OrderState::PartiallyFilled, T::Cancel) => {
                    Ok(OrderState::Cancelled)
                },

                _ => Err(InvalidTransition { from: *self, via }),
            }
        }
    }
}

use state::{InvalidTransition, OrderState, OrderStateTransition};

// ============================================================================
// Inbound Request
// ============================================================================

/// An order as submitted by a caller, before the sequencer stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderRequest {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    /// Absent or zero means a market order
    pub price: Option<Price>,
    pub quantity: Quantity,
}

impl OrderRequest {
    pub fn limit(
        order_id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            order_id,
            symbol: symbol.into(),
            side,
            price: Some(price),
            quantity,
        }
    }

    pub fn market(
        order_id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        quantity: Quantity,
    ) -> Self {
        Self {
            order_id,
            symbol: symbol.into(),
            side,
            price: None,
            quantity,
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self.price {
            Some(price) if !price.is_zero() => OrderType::Limit,
            _ => OrderType::Market,
        }
    }

    /// Stamp the request with its ingestion sequence and time.
    pub(crate) fn into_order(
        self,
        symbol: Arc<str>,
        sequence: u64,
        received_at: DateTime<Utc>,
    ) -> Order {
        let order_type = self.order_type();
        let price = match order_type {
            OrderType::Limit => self.price,
            OrderType::Market => None,
        };

        Order {
            order_id: self.order_id,
            symbol,
            side: self.side,
            order_type,
            price,
            original_quantity: self.quantity,
            remaining_quantity: self.quantity,
            sequence,
            received_at,
            state: OrderState::Pending,
        }
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// A sequenced order.
///
/// Identity fields are immutable; only the remaining quantity and the state
/// change, and only on the engine's consumer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: Arc<str>,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub original_quantity: Quantity,
    remaining_quantity: Quantity,
    /// Engine-assigned at ingestion; lower means earlier
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
    state: OrderState,
}

impl Order {
    /// Stamp a request outside an engine (replay, direct book tests).
    pub fn from_request(request: OrderRequest, sequence: u64, received_at: DateTime<Utc>) -> Self {
        let symbol: Arc<str> = Arc::from(request.symbol.as_str());
        request.into_order(symbol, sequence, received_at)
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.remaining_quantity
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.original_quantity.saturating_sub(self.remaining_quantity)
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn is_market_order(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }

    pub fn is_limit_order(&self) -> bool {
        matches!(self.order_type, OrderType::Limit)
    }

    pub fn is_filled(&self) -> bool {
        self.remaining_quantity.is_zero()
    }

    /// Reduce the remaining quantity by a fill.
    ///
    /// Returns false, leaving the order untouched, if `quantity` is not
    /// positive or exceeds what remains.
    pub fn fill(&mut self, quantity: Quantity) -> bool {
        if !quantity.is_positive() || quantity > self.remaining_quantity {
            return false;
        }

        let via = if quantity == self.remaining_quantity {
            OrderStateTransition::Fill
        } else {
            OrderStateTransition::PartialFill
        };

        match self.state.transition(via) {
            Ok(next) => {
                self.remaining_quantity = self.remaining_quantity.saturating_sub(quantity);
                self.state = next;
                true
            },
            Err(_) => false,
        }
    }

    pub fn apply(&mut self, via: OrderStateTransition) -> Result<OrderState, InvalidTransition> {
        self.state = self.state.transition(via)?;
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: i64) -> Quantity {
        Quantity::from_integer(n).unwrap()
    }

    fn accepted(side: Side, price: Option<i64>, quantity: i64) -> Order {
        let request = OrderRequest {
            order_id: OrderId::new(),
            symbol: "BTC-USD".to_string(),
            side,
            price: price.map(|p| Price::from_integer(p).unwrap()),
            quantity: qty(quantity),
        };
        let mut order = request.into_order(Arc::from("BTC-USD"), 1, Utc::now());
        order.apply(OrderStateTransition::Accept).unwrap();
        order
    }

    #[test]
    fn test_zero_or_absent_price_is_market() {
        let mut request = OrderRequest::market(OrderId::new(), "BTC-USD", Side::Buy, qty(1));
        assert_eq!(request.order_type(), OrderType::Market);

        request.price = Some(Price::ZERO);
        assert_eq!(request.order_type(), OrderType::Market);

        let order = request.into_order(Arc::from("BTC-USD"), 7, Utc::now());
        assert!(order.price.is_none());
        assert_eq!(order.sequence, 7);
        assert_eq!(order.state(), OrderState::Pending);
    }

    #[test]
    fn test_fill_updates_state() {
        let mut order = accepted(Side::Buy, Some(100), 10);

        assert!(order.fill(qty(3)));
        assert_eq!(order.remaining_quantity(), qty(7));
        assert_eq!(order.filled_quantity(), qty(3));
        assert_eq!(order.state(), OrderState::PartiallyFilled);

        assert!(order.fill(qty(7)));
        assert!(order.is_filled());
        assert_eq!(order.state(), OrderState::Filled);
    }

    #[test]
    fn test_overfill_protection() {
        let mut order = accepted(Side::Sell, Some(100), 5);

        assert!(!order.fill(qty(10)));
        assert!(!order.fill(Quantity::ZERO));
        assert_eq!(order.remaining_quantity(), qty(5));
        assert_eq!(order.state(), OrderState::Accepted);
    }

    #[test]
    fn test_terminal_orders_reject_transitions() {
        let mut order = accepted(Side::Buy, Some(100), 1);
        order.apply(OrderStateTransition::Cancel).unwrap();

        assert!(order.state().is_terminal());
        assert!(!order.state().can_be_cancelled());
        assert!(order.apply(OrderStateTransition::Cancel).is_err());
        assert!(!order.fill(qty(1)));
    }
}
