// ============================================================================
// Trade Domain Model
// ============================================================================

use crate::numeric::{NumericResult, Price, Quantity};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::{OrderId, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique trade identifier; downstream collaborators deduplicate on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TradeId(Uuid);

impl TradeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable record of one execution between an aggressor and a resting order
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    pub trade_id: TradeId,

    pub symbol: Arc<str>,

    pub buy_order_id: OrderId,

    pub sell_order_id: OrderId,

    /// Always the resting order's price
    pub price: Price,

    pub quantity: Quantity,

    /// Sequence of the inbound event that triggered the execution
    pub sequence: u64,

    /// Side of the incoming (aggressing) order
    pub aggressor_side: Side,

    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Build a trade, assigning buy/sell ids from the aggressor's side.
    pub fn new(
        symbol: Arc<str>,
        aggressor_id: OrderId,
        aggressor_side: Side,
        resting_id: OrderId,
        price: Price,
        quantity: Quantity,
        sequence: u64,
    ) -> Self {
        let (buy_order_id, sell_order_id) = match aggressor_side {
            Side::Buy => (aggressor_id, resting_id),
            Side::Sell => (resting_id, aggressor_id),
        };

        Self {
            trade_id: TradeId::new(),
            symbol,
            buy_order_id,
            sell_order_id,
            price,
            quantity,
            sequence,
            aggressor_side,
            timestamp: Utc::now(),
        }
    }

    /// Order id of the resting (maker) side
    pub fn resting_order_id(&self) -> OrderId {
        match self.aggressor_side {
            Side::Buy => self.sell_order_id,
            Side::Sell => self.buy_order_id,
        }
    }

    /// Price × quantity; multiplication can overflow.
    pub fn notional_value(&self) -> NumericResult<Price> {
        self.price.checked_mul(self.quantity)
    }
}
