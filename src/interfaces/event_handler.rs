// ============================================================================
// Event Handler Interface
// Contract for collaborators that consume committed engine events
// ============================================================================

use crate::domain::{OrderId, Trade, TradeId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the matching engine, in sequence order
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderEvent {
    /// Order passed matching-time validation
    OrderAccepted {
        order_id: OrderId,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    OrderRejected {
        order_id: OrderId,
        sequence: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Order matched, trade generated
    OrderMatched { trade: Trade },

    OrderPartiallyFilled {
        order_id: OrderId,
        filled_quantity: Quantity,
        remaining_quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    OrderFilled {
        order_id: OrderId,
        total_filled: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Limit remainder now resting
    OrderAddedToBook {
        order_id: OrderId,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    OrderCancelled {
        order_id: OrderId,
        sequence: u64,
        remaining_quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Unfilled market order quantity dropped for lack of liquidity
    MarketRemainderDiscarded {
        order_id: OrderId,
        discarded_quantity: Quantity,
        timestamp: DateTime<Utc>,
    },
}

impl OrderEvent {
    pub fn trade(&self) -> Option<&Trade> {
        match self {
            OrderEvent::OrderMatched { trade } => Some(trade),
            _ => None,
        }
    }
}

/// A collaborator failed to take an event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator} rejected event: {reason}")]
pub struct PublishError {
    pub collaborator: String,
    pub reason: String,
}

impl PublishError {
    pub fn new(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }
}

/// Event handler trait for downstream collaborators (settlement,
/// persistence, market data).
///
/// Delivery is at-least-once: a handler may see the same event again after
/// reporting a failure, so it must be idempotent (trades by `trade_id`).
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn on_event(&self, event: &OrderEvent) -> Result<(), PublishError>;
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn name(&self) -> &str {
        "noop"
    }

    fn on_event(&self, _event: &OrderEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_event(&self, event: &OrderEvent) -> Result<(), PublishError> {
        tracing::debug!("Matching engine event: {:?}", event);
        Ok(())
    }
}

/// Append-only in-memory trade log, deduplicated by trade id
#[derive(Default)]
pub struct InMemoryTradeLog {
    inner: Mutex<TradeLogInner>,
}

#[derive(Default)]
struct TradeLogInner {
    trades: Vec<Trade>,
    seen: HashSet<TradeId>,
}

impl InMemoryTradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade; returns false for a redelivered trade id.
    pub fn append(&self, trade: &Trade) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(trade.trade_id) {
            return false;
        }
        inner.trades.push(trade.clone());
        true
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.inner.lock().trades.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventHandler for InMemoryTradeLog {
    fn name(&self) -> &str {
        "trade-log"
    }

    fn on_event(&self, event: &OrderEvent) -> Result<(), PublishError> {
        if let Some(trade) = event.trade() {
            self.append(trade);
        }
        Ok(())
    }
}
