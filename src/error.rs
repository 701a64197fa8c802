// ============================================================================
// Engine Errors
// Caller-facing failures of the submission and query paths
// ============================================================================

use crate::domain::OrderId;
use crate::numeric::{NumericError, Price, Quantity};
use thiserror::Error;

/// Why an order was refused before it reached the sequencer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Quantity),

    #[error("limit price must be positive, got {0}")]
    NonPositivePrice(Price),

    #[error("order for {requested} sent to the {engine} engine")]
    SymbolMismatch { engine: String, requested: String },

    #[error("price {price} is not a multiple of tick size {tick_size}")]
    OffTick { price: Price, tick_size: Price },

    #[error("quantity {quantity} is not a multiple of lot size {lot_size}")]
    OffLot { quantity: Quantity, lot_size: Quantity },
}

/// Errors returned by [`Engine`](crate::engine::Engine) and
/// [`EngineRouter`](crate::engine::EngineRouter) operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("order rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Sequenced, then refused by the matching thread; the book is untouched
    #[error("order {order_id} rejected at sequence {sequence}: {reason}")]
    Rejected {
        order_id: OrderId,
        sequence: u64,
        reason: String,
    },

    /// The sequencer is saturated; back off and retry
    #[error("engine busy: sequencer for {symbol} is full")]
    EngineBusy { symbol: String },

    /// Cancel of an unknown, filled or already cancelled order
    #[error("order {order_id} not found")]
    OrderNotFound { order_id: OrderId },

    #[error("engine for {symbol} is shut down")]
    EngineClosed { symbol: String },

    #[error("no engine for symbol {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("failed to start engine thread: {0}")]
    ThreadSpawn(String),

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

impl EngineError {
    /// Whether retrying the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::EngineBusy { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
