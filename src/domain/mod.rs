// ============================================================================
// Domain Models Module
// Orders, the book, trades and per-submission results
// ============================================================================

pub mod config;
pub mod matching_result;
pub mod order;
pub mod order_book;
pub mod trade;

pub use config::EngineConfig;
pub use matching_result::{Disposition, MatchingResult, Trades};
pub use order::{Order, OrderId, OrderRequest, OrderType, Side};
pub use order_book::{
    BookError, BookLevel, Decrement, OrderBook, OrderBookSide, OrderBookSnapshot, PriceLevel,
};
pub use trade::{Trade, TradeId};

// Re-export state machine
pub use order::state::{OrderState, OrderStateTransition};
