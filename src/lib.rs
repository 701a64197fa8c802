// ============================================================================
// Matching Core Library
// Per-symbol sequenced order matching with price/time priority
// ============================================================================

//! # Matching Core
//!
//! A per-symbol order matching engine: many threads submit, one thread per
//! symbol matches.
//!
//! ## Features
//!
//! - **Pre-allocated ring sequencer** assigning every event a gapless sequence
//!   number; a full ring fails fast with `EngineBusy`
//! - **Single-writer order book** with price/time priority and exact
//!   fixed-point prices and quantities
//! - **Published snapshots** for order book and recent-trade queries that
//!   never contend with matching
//! - **Asynchronous event publisher** with at-least-once delivery to
//!   settlement, persistence and market-data collaborators
//!
//! ## Example
//!
//! ```rust
//! use matching_core::prelude::*;
//! use matching_core::numeric::{Price, Quantity};
//!
//! let engine = EngineBuilder::new("BTC-USD").build().unwrap();
//!
//! let sell = OrderRequest::limit(
//!     OrderId::new(),
//!     "BTC-USD",
//!     Side::Sell,
//!     Price::from_integer(50_000).unwrap(),
//!     Quantity::from_integer(2).unwrap(),
//! );
//! engine.submit_order(sell).unwrap();
//!
//! let buy = OrderRequest::market(
//!     OrderId::new(),
//!     "BTC-USD",
//!     Side::Buy,
//!     Quantity::from_integer(1).unwrap(),
//! );
//! let result = engine.submit_order(buy).unwrap();
//! assert_eq!(result.trades.len(), 1);
//!
//! engine.shutdown();
//! let snapshot = engine.get_order_book(10);
//! println!("Best ask: {:?}", snapshot.best_ask());
//! println!("Spread: {:?}", snapshot.spread);
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod numeric;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::order::state::{OrderState, OrderStateTransition};
    pub use crate::domain::{
        Disposition, EngineConfig, MatchingResult, Order, OrderBook, OrderBookSnapshot, OrderId,
        OrderRequest, OrderType, Side, Trade, TradeId,
    };
    pub use crate::engine::{
        create_from_config, CancelAck, Engine, EngineBuilder, EngineRouter, EngineStats,
        PriceTimePriority, Ticket,
    };
    pub use crate::error::{EngineError, EngineResult, ValidationError};
    pub use crate::interfaces::{
        EventHandler, InMemoryTradeLog, LoggingEventHandler, MatchingAlgorithm, NoOpEventHandler,
        OrderEvent, PublishError,
    };
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use crate::numeric::{Price, Quantity};
    use std::sync::Arc;

    #[test]
    fn test_end_to_end_matching() {
        let trade_log = Arc::new(InMemoryTradeLog::new());
        let engine = EngineBuilder::new("BTC-USD")
            .with_handler(trade_log.clone())
            .with_handler(Arc::new(LoggingEventHandler))
            .build()
            .unwrap();

        // Add sell order
        let sell = engine
            .submit_order(OrderRequest::limit(
                OrderId::new(),
                "BTC-USD",
                Side::Sell,
                Price::from_integer(50000).unwrap(),
                Quantity::from_integer(1).unwrap(),
            ))
            .unwrap();
        assert_eq!(sell.disposition, Disposition::Resting);

        // Add matching buy order
        let buy = engine
            .submit_order(OrderRequest::limit(
                OrderId::new(),
                "BTC-USD",
                Side::Buy,
                Price::from_integer(50000).unwrap(),
                Quantity::from_integer(1).unwrap(),
            ))
            .unwrap();

        // Verify trade occurred
        assert_eq!(buy.disposition, Disposition::Filled);
        assert_eq!(buy.order.state(), OrderState::Filled);
        assert_eq!(buy.trades[0].buy_order_id, buy.order.order_id);

        engine.shutdown();

        // Verify book is empty
        let snapshot = engine.get_order_book(10);
        assert_eq!(snapshot.bids.len(), 0);
        assert_eq!(snapshot.asks.len(), 0);
        assert_eq!(trade_log.len(), 1);
        assert_eq!(engine.get_recent_trades(5), trade_log.trades());
    }
}
