// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod event_handler;
mod matching_algorithm;

pub use event_handler::{
    EventHandler, InMemoryTradeLog, LoggingEventHandler, NoOpEventHandler, OrderEvent,
    PublishError,
};
pub use matching_algorithm::MatchingAlgorithm;
