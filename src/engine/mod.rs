// ============================================================================
// Engine Module
// Matching algorithm, sequencer, engine runtime and routing
// ============================================================================

mod matching_engine;
mod price_time;
mod publisher;
mod router;
mod snapshot;

pub mod factory;
pub mod sequencer;

pub use factory::{create_from_config, EngineBuilder};
pub use matching_engine::{CancelAck, Engine, EngineStats, Ticket};
pub use price_time::PriceTimePriority;
pub use publisher::{Publisher, PublisherStats, RetryPolicy};
pub use router::{AlgorithmFactory, EngineRouter};
pub use sequencer::{sequencer, SequenceConsumer, Sequenced, Sequencer, SequencerFull};
pub use snapshot::{snapshot_channel, MarketView, SnapshotReader, SnapshotWriter};
