// ============================================================================
// Engine Configuration
// Per-symbol engine sizing, instrument constraints and publishing policy
// ============================================================================

use crate::numeric::{Price, Quantity};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default sequencer capacity (slots), pre-allocated at engine start
pub const DEFAULT_RING_CAPACITY: usize = 1 << 16;

/// Default number of levels per side kept in the published snapshot
pub const DEFAULT_SNAPSHOT_DEPTH: usize = 50;

/// Default upper bound on mutations between two snapshot publications
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 64;

pub const DEFAULT_RECENT_TRADES: usize = 1_000;

/// Configuration for one symbol's engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// The traded symbol (e.g., "BTC-USD", "AAPL")
    pub symbol: String,

    /// Sequencer slots; must be a power of two
    pub ring_capacity: usize,

    /// Levels per side captured in each published snapshot
    pub snapshot_depth: usize,

    /// Publish a snapshot at least every N processed events, and whenever
    /// the sequencer runs dry
    pub snapshot_interval: usize,

    /// Size of the recent-trades ring served to readers
    pub recent_trades_capacity: usize,

    /// Optional: minimum price increment
    pub tick_size: Option<Price>,

    /// Optional: minimum quantity increment
    pub lot_size: Option<Quantity>,

    /// Delivery attempts per collaborator before an event is dropped
    pub publish_max_attempts: u32,

    /// Pause between delivery attempts
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub publish_retry_backoff: Duration,

    /// Optional: CPU core for the consumer thread (`numa` feature)
    pub consumer_core: Option<usize>,

    /// Keep the list of processed sequence numbers (diagnostics and tests)
    pub record_trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            ring_capacity: DEFAULT_RING_CAPACITY,
            snapshot_depth: DEFAULT_SNAPSHOT_DEPTH,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            recent_trades_capacity: DEFAULT_RECENT_TRADES,
            tick_size: None,
            lot_size: None,
            publish_max_attempts: 3,
            publish_retry_backoff: Duration::from_millis(1),
            consumer_core: None,
            record_trace: false,
        }
    }
}

impl EngineConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    pub fn with_snapshot_depth(mut self, depth: usize) -> Self {
        self.snapshot_depth = depth;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: usize) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_recent_trades_capacity(mut self, capacity: usize) -> Self {
        self.recent_trades_capacity = capacity;
        self
    }

    pub fn with_tick_size(mut self, tick: Price) -> Self {
        self.tick_size = Some(tick);
        self
    }

    pub fn with_lot_size(mut self, lot: Quantity) -> Self {
        self.lot_size = Some(lot);
        self
    }

    pub fn with_publish_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.publish_max_attempts = max_attempts;
        self.publish_retry_backoff = backoff;
        self
    }

    pub fn with_consumer_core(mut self, core: usize) -> Self {
        self.consumer_core = Some(core);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }

    /// Same settings, different symbol (router templates)
    pub fn for_symbol(&self, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..self.clone()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.is_empty() {
            return Err("Symbol cannot be empty".to_string());
        }

        if self.ring_capacity < 2 || !self.ring_capacity.is_power_of_two() {
            return Err(format!(
                "Ring capacity must be a power of two >= 2, got {}",
                self.ring_capacity
            ));
        }

        if self.snapshot_interval == 0 {
            return Err("Snapshot interval must be at least 1".to_string());
        }

        if self.recent_trades_capacity == 0 {
            return Err("Recent trades capacity must be at least 1".to_string());
        }

        if let Some(tick) = self.tick_size {
            if !tick.is_positive() {
                return Err("Tick size must be positive".to_string());
            }
        }

        if let Some(lot) = self.lot_size {
            if !lot.is_positive() {
                return Err("Lot size must be positive".to_string());
            }
        }

        if self.publish_max_attempts == 0 {
            return Err("At least one publish attempt is required".to_string());
        }

        Ok(())
    }

    /// Parse a JSON configuration document.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Preset Configurations
// ============================================================================

impl EngineConfig {
    /// Cash equities: $0.01 tick, whole-share lots
    pub fn equities(symbol: impl Into<String>) -> Self {
        Self::new(symbol)
            .with_tick_size(Price::from_raw(Price::SCALE / 100))
            .with_lot_size(Quantity::ONE)
    }

    /// Crypto spot: no tick or lot constraint, deeper snapshots
    pub fn crypto(symbol: impl Into<String>) -> Self {
        Self::new(symbol).with_snapshot_depth(100)
    }
}

#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
