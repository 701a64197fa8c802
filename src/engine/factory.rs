// ============================================================================
// Engine Factory
// Creates matching engines with proper configuration
// ============================================================================

use crate::domain::EngineConfig;
use crate::engine::{Engine, PriceTimePriority};
use crate::error::EngineResult;
use crate::interfaces::{EventHandler, MatchingAlgorithm};
use crate::numeric::{Price, Quantity};
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Starts a price/time engine from configuration
///
/// # Example
/// ```
/// use matching_core::prelude::*;
/// use matching_core::engine::factory::create_from_config;
///
/// let engine = create_from_config(EngineConfig::equities("AAPL"), Vec::new()).unwrap();
/// assert_eq!(engine.symbol(), "AAPL");
/// ```
pub fn create_from_config(
    config: EngineConfig,
    handlers: Vec<Arc<dyn EventHandler>>,
) -> EngineResult<Engine> {
    Engine::start(config, Box::new(PriceTimePriority::new()), handlers)
}

// ============================================================================
// Builder Pattern for Advanced Configuration
// ============================================================================

/// Builder for creating matching engines with fluent API
///
/// # Example
/// ```
/// use matching_core::prelude::*;
/// use rust_decimal::Decimal;
/// use std::sync::Arc;
///
/// let engine = EngineBuilder::new("BTC-USD")
///     .price_time_matching()
///     .with_tick_size(Decimal::new(1, 2))
///     .with_handler(Arc::new(NoOpEventHandler))
///     .build()
///     .unwrap();
/// assert_eq!(engine.symbol(), "BTC-USD");
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    algorithm: Option<Box<dyn MatchingAlgorithm>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    tick_size: Option<rust_decimal::Decimal>,
    lot_size: Option<rust_decimal::Decimal>,
}

impl EngineBuilder {
    /// Create a new builder for the specified symbol
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::from_config(EngineConfig::new(symbol))
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            algorithm: None,
            handlers: Vec::new(),
            tick_size: None,
            lot_size: None,
        }
    }

    // ========================================================================
    // Matching Algorithm Configuration
    // ========================================================================

    /// Configure price/time priority (FIFO) matching (default)
    pub fn price_time_matching(mut self) -> Self {
        self.algorithm = Some(Box::new(PriceTimePriority::new()));
        self
    }

    pub fn with_algorithm(mut self, algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    // ========================================================================
    // Additional Configuration
    // ========================================================================

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.config.ring_capacity = capacity;
        self
    }

    pub fn with_snapshot_depth(mut self, depth: usize) -> Self {
        self.config.snapshot_depth = depth;
        self
    }

    /// Set price tick size; must be representable with 9 decimal places
    pub fn with_tick_size(mut self, tick_size: rust_decimal::Decimal) -> Self {
        self.tick_size = Some(tick_size);
        self
    }

    /// Set lot size; must be representable with 9 decimal places
    pub fn with_lot_size(mut self, lot_size: rust_decimal::Decimal) -> Self {
        self.lot_size = Some(lot_size);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    // ========================================================================
    // Preset Configurations
    // ========================================================================

    pub fn equities(symbol: impl Into<String>) -> Self {
        Self::from_config(EngineConfig::equities(symbol))
    }

    pub fn crypto(symbol: impl Into<String>) -> Self {
        Self::from_config(EngineConfig::crypto(symbol))
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Start the engine
    pub fn build(mut self) -> EngineResult<Engine> {
        if let Some(tick) = self.tick_size {
            self.config.tick_size = Some(Price::from_decimal(tick)?);
        }
        if let Some(lot) = self.lot_size {
            self.config.lot_size = Some(Quantity::from_decimal(lot)?);
        }

        let algorithm = self
            .algorithm
            .unwrap_or_else(|| Box::new(PriceTimePriority::new()));
        Engine::start(self.config, algorithm, self.handlers)
    }

    /// Get the configuration without building (for inspection)
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::numeric::NumericError;
    use rust_decimal::Decimal;

    #[test]
    fn test_create_price_time_engine() {
        let engine = create_from_config(EngineConfig::equities("AAPL"), Vec::new()).unwrap();
        assert_eq!(engine.symbol(), "AAPL");
        assert_eq!(engine.config().lot_size, Some(Quantity::ONE));
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let result = create_from_config(EngineConfig::new("AAPL").with_ring_capacity(100), Vec::new());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_builder_converts_decimal_constraints() {
        let engine = EngineBuilder::new("BTC-USD")
            .with_tick_size(Decimal::new(5, 1))
            .with_lot_size(Decimal::new(1, 3))
            .with_ring_capacity(1024)
            .build()
            .unwrap();

        assert_eq!(engine.config().tick_size, Some("0.5".parse().unwrap()));
        assert_eq!(engine.config().lot_size, Some("0.001".parse().unwrap()));
        assert_eq!(engine.config().ring_capacity, 1024);
    }

    #[test]
    fn test_builder_rejects_unrepresentable_tick() {
        let result = EngineBuilder::new("BTC-USD")
            .with_tick_size(Decimal::new(1, 12))
            .build();

        assert!(matches!(
            result,
            Err(EngineError::Numeric(NumericError::PrecisionLoss))
        ));
    }

    #[test]
    fn test_preset_builders() {
        let crypto = EngineBuilder::crypto("ETH-USD").build().unwrap();
        assert_eq!(crypto.config().snapshot_depth, 100);

        let equities = EngineBuilder::equities("MSFT").price_time_matching();
        assert!(equities.config().tick_size.is_some());
    }
}
