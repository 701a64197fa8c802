// ============================================================================
// Engine Router
// Explicit symbol -> engine map; one engine (and consumer thread) per symbol
// ============================================================================

use crate::domain::{EngineConfig, MatchingResult, OrderBookSnapshot, OrderId, OrderRequest, Trade};
use crate::engine::matching_engine::{CancelAck, Engine, Ticket};
use crate::engine::PriceTimePriority;
use crate::error::{EngineError, EngineResult};
use crate::interfaces::{EventHandler, MatchingAlgorithm};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Builds the matching algorithm for a newly started engine
pub type AlgorithmFactory = Arc<dyn Fn() -> Box<dyn MatchingAlgorithm> + Send + Sync>;

/// Routes calls to the engine owning the symbol.
///
/// Engines are created from a template configuration, either up front
/// (`with_instruments`) or on the first order for an unseen symbol.
pub struct EngineRouter {
    template: EngineConfig,
    algorithm: AlgorithmFactory,
    handlers: Vec<Arc<dyn EventHandler>>,
    engines: RwLock<HashMap<String, Arc<Engine>>>,
    create_on_demand: bool,
    closed: AtomicBool,
}

impl EngineRouter {
    /// Router that starts an engine per symbol on first use.
    pub fn new(template: EngineConfig) -> Self {
        Self {
            template,
            algorithm: Arc::new(|| -> Box<dyn MatchingAlgorithm> {
                Box::new(PriceTimePriority::new())
            }),
            handlers: Vec::new(),
            engines: RwLock::new(HashMap::new()),
            create_on_demand: true,
            closed: AtomicBool::new(false),
        }
    }

    /// Collaborator attached to every engine started afterwards
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_algorithm(mut self, factory: AlgorithmFactory) -> Self {
        self.algorithm = factory;
        self
    }

    /// Start engines for a fixed instrument list; other symbols are refused
    /// with `UnknownSymbol`.
    pub fn with_instruments<I, S>(mut self, symbols: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_on_demand = false;
        {
            let mut engines = self.engines.write();
            for symbol in symbols {
                let symbol = symbol.into();
                if engines.contains_key(&symbol) {
                    continue;
                }
                let engine = self.start_engine(&symbol)?;
                engines.insert(symbol, engine);
            }
        }
        Ok(self)
    }

    /// Engine for `symbol`, starting it if the router creates on demand.
    pub fn engine(&self, symbol: &str) -> EngineResult<Arc<Engine>> {
        if let Some(engine) = self.existing(symbol) {
            return Ok(engine);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::EngineClosed {
                symbol: symbol.to_string(),
            });
        }
        if !self.create_on_demand {
            return Err(EngineError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }

        let mut engines = self.engines.write();
        if let Some(engine) = engines.get(symbol) {
            return Ok(Arc::clone(engine));
        }
        // shutdown() sets the flag before collecting the map under the lock.
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::EngineClosed {
                symbol: symbol.to_string(),
            });
        }
        let engine = self.start_engine(symbol)?;
        engines.insert(symbol.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Symbols with a running engine, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.engines.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn submit(&self, request: OrderRequest) -> EngineResult<Ticket<MatchingResult>> {
        self.engine(&request.symbol)?.submit(request)
    }

    pub fn submit_order(&self, request: OrderRequest) -> EngineResult<MatchingResult> {
        self.engine(&request.symbol)?.submit_order(request)
    }

    pub fn cancel_order(&self, symbol: &str, order_id: OrderId) -> EngineResult<CancelAck> {
        self.known(symbol)?.cancel_order(order_id)
    }

    pub fn get_order_book(&self, symbol: &str, depth: usize) -> EngineResult<OrderBookSnapshot> {
        Ok(self.known(symbol)?.get_order_book(depth))
    }

    pub fn get_recent_trades(&self, symbol: &str, limit: usize) -> EngineResult<Vec<Trade>> {
        Ok(self.known(symbol)?.get_recent_trades(limit))
    }

    /// Drain and stop every engine. Later calls fail with `EngineClosed`.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let engines: Vec<Arc<Engine>> = self.engines.read().values().cloned().collect();
        for engine in &engines {
            engine.shutdown();
        }
        tracing::info!(engines = engines.len(), "router shut down");
    }

    fn existing(&self, symbol: &str) -> Option<Arc<Engine>> {
        self.engines.read().get(symbol).cloned()
    }

    /// Queries and cancels never start an engine.
    fn known(&self, symbol: &str) -> EngineResult<Arc<Engine>> {
        self.existing(symbol).ok_or_else(|| EngineError::UnknownSymbol {
            symbol: symbol.to_string(),
        })
    }

    fn start_engine(&self, symbol: &str) -> EngineResult<Arc<Engine>> {
        let engine = Engine::start(
            self.template.for_symbol(symbol),
            (self.algorithm)(),
            self.handlers.clone(),
        )?;
        tracing::info!(symbol, "engine created");
        Ok(Arc::new(engine))
    }
}

impl Drop for EngineRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Disposition, Side};
    use crate::numeric::{Price, Quantity};

    fn order(symbol: &str, side: Side, price: i64) -> OrderRequest {
        OrderRequest::limit(
            OrderId::new(),
            symbol,
            side,
            Price::from_integer(price).unwrap(),
            Quantity::ONE,
        )
    }

    #[test]
    fn test_engines_created_on_first_order() {
        let router = EngineRouter::new(EngineConfig::default().with_ring_capacity(64));
        assert!(router.symbols().is_empty());

        router.submit_order(order("BTC-USD", Side::Sell, 100)).unwrap();
        router.submit_order(order("ETH-USD", Side::Sell, 10)).unwrap();

        assert_eq!(router.symbols(), vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(router.engine("ETH-USD").unwrap().config().ring_capacity, 64);
    }

    #[test]
    fn test_symbols_are_isolated() {
        let router = EngineRouter::new(EngineConfig::default());

        router.submit_order(order("BTC-USD", Side::Sell, 100)).unwrap();
        let buy = router.submit_order(order("ETH-USD", Side::Buy, 100)).unwrap();

        assert_eq!(buy.disposition, Disposition::Resting);
        // Each engine numbers its own events.
        assert_eq!(buy.sequence(), 1);
    }

    #[test]
    fn test_fixed_instrument_list() {
        let router = EngineRouter::new(EngineConfig::default())
            .with_instruments(["AAPL", "MSFT"])
            .unwrap();

        assert!(router.submit_order(order("AAPL", Side::Buy, 150)).is_ok());
        assert!(matches!(
            router.submit_order(order("TSLA", Side::Buy, 150)),
            Err(EngineError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn test_queries_do_not_create_engines() {
        let router = EngineRouter::new(EngineConfig::default());

        assert!(matches!(
            router.get_order_book("BTC-USD", 10),
            Err(EngineError::UnknownSymbol { .. })
        ));
        assert!(router.cancel_order("BTC-USD", OrderId::new()).is_err());
        assert!(router.symbols().is_empty());
    }

    #[test]
    fn test_shutdown_closes_router() {
        let router = EngineRouter::new(EngineConfig::default());
        router.submit_order(order("BTC-USD", Side::Sell, 100)).unwrap();

        router.shutdown();

        assert_eq!(router.get_order_book("BTC-USD", 5).unwrap().asks.len(), 1);
        assert!(matches!(
            router.submit_order(order("BTC-USD", Side::Buy, 90)),
            Err(EngineError::EngineClosed { .. })
        ));
        assert!(matches!(
            router.submit_order(order("ETH-USD", Side::Buy, 90)),
            Err(EngineError::EngineClosed { .. })
        ));
    }

    #[test]
    fn test_no_engine_outlives_concurrent_shutdown() {
        let router = EngineRouter::new(EngineConfig::default().with_ring_capacity(64));

        std::thread::scope(|scope| {
            for t in 0..4 {
                let router = &router;
                scope.spawn(move || {
                    for i in 0..10 {
                        let symbol = format!("SYM-{t}-{i}");
                        match router.submit_order(order(&symbol, Side::Buy, 100)) {
                            Ok(_) | Err(EngineError::EngineClosed { .. }) => {},
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                });
            }
            router.shutdown();
        });

        for symbol in router.symbols() {
            assert!(router.known(&symbol).unwrap().is_closed(), "{symbol} still open");
        }
    }
}
