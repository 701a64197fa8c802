// ============================================================================
// Matching Engine
// One symbol: sequenced ingestion, single-threaded matching, published views
// ============================================================================

use crate::domain::order::state::OrderStateTransition;
use crate::domain::{
    Disposition, EngineConfig, MatchingResult, Order, OrderBook, OrderBookSnapshot, OrderId,
    OrderRequest, OrderType, Trade,
};
use crate::engine::publisher::{Publisher, PublisherStats, RetryPolicy};
use crate::engine::sequencer::{sequencer, SequenceConsumer, Sequenced, Sequencer, SequencerFull};
use crate::engine::snapshot::{snapshot_channel, SnapshotReader, SnapshotWriter};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::interfaces::{EventHandler, MatchingAlgorithm, OrderEvent};
use crate::numeric::Quantity;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

/// How long an idle consumer sleeps before re-polling the ring
const IDLE_PARK: Duration = Duration::from_millis(1);

/// Events travelling through the sequencer
enum Command {
    Submit {
        request: OrderRequest,
        received_at: DateTime<Utc>,
        reply: Sender<EngineResult<MatchingResult>>,
    },
    Cancel {
        order_id: OrderId,
        reply: Sender<EngineResult<CancelAck>>,
    },
    Shutdown,
}

// ============================================================================
// Caller-facing types
// ============================================================================

/// Handle to the outcome of a sequenced submission or cancel
#[derive(Debug)]
pub struct Ticket<T> {
    sequence: u64,
    symbol: Arc<str>,
    receiver: Receiver<EngineResult<T>>,
}

impl<T> Ticket<T> {
    /// Sequence number assigned at ingestion
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Block until the consumer has processed the event.
    pub fn wait(self) -> EngineResult<T> {
        self.receiver.recv().unwrap_or_else(|_| Err(self.closed()))
    }

    /// The outcome if it is already available
    pub fn try_wait(&self) -> Option<EngineResult<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.closed())),
        }
    }

    fn closed(&self) -> EngineError {
        EngineError::EngineClosed {
            symbol: self.symbol.to_string(),
        }
    }
}

/// Acknowledgement of a processed cancel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelAck {
    /// Sequence of the cancel event itself
    pub sequence: u64,
    /// The order as it left the book, in state `Cancelled`
    pub order: Order,
}

impl CancelAck {
    pub fn order_id(&self) -> OrderId {
        self.order.order_id
    }

    /// Quantity that was still open when the cancel was applied
    pub fn remaining_quantity(&self) -> Quantity {
        self.order.remaining_quantity()
    }
}

/// Point-in-time engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Submissions and cancels refused with `EngineBusy`
    pub busy: u64,
    pub trades: u64,
    pub cancels: u64,
    /// Last sequence the consumer applied
    pub last_sequence: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    busy: AtomicU64,
    trades: AtomicU64,
    cancels: AtomicU64,
    last_sequence: AtomicU64,
}

/// State shared between the caller-facing handle and the consumer thread
struct Shared {
    paused: AtomicBool,
    /// Set by the consumer once it has stopped draining
    halted: AtomicBool,
    closed: AtomicBool,
    /// Set when the consumer died; implies `closed` and `halted`
    failed: AtomicBool,
    /// Ring refused the last submission; cleared by the next accepted one
    saturated: AtomicBool,
    /// Producers between their closed-check and their publish
    in_flight: AtomicUsize,
    counters: Counters,
    trace: Option<Mutex<Vec<u64>>>,
}

// ============================================================================
// Engine
// ============================================================================

/// Matching engine for a single symbol.
///
/// Any number of threads may submit; a dedicated consumer thread owns the
/// order book and applies events strictly in sequence order. Queries are
/// served from the last published snapshot and never touch the book.
pub struct Engine {
    symbol: Arc<str>,
    config: EngineConfig,
    sequencer: Sequencer<Command>,
    snapshots: SnapshotReader,
    shared: Arc<Shared>,
    publisher_stats: Arc<PublisherStats>,
    consumer_thread: Thread,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Validate `config`, pre-allocate the ring and start the consumer and
    /// publisher threads.
    pub fn start(
        config: EngineConfig,
        algorithm: Box<dyn MatchingAlgorithm>,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::Config)?;

        let symbol: Arc<str> = Arc::from(config.symbol.as_str());
        let (producer, consumer) = sequencer(config.ring_capacity);
        let (writer, reader) = snapshot_channel(
            &config.symbol,
            config.snapshot_depth,
            config.snapshot_interval,
            config.recent_trades_capacity,
        );
        let publisher = Publisher::spawn(
            &config.symbol,
            handlers,
            RetryPolicy {
                max_attempts: config.publish_max_attempts,
                backoff: config.publish_retry_backoff,
            },
        )?;
        let publisher_stats = publisher.stats();

        let shared = Arc::new(Shared {
            paused: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            saturated: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            counters: Counters::default(),
            trace: config.record_trace.then(|| Mutex::new(Vec::new())),
        });

        tracing::info!(
            symbol = %symbol,
            algorithm = algorithm.name(),
            ring_capacity = config.ring_capacity,
            "starting matching engine"
        );

        let core = EngineCore {
            book: OrderBook::new(Arc::clone(&symbol)),
            symbol: Arc::clone(&symbol),
            algorithm,
            consumer,
            snapshots: writer,
            publisher,
            shared: Arc::clone(&shared),
            consumer_core: config.consumer_core,
            last_sequence: 0,
        };

        let handle = thread::Builder::new()
            .name(format!("engine-{symbol}"))
            .spawn(move || core.run())
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            symbol,
            config,
            sequencer: producer,
            snapshots: reader,
            shared,
            publisher_stats,
            consumer_thread: handle.thread().clone(),
            consumer: Mutex::new(Some(handle)),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and sequence an order without waiting for it to be matched.
    pub fn submit(&self, request: OrderRequest) -> EngineResult<Ticket<MatchingResult>> {
        if let Err(e) = self.validate(&request) {
            self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        let (reply, receiver) = channel::bounded(1);
        let sequence = self.enqueue(Command::Submit {
            request,
            received_at: Utc::now(),
            reply,
        })?;

        Ok(self.ticket(sequence, receiver))
    }

    /// Submit and wait for the matching outcome.
    pub fn submit_order(&self, request: OrderRequest) -> EngineResult<MatchingResult> {
        self.submit(request)?.wait()
    }

    /// Sequence a cancel without waiting for it to be applied.
    pub fn cancel(&self, order_id: OrderId) -> EngineResult<Ticket<CancelAck>> {
        let (reply, receiver) = channel::bounded(1);
        let sequence = self.enqueue(Command::Cancel { order_id, reply })?;
        Ok(self.ticket(sequence, receiver))
    }

    /// Cancel and wait for the acknowledgement.
    ///
    /// Fails with `OrderNotFound` when the order is not resting at the
    /// cancel's sequence (unknown, filled, or already cancelled).
    pub fn cancel_order(&self, order_id: OrderId) -> EngineResult<CancelAck> {
        self.cancel(order_id)?.wait()
    }

    /// Top `depth` levels per side from the last published snapshot
    pub fn get_order_book(&self, depth: usize) -> OrderBookSnapshot {
        self.snapshots.order_book(depth)
    }

    /// Up to `limit` trades, most recent first
    pub fn get_recent_trades(&self, limit: usize) -> Vec<Trade> {
        self.snapshots.recent_trades(limit)
    }

    /// Halt matching. Submissions are still sequenced until the ring fills.
    ///
    /// Returns once the consumer has stopped; nothing sequenced after this
    /// call is applied before `resume`.
    pub fn pause(&self) {
        if self.shared.paused.swap(true, Ordering::AcqRel) {
            return;
        }
        self.consumer_thread.unpark();

        let backoff = Backoff::new();
        while !self.shared.halted.load(Ordering::Acquire) && !self.is_closed() {
            backoff.snooze();
        }
        tracing::info!(symbol = %self.symbol, "matching paused");
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            tracing::info!(symbol = %self.symbol, "matching resumed");
            self.consumer_thread.unpark();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// The consumer thread panicked; the engine refuses all further events.
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> EngineStats {
        let counters = &self.shared.counters;
        EngineStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            busy: counters.busy.load(Ordering::Relaxed),
            trades: counters.trades.load(Ordering::Relaxed),
            cancels: counters.cancels.load(Ordering::Relaxed),
            last_sequence: counters.last_sequence.load(Ordering::Acquire),
            events_delivered: self.publisher_stats.delivered(),
            events_dropped: self.publisher_stats.dropped(),
        }
    }

    /// Sequences applied so far, in processing order (empty unless
    /// `record_trace` is set)
    pub fn trace(&self) -> Vec<u64> {
        self.shared
            .trace
            .as_ref()
            .map(|trace| trace.lock().clone())
            .unwrap_or_default()
    }

    /// Stop accepting events, let the consumer apply everything already
    /// sequenced, publish a final snapshot and flush the publisher.
    ///
    /// Idempotent; also run on drop.
    pub fn shutdown(&self) {
        let Some(handle) = self.consumer.lock().take() else {
            return;
        };

        self.shared.closed.store(true, Ordering::SeqCst);
        let backoff = Backoff::new();
        while self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            backoff.snooze();
        }

        // A paused engine must still drain.
        self.shared.paused.store(false, Ordering::Release);

        let mut command = Command::Shutdown;
        loop {
            if self.is_failed() || handle.is_finished() {
                break;
            }
            match self.sequencer.publish(command) {
                Ok(_) => break,
                Err(SequencerFull(back)) => {
                    command = back;
                    self.consumer_thread.unpark();
                    thread::yield_now();
                },
            }
        }
        self.consumer_thread.unpark();

        if handle.join().is_err() {
            tracing::error!(symbol = %self.symbol, "consumer thread panicked");
        }
        tracing::info!(symbol = %self.symbol, "matching engine stopped");
    }

    fn validate(&self, request: &OrderRequest) -> Result<(), ValidationError> {
        if request.symbol != *self.symbol {
            return Err(ValidationError::SymbolMismatch {
                engine: self.symbol.to_string(),
                requested: request.symbol.clone(),
            });
        }

        if !request.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity(request.quantity));
        }

        if let Some(price) = request.price {
            if !price.is_zero() && !price.is_positive() {
                return Err(ValidationError::NonPositivePrice(price));
            }
        }

        if let (OrderType::Limit, Some(price), Some(tick_size)) =
            (request.order_type(), request.price, self.config.tick_size)
        {
            if !price.is_multiple_of(tick_size) {
                return Err(ValidationError::OffTick { price, tick_size });
            }
        }

        if let Some(lot_size) = self.config.lot_size {
            if !request.quantity.is_multiple_of(lot_size) {
                return Err(ValidationError::OffLot {
                    quantity: request.quantity,
                    lot_size,
                });
            }
        }

        Ok(())
    }

    fn enqueue(&self, command: Command) -> EngineResult<u64> {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = if self.shared.closed.load(Ordering::SeqCst) {
            Err(EngineError::EngineClosed {
                symbol: self.symbol.to_string(),
            })
        } else {
            self.sequencer.publish(command).map_err(|_| {
                self.shared.counters.busy.fetch_add(1, Ordering::Relaxed);
                // Only the transition into saturation is logged.
                if !self.shared.saturated.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        symbol = %self.symbol,
                        capacity = self.sequencer.capacity(),
                        "sequencer full, rejecting with ENGINE_BUSY"
                    );
                }
                EngineError::EngineBusy {
                    symbol: self.symbol.to_string(),
                }
            })
        };
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);

        if result.is_ok() {
            if self.shared.saturated.load(Ordering::Relaxed)
                && self.shared.saturated.swap(false, Ordering::Relaxed)
            {
                tracing::info!(
                    symbol = %self.symbol,
                    busy = self.shared.counters.busy.load(Ordering::Relaxed),
                    "sequencer accepting again"
                );
            }
            self.consumer_thread.unpark();
        }
        result
    }

    fn ticket<T>(&self, sequence: u64, receiver: Receiver<EngineResult<T>>) -> Ticket<T> {
        Ticket {
            sequence,
            symbol: Arc::clone(&self.symbol),
            receiver,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Everything the consumer thread owns exclusively
struct EngineCore {
    symbol: Arc<str>,
    book: OrderBook,
    algorithm: Box<dyn MatchingAlgorithm>,
    consumer: SequenceConsumer<Command>,
    snapshots: SnapshotWriter,
    publisher: Publisher,
    shared: Arc<Shared>,
    consumer_core: Option<usize>,
    last_sequence: u64,
}

impl EngineCore {
    fn run(mut self) {
        if let Some(core) = self.consumer_core {
            if !crate::utils::pin_current_thread_to_core(core) {
                tracing::warn!(symbol = %self.symbol, core, "could not pin consumer thread");
            }
        }

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.drain())) {
            self.fail_closed();
            panic::resume_unwind(payload);
        }

        self.snapshots.publish(&self.book, self.last_sequence);
        self.publisher.close();
        tracing::debug!(
            symbol = %self.symbol,
            last_sequence = self.last_sequence,
            resting = self.book.len(),
            "consumer drained"
        );
    }

    /// Apply events in sequence order until the shutdown command.
    fn drain(&mut self) {
        let backoff = Backoff::new();
        let mut halted = false;
        loop {
            if self.shared.paused.load(Ordering::Acquire) {
                if !halted {
                    halted = true;
                    self.snapshots.flush(&self.book, self.last_sequence);
                    self.shared.halted.store(true, Ordering::Release);
                }
                thread::park_timeout(IDLE_PARK);
                continue;
            }
            if halted {
                halted = false;
                self.shared.halted.store(false, Ordering::Release);
            }

            let Some(Sequenced { sequence, event }) = self.consumer.try_consume() else {
                self.snapshots.flush(&self.book, self.last_sequence);
                if backoff.is_completed() {
                    thread::park_timeout(IDLE_PARK);
                } else {
                    backoff.snooze();
                }
                continue;
            };
            backoff.reset();

            match event {
                Command::Submit {
                    request,
                    received_at,
                    reply,
                } => {
                    let outcome = self.apply_submit(sequence, request, received_at);
                    // The caller may have dropped its ticket.
                    let _ = reply.send(outcome);
                },
                Command::Cancel { order_id, reply } => {
                    let outcome = self.apply_cancel(sequence, order_id);
                    let _ = reply.send(outcome);
                },
                Command::Shutdown => break,
            }
        }
    }

    /// After a panic the book can no longer be trusted: refuse new events,
    /// release anyone waiting on the pause handshake, and drop every event
    /// still in the ring so its ticket resolves to `EngineClosed`.
    fn fail_closed(&mut self) {
        tracing::error!(
            symbol = %self.symbol,
            last_sequence = self.last_sequence,
            "consumer thread panicked, closing engine"
        );

        self.shared.failed.store(true, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.halted.store(true, Ordering::Release);

        let backoff = Backoff::new();
        while self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            backoff.snooze();
        }
        while self.consumer.try_consume().is_some() {}
    }

    fn advance(&mut self, sequence: u64) {
        assert!(
            sequence > self.last_sequence,
            "sequence went backwards: {} after {}",
            sequence,
            self.last_sequence
        );
        self.last_sequence = sequence;
        self.shared
            .counters
            .last_sequence
            .store(sequence, Ordering::Release);
        if let Some(trace) = &self.shared.trace {
            trace.lock().push(sequence);
        }
    }

    fn apply_submit(
        &mut self,
        sequence: u64,
        request: OrderRequest,
        received_at: DateTime<Utc>,
    ) -> EngineResult<MatchingResult> {
        self.advance(sequence);

        let order = request.into_order(Arc::clone(&self.symbol), sequence, received_at);
        let result = self.algorithm.execute(order, &mut self.book);

        let counters = &self.shared.counters;
        if result.disposition.is_rejected() {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.accepted.fetch_add(1, Ordering::Relaxed);
            counters
                .trades
                .fetch_add(result.trades.len() as u64, Ordering::Relaxed);
        }

        self.snapshots.record_trades(&result.trades);
        self.snapshots.on_mutation(&self.book, sequence);
        self.publisher.publish(lifecycle_events(&result));

        match &result.disposition {
            Disposition::Rejected { reason } => Err(EngineError::Rejected {
                order_id: result.order.order_id,
                sequence,
                reason: reason.clone(),
            }),
            _ => Ok(result),
        }
    }

    fn apply_cancel(&mut self, sequence: u64, order_id: OrderId) -> EngineResult<CancelAck> {
        self.advance(sequence);

        let Some(mut order) = self.book.cancel(order_id) else {
            return Err(EngineError::OrderNotFound { order_id });
        };
        if let Err(e) = order.apply(OrderStateTransition::Cancel) {
            tracing::error!(order_id = %order_id, error = %e, "resting order in unexpected state");
        }

        self.shared.counters.cancels.fetch_add(1, Ordering::Relaxed);
        self.snapshots.on_mutation(&self.book, sequence);
        self.publisher.publish(vec![OrderEvent::OrderCancelled {
            order_id,
            sequence,
            remaining_quantity: order.remaining_quantity(),
            timestamp: Utc::now(),
        }]);

        Ok(CancelAck { sequence, order })
    }
}

/// Events describing one processed submission, in emission order
fn lifecycle_events(result: &MatchingResult) -> Vec<OrderEvent> {
    let order = &result.order;
    let timestamp = Utc::now();

    if let Disposition::Rejected { reason } = &result.disposition {
        return vec![OrderEvent::OrderRejected {
            order_id: order.order_id,
            sequence: order.sequence,
            reason: reason.clone(),
            timestamp,
        }];
    }

    let mut events = Vec::with_capacity(result.trades.len() + 3);
    events.push(OrderEvent::OrderAccepted {
        order_id: order.order_id,
        sequence: order.sequence,
        timestamp,
    });
    events.extend(
        result
            .trades
            .iter()
            .map(|trade| OrderEvent::OrderMatched {
                trade: trade.clone(),
            }),
    );

    let filled = order.filled_quantity();
    let remaining = order.remaining_quantity();

    match &result.disposition {
        Disposition::Filled => events.push(OrderEvent::OrderFilled {
            order_id: order.order_id,
            total_filled: filled,
            timestamp,
        }),
        Disposition::Resting | Disposition::PartiallyFilledResting => {
            if filled.is_positive() {
                events.push(OrderEvent::OrderPartiallyFilled {
                    order_id: order.order_id,
                    filled_quantity: filled,
                    remaining_quantity: remaining,
                    timestamp,
                });
            }
            if let Some(price) = order.price {
                events.push(OrderEvent::OrderAddedToBook {
                    order_id: order.order_id,
                    price,
                    quantity: remaining,
                    timestamp,
                });
            }
        },
        Disposition::MarketRemainderDiscarded => {
            if filled.is_positive() {
                events.push(OrderEvent::OrderPartiallyFilled {
                    order_id: order.order_id,
                    filled_quantity: filled,
                    remaining_quantity: remaining,
                    timestamp,
                });
            }
            events.push(OrderEvent::MarketRemainderDiscarded {
                order_id: order.order_id,
                discarded_quantity: remaining,
                timestamp,
            });
        },
        Disposition::RemainderCancelled { .. } => {
            events.push(OrderEvent::OrderPartiallyFilled {
                order_id: order.order_id,
                filled_quantity: filled,
                remaining_quantity: remaining,
                timestamp,
            });
            events.push(OrderEvent::OrderCancelled {
                order_id: order.order_id,
                sequence: order.sequence,
                remaining_quantity: remaining,
                timestamp,
            });
        },
        Disposition::Rejected { .. } => {},
    }

    events
}
