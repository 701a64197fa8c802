// ============================================================================
// Event Publisher
// Delivers committed events to collaborators off the matching thread
// ============================================================================

use crate::error::{EngineError, EngineResult};
use crate::interfaces::{EventHandler, OrderEvent};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delivery counters, shared with the engine for stats
#[derive(Debug, Default)]
pub struct PublisherStats {
    delivered: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

impl PublisherStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Events a collaborator never accepted within the retry budget
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Retry policy for one collaborator delivery
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Background fan-out of event batches, one batch per sequenced event.
///
/// Batches are delivered in the order they were sent. The matching thread
/// never waits on a collaborator: the channel is unbounded and a collaborator
/// that keeps failing only delays its own later events.
pub struct Publisher {
    sender: Option<Sender<Vec<OrderEvent>>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<PublisherStats>,
}

impl Publisher {
    pub fn spawn(
        symbol: &str,
        handlers: Vec<Arc<dyn EventHandler>>,
        policy: RetryPolicy,
    ) -> EngineResult<Self> {
        let (sender, receiver) = channel::unbounded();
        let stats = Arc::new(PublisherStats::default());

        let worker_stats = Arc::clone(&stats);
        let worker_symbol = symbol.to_string();
        let handle = thread::Builder::new()
            .name(format!("publisher-{symbol}"))
            .spawn(move || run(worker_symbol, receiver, handlers, policy, worker_stats))
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            stats,
        })
    }

    /// Queue one committed batch; empty batches are skipped.
    pub fn publish(&self, events: Vec<OrderEvent>) {
        if events.is_empty() {
            return;
        }
        if let Some(sender) = &self.sender {
            if sender.send(events).is_err() {
                tracing::error!("publisher thread gone, events lost");
            }
        }
    }

    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting batches, then wait until everything queued is delivered.
    pub fn close(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("publisher thread panicked");
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(
    symbol: String,
    receiver: Receiver<Vec<OrderEvent>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    policy: RetryPolicy,
    stats: Arc<PublisherStats>,
) {
    tracing::debug!(symbol = %symbol, handlers = handlers.len(), "publisher started");

    for batch in receiver {
        for event in &batch {
            for handler in &handlers {
                if deliver(handler.as_ref(), event, policy, &stats) {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    tracing::debug!(symbol = %symbol, "publisher stopped");
}

/// Offer `event` to `handler` up to `policy.max_attempts` times.
fn deliver(
    handler: &dyn EventHandler,
    event: &OrderEvent,
    policy: RetryPolicy,
    stats: &PublisherStats,
) -> bool {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match handler.on_event(event) {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    collaborator = handler.name(),
                    attempt,
                    error = %e,
                    "event delivery failed, retrying"
                );
                stats.retries.fetch_add(1, Ordering::Relaxed);
                if !policy.backoff.is_zero() {
                    thread::sleep(policy.backoff);
                }
            },
            Err(e) => {
                tracing::error!(
                    collaborator = handler.name(),
                    attempts,
                    error = %e,
                    event = ?event,
                    "event delivery failed, dropping event"
                );
            },
        }
    }

    false
}
