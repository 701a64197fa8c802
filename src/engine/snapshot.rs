// ============================================================================
// Snapshot & Query Service
// Consumer-built immutable views handed to readers by pointer swap
// ============================================================================

use crate::domain::{OrderBook, OrderBookSnapshot, Trade};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

/// Trades per sealed chunk of the recent-trades history
const TRADE_CHUNK: usize = 64;

/// Recent trades as immutable chunks, oldest first. Views share sealed
/// chunks; only the open tail is copied per publication.
#[derive(Debug, Clone, Default)]
struct TradeHistory {
    chunks: Arc<Vec<Arc<Vec<Trade>>>>,
    /// Visible trades, counted from the newest
    len: usize,
}

impl TradeHistory {
    fn newest_first(&self, limit: usize) -> Vec<Trade> {
        self.chunks
            .iter()
            .rev()
            .flat_map(|chunk| chunk.iter().rev())
            .take(limit.min(self.len))
            .cloned()
            .collect()
    }
}

/// Everything a reader can see at once: the book and the trades that
/// produced it, taken at the same sequence
#[derive(Debug, Clone)]
pub struct MarketView {
    pub book: OrderBookSnapshot,
    recent_trades: TradeHistory,
}

impl MarketView {
    pub fn sequence(&self) -> u64 {
        self.book.sequence
    }

    /// Up to `limit` trades, most recent first
    pub fn recent_trades(&self, limit: usize) -> Vec<Trade> {
        self.recent_trades.newest_first(limit)
    }
}

/// Reader handle; clones share the same slot
#[derive(Clone)]
pub struct SnapshotReader {
    slot: Arc<RwLock<Arc<MarketView>>>,
}

impl SnapshotReader {
    /// The most recently published view. The lock is held only long enough
    /// to clone the pointer.
    pub fn load(&self) -> Arc<MarketView> {
        Arc::clone(&self.slot.read())
    }

    pub fn order_book(&self, depth: usize) -> OrderBookSnapshot {
        self.load().book.truncated(depth)
    }

    pub fn recent_trades(&self, limit: usize) -> Vec<Trade> {
        self.load().recent_trades(limit)
    }
}

/// Consumer-side half: owns the recent-trades ring and decides when to
/// publish
pub struct SnapshotWriter {
    slot: Arc<RwLock<Arc<MarketView>>>,
    depth: usize,
    interval: usize,
    sealed: VecDeque<Arc<Vec<Trade>>>,
    open: Vec<Trade>,
    /// Trades held in `sealed` plus `open`; may exceed the capacity by
    /// less than one chunk
    held: usize,
    trades_capacity: usize,
    published_trades: TradeHistory,
    trades_dirty: bool,
    pending_mutations: usize,
}

/// Create the single-slot handoff for one symbol.
pub fn snapshot_channel(
    symbol: &str,
    depth: usize,
    interval: usize,
    trades_capacity: usize,
) -> (SnapshotWriter, SnapshotReader) {
    let published_trades = TradeHistory::default();
    let initial = MarketView {
        book: OrderBookSnapshot::empty(symbol.to_string()),
        recent_trades: published_trades.clone(),
    };
    let slot = Arc::new(RwLock::new(Arc::new(initial)));

    (
        SnapshotWriter {
            slot: Arc::clone(&slot),
            depth,
            interval: interval.max(1),
            sealed: VecDeque::new(),
            open: Vec::with_capacity(TRADE_CHUNK),
            held: 0,
            trades_capacity: trades_capacity.max(1),
            published_trades,
            trades_dirty: false,
            pending_mutations: 0,
        },
        SnapshotReader { slot },
    )
}

impl SnapshotWriter {
    /// Append committed trades, evicting whole chunks once they fall
    /// outside the capacity.
    pub fn record_trades<'a>(&mut self, trades: impl IntoIterator<Item = &'a Trade>) {
        for trade in trades {
            self.open.push(trade.clone());
            self.held += 1;
            self.trades_dirty = true;

            if self.open.len() == TRADE_CHUNK {
                let full = mem::replace(&mut self.open, Vec::with_capacity(TRADE_CHUNK));
                self.sealed.push_back(Arc::new(full));
            }
        }

        while let Some(oldest) = self.sealed.front() {
            if self.held - oldest.len() < self.trades_capacity {
                break;
            }
            self.held -= oldest.len();
            self.sealed.pop_front();
        }
    }

    /// Count one applied event; publishes when the batch reaches the
    /// configured interval.
    pub fn on_mutation(&mut self, book: &OrderBook, sequence: u64) {
        self.pending_mutations += 1;
        if self.pending_mutations >= self.interval {
            self.publish(book, sequence);
        }
    }

    /// Publish if anything changed since the last publication.
    pub fn flush(&mut self, book: &OrderBook, sequence: u64) {
        if self.pending_mutations > 0 || self.trades_dirty {
            self.publish(book, sequence);
        }
    }

    /// Build a fresh view off-lock, then swap it in.
    pub fn publish(&mut self, book: &OrderBook, sequence: u64) {
        if self.trades_dirty {
            let mut chunks: Vec<Arc<Vec<Trade>>> = self.sealed.iter().cloned().collect();
            if !self.open.is_empty() {
                chunks.push(Arc::new(self.open.clone()));
            }
            self.published_trades = TradeHistory {
                chunks: Arc::new(chunks),
                len: self.held.min(self.trades_capacity),
            };
            self.trades_dirty = false;
        }

        let view = Arc::new(MarketView {
            book: book.snapshot(self.depth, sequence),
            recent_trades: self.published_trades.clone(),
        });

        *self.slot.write() = view;
        self.pending_mutations = 0;
    }
}
