// ============================================================================
// Order Book Domain Model
// ============================================================================

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use super::{Order, OrderId, Side};
use crate::numeric::{Price, Quantity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Contract violations when mutating the book directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("order {0} has no positive limit price and cannot rest")]
    InvalidPrice(OrderId),
    #[error("order {0} is already resting in the book")]
    DuplicateOrder(OrderId),
    #[error("order {0} is not resting in the book")]
    UnknownOrder(OrderId),
    #[error("cannot take {requested} from order {order_id} with {remaining} remaining")]
    Overfill {
        order_id: OrderId,
        requested: Quantity,
        remaining: Quantity,
    },
}

// ============================================================================
// Price Level
// ============================================================================

/// FIFO queue of resting orders at one price on one side
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<Order>,
    total_quantity: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_quantity: Quantity::ZERO,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Earliest-sequence order at this level.
    pub fn head(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    fn push_back(&mut self, order: Order) {
        debug_assert!(
            self.orders.back().map_or(true, |last| last.sequence < order.sequence),
            "price level must stay sequence-ordered"
        );
        self.total_quantity = self
            .total_quantity
            .checked_add(order.remaining_quantity())
            .unwrap_or(Quantity::MAX);
        self.orders.push_back(order);
    }

    fn pop_front(&mut self) -> Option<Order> {
        let order = self.orders.pop_front()?;
        self.total_quantity = self.total_quantity.saturating_sub(order.remaining_quantity());
        Some(order)
    }

    fn position(&self, order_id: OrderId) -> Option<usize> {
        // Fills almost always hit the head.
        match self.orders.front() {
            Some(head) if head.order_id == order_id => Some(0),
            _ => self.orders.iter().position(|o| o.order_id == order_id),
        }
    }

    fn remove_at(&mut self, index: usize) -> Option<Order> {
        let order = self.orders.remove(index)?;
        self.total_quantity = self.total_quantity.saturating_sub(order.remaining_quantity());
        Some(order)
    }
}

// ============================================================================
// Order Book Side
// ============================================================================

/// One side of the book: price levels keyed by price, best price cached
#[derive(Debug, Clone)]
pub struct OrderBookSide {
    levels: BTreeMap<Price, PriceLevel>,
    best: Option<Price>,
    side: Side,
}

impl OrderBookSide {
    pub fn new(side: Side) -> Self {
        Self {
            levels: BTreeMap::new(),
            best: None,
            side,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Top-of-book price (highest bid / lowest ask), O(1)
    pub fn best_price(&self) -> Option<Price> {
        self.best
    }

    pub fn best_level(&self) -> Option<&PriceLevel> {
        self.best.and_then(|price| self.levels.get(&price))
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::order_count).sum()
    }

    /// Levels from best to worst price.
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// Aggregated view of the best `num_levels` levels
    pub fn depth(&self, num_levels: usize) -> Vec<BookLevel> {
        self.levels()
            .take(num_levels)
            .map(|level| BookLevel {
                price: level.price,
                quantity: level.total_quantity,
                order_count: level.order_count(),
            })
            .collect()
    }

    fn is_better(&self, candidate: Price, current: Price) -> bool {
        match self.side {
            Side::Buy => candidate > current,
            Side::Sell => candidate < current,
        }
    }

    fn push(&mut self, price: Price, order: Order) {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(order);

        if self.best.map_or(true, |best| self.is_better(price, best)) {
            self.best = Some(price);
        }
    }

    fn level_mut(&mut self, price: Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    fn drop_level_if_empty(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
            if self.best == Some(price) {
                self.best = match self.side {
                    Side::Buy => self.levels.keys().next_back().copied(),
                    Side::Sell => self.levels.keys().next().copied(),
                };
            }
        }
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Live limit order book for one symbol.
///
/// Owned by a single thread; no interior synchronization.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Arc<str>,
    bids: OrderBookSide,
    asks: OrderBookSide,
    /// Resting order locations for cancels and targeted decrements
    index: HashMap<OrderId, (Side, Price)>,
}

/// Result of [`OrderBook::decrement`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrement {
    pub remaining: Quantity,
    /// The order, if the decrement exhausted it and it left the book
    pub removed: Option<Order>,
}

impl OrderBook {
    pub fn new(symbol: Arc<str>) -> Self {
        Self {
            symbol,
            bids: OrderBookSide::new(Side::Buy),
            asks: OrderBookSide::new(Side::Sell),
            index: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self, side: Side) -> &OrderBookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Best-price, earliest-sequence order on `side`
    pub fn peek_best(&self, side: Side) -> Option<&Order> {
        self.side(side).best_level().and_then(PriceLevel::head)
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(&order_id)?;
        self.side(*side)
            .level(*price)?
            .iter()
            .find(|o| o.order_id == order_id)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Number of resting orders across both sides
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask.checked_sub(bid).ok(),
            _ => None,
        }
    }

    /// Rest an order at its limit price, behind everything already there.
    pub fn insert(&mut self, order: Order) -> Result<(), BookError> {
        let price = match order.price {
            Some(price) if price.is_positive() && order.is_limit_order() => price,
            _ => return Err(BookError::InvalidPrice(order.order_id)),
        };
        if self.index.contains_key(&order.order_id) {
            return Err(BookError::DuplicateOrder(order.order_id));
        }

        self.index.insert(order.order_id, (order.side, price));
        self.side_mut(order.side).push(price, order);
        Ok(())
    }

    /// Pop the earliest-sequence order at `price`; the level goes with its
    /// last order.
    pub fn remove_head(&mut self, side: Side, price: Price) -> Option<Order> {
        let book_side = self.side_mut(side);
        let order = book_side.level_mut(price)?.pop_front()?;
        book_side.drop_level_if_empty(price);
        self.index.remove(&order.order_id);
        Some(order)
    }

    /// Take `quantity` from a resting order. An order that reaches zero
    /// leaves the book (through [`remove_head`](Self::remove_head) when it
    /// is at the front of its level).
    pub fn decrement(
        &mut self,
        order_id: OrderId,
        quantity: Quantity,
    ) -> Result<Decrement, BookError> {
        let (side, price) = *self
            .index
            .get(&order_id)
            .ok_or(BookError::UnknownOrder(order_id))?;

        let level = self
            .side_mut(side)
            .level_mut(price)
            .ok_or(BookError::UnknownOrder(order_id))?;
        let position = level
            .position(order_id)
            .ok_or(BookError::UnknownOrder(order_id))?;

        let order = &mut level.orders[position];
        let before = order.remaining_quantity();
        if !order.fill(quantity) {
            return Err(BookError::Overfill {
                order_id,
                requested: quantity,
                remaining: before,
            });
        }
        let remaining = order.remaining_quantity();
        level.total_quantity = level.total_quantity.saturating_sub(quantity);

        if !remaining.is_zero() {
            return Ok(Decrement {
                remaining,
                removed: None,
            });
        }

        let removed = if position == 0 {
            self.remove_head(side, price)
        } else {
            let order = self.side_mut(side).level_mut(price).and_then(|l| l.remove_at(position));
            self.index.remove(&order_id);
            order
        };

        Ok(Decrement { remaining, removed })
    }

    /// Pull a resting order out of the book, wherever it sits in its level.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        let (side, price) = self.index.remove(&order_id)?;
        let book_side = self.side_mut(side);
        let level = book_side.level_mut(price)?;
        let position = level.position(order_id)?;
        let order = level.remove_at(position);
        book_side.drop_level_if_empty(price);
        order
    }

    /// Aggregated top-of-book view
    pub fn snapshot(&self, depth: usize, sequence: u64) -> OrderBookSnapshot {
        OrderBookSnapshot::with_depth(
            self.symbol.to_string(),
            self.bids.depth(depth),
            self.asks.depth(depth),
            sequence,
        )
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Aggregated quantity resting at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BookLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Immutable point-in-time view of the order book
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub symbol: String,
    /// Best (highest) bid first
    pub bids: Vec<BookLevel>,
    /// Best (lowest) ask first
    pub asks: Vec<BookLevel>,
    pub spread: Option<Price>,
    pub mid_price: Option<Price>,
    /// Last sequence applied to the book when the view was taken
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn empty(symbol: String) -> Self {
        Self::with_depth(symbol, Vec::new(), Vec::new(), 0)
    }

    pub fn with_depth(
        symbol: String,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        sequence: u64,
    ) -> Self {
        let (spread, mid_price) = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) => (
                ask.price.checked_sub(bid.price).ok(),
                bid.price
                    .checked_add(ask.price)
                    .and_then(|sum| sum.checked_div_int(2))
                    .ok(),
            ),
            _ => (None, None),
        };

        Self {
            symbol,
            bids,
            asks,
            spread,
            mid_price,
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Copy limited to the best `depth` levels per side
    pub fn truncated(&self, depth: usize) -> Self {
        let mut view = self.clone();
        view.bids.truncate(depth);
        view.asks.truncate(depth);
        view
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|level| level.price)
    }

    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.iter().map(|level| level.quantity).sum()
    }

    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.iter().map(|level| level.quantity).sum()
    }
}
