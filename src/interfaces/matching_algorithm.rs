// ============================================================================
// Matching Algorithm Interface
// Defines the contract for pluggable matching algorithms
// ============================================================================

use crate::domain::order::state::OrderStateTransition;
use crate::domain::{Disposition, MatchingResult, Order, OrderBook, Side, Trades};
use crate::numeric::Price;

/// Strategy interface for matching an inbound order against a book.
///
/// Implementations run on the engine's consumer thread and own the book for
/// the duration of the call, so they need no synchronization of their own.
pub trait MatchingAlgorithm: Send {
    /// Execute `incoming` against the opposite side of `book` while it is
    /// marketable, decrementing both sides of every fill.
    ///
    /// Must not rest `incoming`; that is decided by [`execute`](Self::execute).
    fn match_order(&self, incoming: &mut Order, book: &mut OrderBook) -> Trades;

    /// Get the algorithm name for logging
    fn name(&self) -> &str;

    /// Whether a resting price on the opposite side can trade with `incoming`
    fn is_marketable(&self, incoming: &Order, resting_price: Price) -> bool {
        match (incoming.price, incoming.side) {
            (None, _) => true,
            (Some(limit), Side::Buy) => resting_price <= limit,
            (Some(limit), Side::Sell) => resting_price >= limit,
        }
    }

    /// Reject orders that must never reach the book.
    fn validate(&self, order: &Order, book: &OrderBook) -> Result<(), String> {
        if !order.original_quantity.is_positive() {
            return Err("Quantity must be positive".to_string());
        }

        if order.is_limit_order() && !order.price.is_some_and(|p| p.is_positive()) {
            return Err("Limit price must be positive".to_string());
        }

        if book.contains(order.order_id) {
            return Err(format!("Order {} is already resting", order.order_id));
        }

        Ok(())
    }

    /// Full submission: validate, match, then rest a limit remainder.
    ///
    /// Either commits every trade plus the book mutation, or (on rejection)
    /// touches nothing.
    fn execute(&self, mut order: Order, book: &mut OrderBook) -> MatchingResult {
        if let Err(reason) = self.validate(&order, book) {
            // Only a sequenced-but-unprocessed order can be rejected here.
            let _ = order.apply(OrderStateTransition::Reject);
            return MatchingResult::rejected(order, reason);
        }
        if order.apply(OrderStateTransition::Accept).is_err() {
            return MatchingResult::rejected(order, "Order was already processed");
        }

        let trades = self.match_order(&mut order, book);

        let disposition = if order.is_filled() {
            Disposition::Filled
        } else if order.is_market_order() {
            // Market orders never rest.
            let _ = order.apply(OrderStateTransition::Cancel);
            Disposition::MarketRemainderDiscarded
        } else {
            let rested = if trades.is_empty() {
                Disposition::Resting
            } else {
                Disposition::PartiallyFilledResting
            };
            match book.insert(order.clone()) {
                Ok(()) => rested,
                Err(e) => {
                    tracing::error!(order_id = %order.order_id, error = %e, "failed to rest order");
                    if trades.is_empty() {
                        Disposition::Rejected {
                            reason: e.to_string(),
                        }
                    } else {
                        // Fills are already committed on both sides.
                        let _ = order.apply(OrderStateTransition::Cancel);
                        Disposition::RemainderCancelled {
                            reason: e.to_string(),
                        }
                    }
                },
            }
        };

        debug_assert!(!book.is_crossed(), "book crossed after matching");

        MatchingResult {
            order,
            trades,
            disposition,
        }
    }
}
