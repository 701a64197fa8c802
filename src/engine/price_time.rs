// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// Most common in traditional exchanges (NASDAQ, NYSE, etc.)
// ============================================================================

use crate::domain::{Order, OrderBook, Trade, Trades};
use crate::interfaces::MatchingAlgorithm;

/// Price/Time Priority (FIFO) matching algorithm
///
/// Better prices fill first; at one price, the lower sequence fills first.
/// Every fill executes at the resting order's price.
///
/// # Example
/// ```text
/// Book:  100 @ 1 (Order A, seq=10)
///        100 @ 2 (Order B, seq=11)
///
/// Incoming: Buy 1.5 @ 100
/// Result: Match 1.0 with A, then 0.5 with B
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceTimePriority;

impl PriceTimePriority {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn match_order(&self, incoming: &mut Order, book: &mut OrderBook) -> Trades {
        let mut trades = Trades::new();
        let opposite = incoming.side.opposite();

        while !incoming.is_filled() {
            let (resting_id, resting_price, resting_remaining) = match book.peek_best(opposite) {
                Some(resting) => match resting.price {
                    Some(price) => (resting.order_id, price, resting.remaining_quantity()),
                    None => break,
                },
                None => break,
            };

            if !self.is_marketable(incoming, resting_price) {
                break;
            }

            let fill_quantity = incoming.remaining_quantity().min(resting_remaining);

            if let Err(e) = book.decrement(resting_id, fill_quantity) {
                tracing::error!(%resting_id, error = %e, "resting order rejected a fill");
                break;
            }
            if !incoming.fill(fill_quantity) {
                tracing::error!(order_id = %incoming.order_id, "aggressor rejected a fill");
                break;
            }

            trades.push(Trade::new(
                incoming.symbol.clone(),
                incoming.order_id,
                incoming.side,
                resting_id,
                resting_price,
                fill_quantity,
                incoming.sequence,
            ));
        }

        trades
    }

    fn name(&self) -> &str {
        "PriceTime"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::state::OrderStateTransition;
    use crate::domain::{Disposition, OrderId, OrderRequest, OrderState, Side};
    use crate::numeric::{Price, Quantity};
    use chrono::Utc;
    use std::sync::Arc;

    fn px(n: i64) -> Price {
        Price::from_integer(n).unwrap()
    }

    fn qty(n: i64) -> Quantity {
        Quantity::from_integer(n).unwrap()
    }

    fn order(side: Side, price: Option<i64>, quantity: i64, sequence: u64) -> Order {
        let request = OrderRequest {
            order_id: OrderId::new(),
            symbol: "BTC-USD".to_string(),
            side,
            price: price.map(px),
            quantity: qty(quantity),
        };
        request.into_order(Arc::from("BTC-USD"), sequence, Utc::now())
    }

    fn rest(book: &mut OrderBook, mut order: Order) -> OrderId {
        let id = order.order_id;
        order.apply(OrderStateTransition::Accept).unwrap();
        book.insert(order).unwrap();
        id
    }

    fn book() -> OrderBook {
        OrderBook::new(Arc::from("BTC-USD"))
    }

    #[test]
    fn test_price_time_fifo_order() {
        let algo = PriceTimePriority::new();
        let mut book = book();

        let first = rest(&mut book, order(Side::Sell, Some(100), 1, 1));
        let second = rest(&mut book, order(Side::Sell, Some(100), 1, 2));

        let result = algo.execute(order(Side::Buy, Some(100), 1, 3), &mut book);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].sell_order_id, first);
        assert_eq!(book.peek_best(Side::Sell).unwrap().order_id, second);
    }

    #[test]
    fn test_better_price_fills_first_at_resting_price() {
        let algo = PriceTimePriority::new();
        let mut book = book();

        rest(&mut book, order(Side::Sell, Some(102), 1, 1));
        let cheap = rest(&mut book, order(Side::Sell, Some(101), 1, 2));

        let result = algo.execute(order(Side::Buy, Some(105), 1, 3), &mut book);

        assert_eq!(result.trades[0].sell_order_id, cheap);
        assert_eq!(result.trades[0].price, px(101));
        assert_eq!(result.disposition, Disposition::Filled);
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let algo = PriceTimePriority::new();
        let mut book = book();

        rest(&mut book, order(Side::Sell, Some(100), 1, 1));

        let result = algo.execute(order(Side::Buy, Some(100), 2, 2), &mut book);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].quantity, qty(1));
        assert_eq!(result.disposition, Disposition::PartiallyFilledResting);
        assert_eq!(result.order.remaining_quantity(), qty(1));
        assert_eq!(result.order.state(), OrderState::PartiallyFilled);
        assert_eq!(book.best_bid(), Some(px(100)));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_non_marketable_limit_rests() {
        let algo = PriceTimePriority::new();
        let mut book = book();

        rest(&mut book, order(Side::Sell, Some(101), 1, 1));
        let result = algo.execute(order(Side::Buy, Some(100), 1, 2), &mut book);

        assert!(result.trades.is_empty());
        assert_eq!(result.disposition, Disposition::Resting);
        assert_eq!(book.best_bid(), Some(px(100)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_market_remainder_is_discarded() {
        let algo = PriceTimePriority::new();
        let mut book = book();

        rest(&mut book, order(Side::Buy, Some(99), 2, 1));
        let result = algo.execute(order(Side::Sell, None, 5, 2), &mut book);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].price, px(99));
        assert_eq!(result.disposition, Disposition::MarketRemainderDiscarded);
        assert_eq!(result.order.state(), OrderState::Cancelled);
        assert!(book.is_empty());
    }

    #[test]
    fn test_invalid_orders_rejected_without_mutation() {
        let algo = PriceTimePriority::new();
        let mut book = book();
        let resting = rest(&mut book, order(Side::Sell, Some(100), 1, 1));

        let zero_qty = algo.execute(order(Side::Buy, Some(100), 0, 2), &mut book);
        assert!(zero_qty.disposition.is_rejected());
        assert_eq!(zero_qty.order.state(), OrderState::Rejected);

        let negative_px = algo.execute(order(Side::Buy, Some(-1), 1, 3), &mut book);
        assert!(negative_px.disposition.is_rejected());

        assert!(book.contains(resting));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_duplicate_resting_id_rejected() {
        let algo = PriceTimePriority::new();
        let mut book = book();
        let first = order(Side::Buy, Some(90), 1, 1);
        let mut duplicate = order(Side::Buy, Some(91), 1, 2);
        duplicate.order_id = first.order_id;
        rest(&mut book, first);

        let result = algo.execute(duplicate, &mut book);
        assert!(result.disposition.is_rejected());
        assert_eq!(book.best_bid(), Some(px(90)));
    }

    /// Rests the aggressor itself, so the remainder can no longer be added
    struct RestsAggressor;

    impl MatchingAlgorithm for RestsAggressor {
        fn match_order(&self, incoming: &mut Order, book: &mut OrderBook) -> Trades {
            let trades = PriceTimePriority.match_order(incoming, book);
            if !trades.is_empty() {
                book.insert(incoming.clone()).unwrap();
            }
            trades
        }

        fn name(&self) -> &str {
            "RestsAggressor"
        }
    }

    #[test]
    fn test_failed_rest_keeps_committed_trades() {
        let mut book = book();
        let seller = rest(&mut book, order(Side::Sell, Some(100), 1, 1));

        let result = RestsAggressor.execute(order(Side::Buy, Some(100), 3, 2), &mut book);

        assert!(matches!(result.disposition, Disposition::RemainderCancelled { .. }));
        assert!(!result.disposition.is_rejected());
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].sell_order_id, seller);
        assert_eq!(result.order.filled_quantity(), qty(1));
        assert_eq!(result.order.state(), OrderState::Cancelled);
        assert!(!book.contains(seller));
    }
}
