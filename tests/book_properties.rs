// ============================================================================
// Order Book Properties
// Random order flow against PriceTimePriority and a bare OrderBook
// ============================================================================

use chrono::Utc;
use matching_core::numeric::{Price, Quantity};
use matching_core::prelude::*;
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Op {
    Limit(Side, i64, i64),
    Market(Side, i64),
    Cancel(usize),
}

fn side(buy: bool) -> Side {
    if buy {
        Side::Buy
    } else {
        Side::Sell
    }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (any::<bool>(), 95i64..=105, 1i64..=10).prop_map(|(buy, p, q)| Op::Limit(side(buy), p, q)),
        2 => (any::<bool>(), 1i64..=10).prop_map(|(buy, q)| Op::Market(side(buy), q)),
        1 => (0usize..256).prop_map(Op::Cancel),
    ]
}

fn px(n: i64) -> Price {
    Price::from_integer(n).unwrap()
}

fn qty(n: i64) -> Quantity {
    Quantity::from_integer(n).unwrap()
}

fn add(a: Quantity, b: Quantity) -> Quantity {
    a.checked_add(b).unwrap()
}

fn resting_quantity(book: &OrderBook) -> Quantity {
    let snapshot = book.snapshot(usize::MAX, 0);
    add(snapshot.total_bid_quantity(), snapshot.total_ask_quantity())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn book_never_crosses_and_quantity_is_conserved(ops in prop::collection::vec(op(), 1..200)) {
        let algorithm = PriceTimePriority::new();
        let mut book = OrderBook::new("BTC-USD".into());
        let mut ids = Vec::new();

        let mut submitted = Quantity::ZERO;
        let mut traded = Quantity::ZERO;
        let mut discarded = Quantity::ZERO;
        let mut cancelled = Quantity::ZERO;

        for (i, op) in ops.into_iter().enumerate() {
            let sequence = i as u64 + 1;
            let request = match op {
                Op::Limit(side, price, quantity) => {
                    OrderRequest::limit(OrderId::new(), "BTC-USD", side, px(price), qty(quantity))
                },
                Op::Market(side, quantity) => {
                    OrderRequest::market(OrderId::new(), "BTC-USD", side, qty(quantity))
                },
                Op::Cancel(k) => {
                    if !ids.is_empty() {
                        if let Some(order) = book.cancel(ids[k % ids.len()]) {
                            cancelled = add(cancelled, order.remaining_quantity());
                        }
                    }
                    prop_assert!(!book.is_crossed());
                    continue;
                },
            };

            submitted = add(submitted, request.quantity);
            let order = Order::from_request(request, sequence, Utc::now());
            ids.push(order.order_id);

            let result = algorithm.execute(order, &mut book);
            prop_assert!(!result.disposition.is_rejected());

            // Per order: what traded is what was filled.
            let mut filled_here = Quantity::ZERO;
            for trade in &result.trades {
                prop_assert!(trade.quantity.is_positive());
                filled_here = add(filled_here, trade.quantity);
            }
            prop_assert_eq!(filled_here, result.order.filled_quantity());
            prop_assert_eq!(
                add(result.order.filled_quantity(), result.order.remaining_quantity()),
                result.order.original_quantity
            );
            traded = add(traded, filled_here);

            if result.disposition == Disposition::MarketRemainderDiscarded {
                discarded = add(discarded, result.order.remaining_quantity());
            }

            prop_assert!(!book.is_crossed());
        }

        prop_assert_eq!(
            submitted,
            add(add(resting_quantity(&book), add(traded, traded)), add(discarded, cancelled))
        );
    }

    #[test]
    fn fills_follow_price_then_time(ops in prop::collection::vec(op(), 1..200)) {
        let algorithm = PriceTimePriority::new();
        let mut book = OrderBook::new("BTC-USD".into());
        let mut sequences: HashMap<OrderId, u64> = HashMap::new();

        for (i, op) in ops.into_iter().enumerate() {
            let sequence = i as u64 + 1;
            let request = match op {
                Op::Limit(side, price, quantity) => {
                    OrderRequest::limit(OrderId::new(), "BTC-USD", side, px(price), qty(quantity))
                },
                Op::Market(side, quantity) => {
                    OrderRequest::market(OrderId::new(), "BTC-USD", side, qty(quantity))
                },
                Op::Cancel(_) => continue,
            };

            let limit = request.price;
            let order = Order::from_request(request, sequence, Utc::now());
            sequences.insert(order.order_id, sequence);
            let result = algorithm.execute(order, &mut book);
            let aggressor = result.order.side;

            for trade in &result.trades {
                prop_assert_eq!(trade.aggressor_side, aggressor);
                prop_assert_eq!(trade.sequence, sequence);
                // Never worse than the aggressor's limit.
                if let Some(limit) = limit {
                    match aggressor {
                        Side::Buy => prop_assert!(trade.price <= limit),
                        Side::Sell => prop_assert!(trade.price >= limit),
                    }
                }
            }

            for pair in result.trades.windows(2) {
                let (first, second) = (&pair[0], &pair[1]);
                match aggressor {
                    Side::Buy => prop_assert!(first.price <= second.price),
                    Side::Sell => prop_assert!(first.price >= second.price),
                }
                if first.price == second.price {
                    prop_assert!(
                        sequences[&first.resting_order_id()] < sequences[&second.resting_order_id()]
                    );
                }
            }
        }
    }
}

#[test]
fn test_equal_price_fills_oldest_first() {
    let algorithm = PriceTimePriority::new();
    let mut book = OrderBook::new("BTC-USD".into());

    let first = Order::from_request(
        OrderRequest::limit(OrderId::new(), "BTC-USD", Side::Sell, px(100), qty(1)),
        1,
        Utc::now(),
    );
    let second = Order::from_request(
        OrderRequest::limit(OrderId::new(), "BTC-USD", Side::Sell, px(100), qty(1)),
        2,
        Utc::now(),
    );
    let (first_id, second_id) = (first.order_id, second.order_id);
    algorithm.execute(first, &mut book);
    algorithm.execute(second, &mut book);

    let buy = Order::from_request(
        OrderRequest::limit(OrderId::new(), "BTC-USD", Side::Buy, px(100), qty(1)),
        3,
        Utc::now(),
    );
    let result = algorithm.execute(buy, &mut book);

    assert_eq!(result.trades[0].sell_order_id, first_id);
    assert!(book.contains(second_id));
    assert!(!book.contains(first_id));
}
