// ============================================================================
// Matching Engine Benchmarks
// ============================================================================
//
// Benchmark Categories:
// 1. Order Book - Matching directly against a book, no threads involved
// 2. Sequencer - Ring publish/consume cost
// 3. Full Engine - Submission through the sequencer to the consumer thread
// 4. Queries - Snapshot reads
// ============================================================================

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use matching_core::engine::sequencer;
use matching_core::numeric::{Price, Quantity};
use matching_core::prelude::*;

fn px(n: i64) -> Price {
    Price::from_integer(n).unwrap()
}

fn qty(n: i64) -> Quantity {
    Quantity::from_integer(n).unwrap()
}

fn limit(side: Side, price: i64, quantity: i64) -> OrderRequest {
    OrderRequest::limit(OrderId::new(), "BTC-USD", side, px(price), qty(quantity))
}

fn bench_engine(ring_capacity: usize) -> Engine {
    EngineBuilder::new("BTC-USD")
        .with_ring_capacity(ring_capacity)
        .build()
        .unwrap()
}

// ============================================================================
// Order Book Benchmarks
// ============================================================================

fn benchmark_price_time_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_time_matching");

    for levels in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(levels), levels, |b, &levels| {
            let algorithm = PriceTimePriority::new();
            let mut sequence = 0u64;
            let mut book = OrderBook::new("BTC-USD".into());
            let rest = |book: &mut OrderBook, sequence: &mut u64, price: i64| {
                *sequence += 1;
                let order = Order::from_request(limit(Side::Sell, price, 1), *sequence, Utc::now());
                algorithm.execute(order, book);
            };

            for i in 0..levels {
                rest(&mut book, &mut sequence, 50_000 + i);
            }

            b.iter(|| {
                // Sweep the first five levels, then put them back
                sequence += 1;
                let buy = Order::from_request(limit(Side::Buy, 50_004, 5), sequence, Utc::now());
                black_box(algorithm.execute(buy, &mut book));

                for i in 0..5 {
                    rest(&mut book, &mut sequence, 50_000 + i);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_no_match_insert(c: &mut Criterion) {
    c.bench_function("no_match_insert_cancel", |b| {
        let algorithm = PriceTimePriority::new();
        let mut book = OrderBook::new("BTC-USD".into());
        let mut sequence = 0u64;

        b.iter(|| {
            sequence += 1;
            let order = Order::from_request(limit(Side::Buy, 49_000, 1), sequence, Utc::now());
            let id = order.order_id;
            black_box(algorithm.execute(order, &mut book));
            black_box(book.cancel(id));
        });
    });
}

// ============================================================================
// Sequencer Benchmarks
// ============================================================================

fn benchmark_sequencer(c: &mut Criterion) {
    c.bench_function("sequencer_publish_consume", |b| {
        let (producer, mut consumer) = sequencer::<u64>(1 << 10);

        b.iter(|| {
            let sequence = producer.publish(black_box(7)).unwrap();
            black_box(sequence);
            black_box(consumer.try_consume());
        });
    });
}

// ============================================================================
// Full Engine Benchmarks
// ============================================================================

fn benchmark_submit_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_submit_order");

    group.bench_function("resting", |b| {
        let engine = bench_engine(1 << 16);
        let mut price = 0i64;

        b.iter(|| {
            price = (price + 1) % 1_000;
            black_box(engine.submit_order(limit(Side::Sell, 60_000 + price, 1)).unwrap());
        });
    });

    group.bench_function("crossing", |b| {
        let engine = bench_engine(1 << 16);

        b.iter(|| {
            engine.submit_order(limit(Side::Sell, 50_000, 1)).unwrap();
            black_box(engine.submit_order(limit(Side::Buy, 50_000, 1)).unwrap());
        });
    });

    group.finish();
}

// ============================================================================
// Query Benchmarks
// ============================================================================

fn benchmark_order_book_snapshot(c: &mut Criterion) {
    c.bench_function("order_book_snapshot", |b| {
        let engine = bench_engine(1 << 12);

        // Pre-populate book with 100 levels on each side
        for i in 0..100 {
            engine.submit_order(limit(Side::Buy, 49_900 - i * 10, 1)).unwrap();
            engine.submit_order(limit(Side::Sell, 50_100 + i * 10, 1)).unwrap();
        }

        b.iter(|| {
            black_box(engine.get_order_book(10));
        });
    });
}

criterion_group!(
    benches,
    benchmark_price_time_matching,
    benchmark_no_match_insert,
    benchmark_sequencer,
    benchmark_submit_order,
    benchmark_order_book_snapshot,
);
criterion_main!(benches);
