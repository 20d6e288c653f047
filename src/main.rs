//! lobx performance lab
//!
//! Runs performance tests against the order book engine, followed by a
//! short demo of order placement, matching, and trade execution.

use orderbook::{Engine, EngineConfig, Order, OrderId, OrderType, Side};


/// Main entry point - runs performance tests and demo.
fn main() {
    tracing_subscriber::fmt::init();

    println!("=== lobx Performance Lab ===");

    latency_test::run_latency_tests();
    latency_test::run_throughput_test();

    println!("\n=== Basic Demo ===");
    run_basic_demo();
}

/// Demonstrates the engine surface: resting orders, a cross, a market
/// order walking the book, and a Fill-And-Kill sweep.
fn run_basic_demo() {
    let engine = Engine::with_config(EngineConfig {
        gfd_enabled: false,
        ..EngineConfig::default()
    });

    println!("lobx - Order Book Demo");

    // Build a small ask ladder and one bid below the spread
    for (id, price, qty) in [(1, 15000, 100), (2, 15005, 50)] {
        let order = Order::new(OrderType::GoodTillCancel, OrderId(id), Side::Sell, price, qty);
        println!("Submitting ask order: {} @ {}", qty, price);
        engine.add_order(order).expect("resting ask");
    }

    let bid = Order::new(OrderType::GoodTillCancel, OrderId(3), Side::Buy, 14950, 50);
    println!("Submitting bid order: 50 @ 14950");
    engine.add_order(bid).expect("resting bid");

    println!("Best bid: {:?}", engine.best_bid());
    println!("Best ask: {:?}", engine.best_ask());

    // Crossing bid partially fills the best ask
    let crossing = Order::new(OrderType::GoodTillCancel, OrderId(4), Side::Buy, 15000, 75);
    println!("Submitting crossing bid: 75 @ 15000");
    let trades = engine.add_order(crossing).expect("crossing bid");

    println!("Trades executed: {}", trades.len());
    for trade in &trades {
        println!(
            "  Trade: {} @ {} (bid #{} / ask #{})",
            trade.bid.quantity, trade.ask.price, trade.bid.order_id, trade.ask.order_id
        );
    }

    // Market sell walks the bid side and rests any remainder
    let market = Order::market(OrderId(5), Side::Sell, 80);
    println!("Submitting market sell: 80");
    let trades = engine.add_order(market).expect("market sell");
    println!("Trades executed: {}", trades.len());

    // Fill-And-Kill for more than the book holds: remainder is swept
    let fak = Order::new(OrderType::FillAndKill, OrderId(6), Side::Buy, 15005, 500);
    println!("Submitting fill-and-kill bid: 500 @ 15005");
    let trades = engine.add_order(fak).expect("fill-and-kill bid");
    println!("Trades executed: {}", trades.len());

    let depth = engine.depth();
    println!("Final depth: {} bid levels, {} ask levels", depth.bids.len(), depth.asks.len());
    for level in &depth.bids {
        println!("  bid {} x {}", level.price, level.quantity);
    }
    for level in &depth.asks {
        println!("  ask {} x {}", level.price, level.quantity);
    }
    println!("Resting orders: {}", engine.size());
}
