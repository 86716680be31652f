//! Whole-cycle tests against the paper venue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dca_bot::{AppConfig, Coordinator, CycleOutcome, CycleSummary, ShutdownOutcome};
use dca_core::{Category, OrderSide, Price, Size, Symbol};
use dca_resilience::{RecoveryConfig, RecoveryManager};
use dca_risk::{Signal, SignalSource};
use dca_venue::{PaperVenue, PlaceOrderRequest, Venue, VenueError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

/// Buys while the shared flag is set, holds otherwise.
struct Switch(Arc<AtomicBool>);

impl SignalSource for Switch {
    fn name(&self) -> &str {
        "switch"
    }

    fn evaluate(&self, _current_price: Price, _history: &[Price]) -> Signal {
        if self.0.load(Ordering::SeqCst) {
            Signal::Buy
        } else {
            Signal::Hold
        }
    }
}

struct Panicking;

impl SignalSource for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn evaluate(&self, _current_price: Price, _history: &[Price]) -> Signal {
        panic!("signal generator crashed")
    }
}

fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.interval_secs = 1;
    config.shutdown.timeout_secs = 5;
    config.recovery = RecoveryConfig {
        base_delay_ms: 10,
        max_delay_ms: 50,
        jitter: false,
        ..RecoveryConfig::default()
    };
    config
}

struct Harness {
    paper: Arc<PaperVenue>,
    stop: CancellationToken,
    buy: Arc<AtomicBool>,
    coordinator: Coordinator,
}

fn harness_with(config: AppConfig) -> Harness {
    let paper = Arc::new(PaperVenue::new(btc(), Price::new(dec!(100)), dec!(10000)));
    let stop = CancellationToken::new();
    let io_cancel = CancellationToken::new();
    let recovery = Arc::new(RecoveryManager::new(
        config.recovery.clone(),
        io_cancel.clone(),
    ));
    let buy = Arc::new(AtomicBool::new(true));
    let coordinator = Coordinator::new(config, paper.clone(), recovery, stop.clone(), io_cancel)
        .unwrap()
        .with_signal(Box::new(Switch(buy.clone())));
    Harness {
        paper,
        stop,
        buy,
        coordinator,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn completed(outcome: CycleOutcome) -> CycleSummary {
    match outcome {
        CycleOutcome::Completed(summary) => summary,
        other => panic!("expected completed cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_cycle_enters_and_places_ladder() {
    let h = harness();
    let summary = completed(h.coordinator.tick().await);

    assert_eq!(summary.entered_level, Some(1));
    assert_eq!(summary.placement.as_ref().map(|r| r.placed), Some(5));
    assert_eq!(h.paper.position(), Some((Size::new(dec!(1)), Price::new(dec!(100)))));

    let legs = h.coordinator.take_profit().legs();
    let targets: Vec<Decimal> = legs.iter().map(|l| l.target_price.inner()).collect();
    assert_eq!(
        targets,
        vec![dec!(100.4), dec!(100.8), dec!(101.2), dec!(101.6), dec!(102.0)]
    );
    assert!(legs.iter().all(|l| l.quantity == Size::new(dec!(0.2))));
    assert_eq!(h.paper.open_orders().len(), 5);
    assert_eq!(h.coordinator.synchronizer().dca_level(), 1);
}

#[tokio::test]
async fn test_gate_blocks_entry_until_price_drops() {
    let h = harness();
    completed(h.coordinator.tick().await);
    let placed_after_first = h.paper.placed_count();

    let summary = completed(h.coordinator.tick().await);
    assert!(!summary.entered());
    assert_eq!(summary.blocked_by, Some("spacing"));
    assert!(summary.placement.is_none());
    assert_eq!(h.paper.placed_count(), placed_after_first);

    h.paper.set_price(Price::new(dec!(97)));
    let summary = completed(h.coordinator.tick().await);
    assert_eq!(summary.entered_level, Some(2));

    let (size, avg) = h.paper.position().unwrap();
    assert!(size > Size::new(dec!(2)));
    assert!(avg < Price::new(dec!(100)));

    // The ladder was rebuilt around the new average.
    let legs = h.coordinator.take_profit().legs();
    assert_eq!(legs.len(), 5);
    assert!(legs.iter().all(|l| l.target_price > avg));
    assert!(legs.iter().all(|l| l.target_price < Price::new(dec!(100.5))));
    assert_eq!(h.paper.open_orders().len(), 5);
}

#[tokio::test]
async fn test_take_profit_fill_detected() {
    let h = harness();
    completed(h.coordinator.tick().await);

    h.paper.set_price(Price::new(dec!(100.5)));
    h.buy.store(false, Ordering::SeqCst);
    let summary = completed(h.coordinator.tick().await);

    assert_eq!(summary.fills, 1);
    assert!(summary.placement.is_none());
    assert_eq!(h.coordinator.take_profit().tracked_count(), 4);
    assert_eq!(h.paper.position().map(|(size, _)| size), Some(Size::new(dec!(0.8))));
}

#[tokio::test]
async fn test_ladder_closing_position_reports_every_fill() {
    let h = harness();
    completed(h.coordinator.tick().await);
    let foreign =
        h.paper
            .insert_foreign_order(OrderSide::Buy, Price::new(dec!(90)), Size::new(dec!(0.1)));

    h.paper.set_price(Price::new(dec!(103)));
    assert!(h.paper.position().is_none());
    h.buy.store(false, Ordering::SeqCst);
    let summary = completed(h.coordinator.tick().await);

    assert_eq!(summary.fills, 5);
    assert_eq!(h.coordinator.take_profit().tracked_count(), 0);
    assert_eq!(h.coordinator.synchronizer().dca_level(), 0);
    assert_eq!(h.paper.cancelled_count(), 0);
    // Orders that are not ours stay on the book.
    let remaining = h.paper.open_orders();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].order_id, foreign);
}

#[tokio::test]
async fn test_external_close_clears_take_profit_state() {
    let h = harness();
    completed(h.coordinator.tick().await);
    h.paper.close_position_externally();
    h.buy.store(false, Ordering::SeqCst);
    let summary = completed(h.coordinator.tick().await);

    assert!(!summary.entered());
    assert_eq!(summary.fills, 0);
    assert_eq!(h.coordinator.synchronizer().dca_level(), 0);
    assert_eq!(h.coordinator.take_profit().tracked_count(), 0);
    assert_eq!(h.paper.cancelled_count(), 5);
    assert!(h.paper.open_orders().is_empty());
}

#[tokio::test]
async fn test_startup_cancels_orphaned_legs_only() {
    let h = harness();
    let entry = PlaceOrderRequest::market(
        Category::Linear,
        btc(),
        OrderSide::Buy,
        Size::new(dec!(1)),
        "entry",
    );
    assert_ok!(h.paper.place_order(entry).await);
    h.paper
        .insert_foreign_order(OrderSide::Sell, Price::new(dec!(105)), Size::new(dec!(0.3)));
    let manual_buy =
        h.paper
            .insert_foreign_order(OrderSide::Buy, Price::new(dec!(90)), Size::new(dec!(0.1)));

    h.coordinator.startup().await;

    let remaining = h.paper.open_orders();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].order_id, manual_buy);
    // Cold start estimates the level from notional / base entry amount.
    assert_eq!(h.coordinator.synchronizer().dca_level(), 1);
}

#[tokio::test]
async fn test_entry_skipped_below_minimums() {
    let mut config = test_config();
    config.base_entry_amount = dec!(1);
    let h = harness_with(config);

    let summary = completed(h.coordinator.tick().await);
    assert!(!summary.entered());
    assert!(h.paper.position().is_none());
    assert_eq!(h.paper.placed_count(), 0);
}

#[tokio::test]
async fn test_price_failure_skips_cycle_and_loop_continues() {
    let h = harness();
    // One balance call, three position attempts, then the price call.
    for _ in 0..5 {
        h.paper
            .fail_next(VenueError::InvalidResponse("garbled".into()));
    }
    let outcome = h.coordinator.tick().await;
    assert!(matches!(outcome, CycleOutcome::Failed(_)));
    assert!(h.paper.position().is_none());

    let summary = completed(h.coordinator.tick().await);
    assert!(summary.entered());
}

#[tokio::test]
async fn test_panicking_cycle_is_contained() {
    let h = harness();
    let coordinator = h.coordinator.with_signal(Box::new(Panicking));

    let outcome = coordinator.tick().await;
    assert!(matches!(outcome, CycleOutcome::Panicked(ref msg) if msg.contains("crashed")));

    // The next tick still runs.
    assert!(matches!(coordinator.tick().await, CycleOutcome::Panicked(_)));
}

#[tokio::test]
async fn test_graceful_shutdown_cancels_and_flattens() {
    let h = harness();
    completed(h.coordinator.tick().await);

    let outcome = h.coordinator.shutdown().await;
    match outcome {
        ShutdownOutcome::Graceful(report) => {
            assert_eq!(report.cancelled.cancelled, 5);
            assert_eq!(report.flattened, Some(Size::new(dec!(1))));
        }
        ShutdownOutcome::Forced => panic!("expected graceful shutdown"),
    }
    assert_eq!(h.paper.cancelled_count(), 5);
    assert!(h.paper.open_orders().is_empty());
    assert!(h.paper.position().is_none());
}

#[tokio::test]
async fn test_shutdown_forced_when_cleanup_hangs() {
    let mut config = test_config();
    config.shutdown.timeout_secs = 1;
    let h = harness_with(config);
    completed(h.coordinator.tick().await);

    h.paper.set_latency(Duration::from_secs(5));
    let started = std::time::Instant::now();
    let outcome = h.coordinator.shutdown().await;

    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_run_stops_on_signal() {
    let h = harness();
    let stop = h.stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        stop.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), h.coordinator.run())
        .await
        .expect("run did not stop")
        .unwrap();

    assert!(matches!(outcome, ShutdownOutcome::Graceful(_)));
    assert!(h.paper.position().is_none());
    assert!(h.paper.open_orders().is_empty());
}
