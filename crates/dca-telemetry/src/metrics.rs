//! Prometheus metrics for the DCA bot.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that should crash at
//! first use rather than silently drop metrics.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram, CounterVec,
    Encoder, Gauge, GaugeVec, Histogram, TextEncoder,
};

use crate::error::TelemetryResult;

/// Breaker state transitions.
/// Labels: breaker (trading/market_data/account_data), to (closed/open/half-open)
pub static BREAKER_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dca_breaker_transitions_total",
        "Circuit breaker state transitions",
        &["breaker", "to"]
    )
    .unwrap()
});

/// Breaker state (0 = closed, 1 = half-open, 2 = open).
pub static BREAKER_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "dca_breaker_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)",
        &["breaker"]
    )
    .unwrap()
});

/// Categorized errors currently in the recovery window.
pub static RECOVERY_WINDOW_ERRORS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "dca_recovery_window_errors",
        "Categorized errors in the recovery rolling window",
        &["category"]
    )
    .unwrap()
});

/// Orders accepted by the venue.
/// Labels: kind (entry/take_profit/flatten)
pub static ORDERS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dca_orders_placed_total",
        "Orders accepted by the venue",
        &["kind"]
    )
    .unwrap()
});

/// Orders not submitted.
/// Labels: reason (below_minimum/budget_exhausted/unfunded/rejected)
pub static ORDERS_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dca_orders_skipped_total",
        "Orders skipped or rejected",
        &["reason"]
    )
    .unwrap()
});

/// Take-profit legs detected as filled.
pub static TAKE_PROFIT_FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dca_take_profit_fills_total",
        "Take-profit legs detected as filled",
        &["symbol"]
    )
    .unwrap()
});

/// Entry decisions blocked.
/// Labels: reason (spacing/signal/max_levels/below_minimum)
pub static ENTRY_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dca_entry_blocked_total",
        "Entries blocked before submission",
        &["reason"]
    )
    .unwrap()
});

/// Position reconciliation outcomes.
/// Labels: outcome (updated/flat/resync_required/failed)
pub static POSITION_SYNC_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dca_position_sync_total",
        "Position reconciliation outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Replica position size.
pub static POSITION_SIZE: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("dca_position_size", "Replica position size").unwrap());

/// Tracked DCA level.
pub static DCA_LEVEL: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("dca_level", "Tracked DCA level").unwrap());

/// Completed cycles.
/// Labels: outcome (ok/error/panic)
pub static CYCLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("dca_cycles_total", "Completed loop cycles", &["outcome"]).unwrap()
});

/// Cycle duration in milliseconds.
pub static CYCLE_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "dca_cycle_duration_ms",
        "Loop cycle duration in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 30000.0, 90000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a breaker transition.
    pub fn breaker_transition(breaker: &str, to: &str) {
        BREAKER_TRANSITIONS_TOTAL
            .with_label_values(&[breaker, to])
            .inc();
        let value = match to {
            "open" => 2.0,
            "half-open" => 1.0,
            _ => 0.0,
        };
        BREAKER_STATE.with_label_values(&[breaker]).set(value);
    }

    /// Set the recovery window count for one category.
    pub fn recovery_window(category: &str, count: usize) {
        RECOVERY_WINDOW_ERRORS
            .with_label_values(&[category])
            .set(count as f64);
    }

    pub fn order_placed(kind: &str) {
        ORDERS_PLACED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn order_skipped(reason: &str) {
        ORDERS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn take_profit_filled(symbol: &str, count: usize) {
        TAKE_PROFIT_FILLS_TOTAL
            .with_label_values(&[symbol])
            .inc_by(count as f64);
    }

    pub fn entry_blocked(reason: &str) {
        ENTRY_BLOCKED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn position_sync(outcome: &str) {
        POSITION_SYNC_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record the replica after a reconciliation.
    pub fn position_state(size: f64, dca_level: u32) {
        POSITION_SIZE.set(size);
        DCA_LEVEL.set(f64::from(dca_level));
    }

    pub fn cycle_completed(outcome: &str, duration_ms: f64) {
        CYCLES_TOTAL.with_label_values(&[outcome]).inc();
        CYCLE_DURATION_MS.observe(duration_ms);
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
