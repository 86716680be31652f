//! Loop coordinator.
//!
//! Runs one cycle per aligned interval boundary:
//! balance and position refresh -> signal and entry gate -> entry ->
//! resync -> take-profit ladder -> fill detection -> status.
//!
//! Two tokens drive shutdown. `stop` ends the loop; `io_cancel` aborts venue
//! waits and backoffs, and only fires after cleanup finished or was forced, so
//! cleanup calls still get their retries.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dca_core::{Category, OrderSide, Price, Size, Symbol};
use dca_orders::{
    CancelReport, OrderError, PlacementReport, TakeProfitClassifier, TakeProfitManager,
};
use dca_position::{StateSynchronizer, SyncConfig, SyncOutcome};
use dca_resilience::{RecoveryManager, ResilienceRegistry, StateChange, StateChangeObserver};
use dca_risk::{
    spacing_from_config, AlwaysBuy, EntryGate, EntryGateInput, GateResult, Signal, SignalSource,
};
use dca_telemetry::Metrics;
use dca_venue::{DynVenue, GuardedVenue, PlaceOrderRequest, Venue, VenueError};
use futures_util::FutureExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::reporting::{CredentialWatchdog, CycleEvent, ErrorReporter};

/// Wrap `inner` with the per-class breakers and limiters and the recovery executor.
///
/// Breaker transitions are exported as metrics.
pub fn guard_venue(
    config: &AppConfig,
    inner: DynVenue,
    io_cancel: CancellationToken,
) -> (DynVenue, Arc<RecoveryManager>) {
    let observer: StateChangeObserver = Arc::new(|change: StateChange| {
        Metrics::breaker_transition(&change.name, &change.to.to_string());
    });
    let registry =
        Arc::new(ResilienceRegistry::new(config.resilience.clone()).with_observer(observer));
    let recovery = Arc::new(RecoveryManager::new(
        config.recovery.clone(),
        io_cancel.clone(),
    ));
    let venue = GuardedVenue::new(inner, registry, Arc::clone(&recovery), io_cancel)
        .with_call_timeout(config.call_timeout());
    (Arc::new(venue), recovery)
}

/// Delay until the next wall-clock multiple of `interval`.
///
/// Exactly on a boundary, waits a full interval.
pub fn next_boundary_delay(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let elapsed = now.timestamp_millis().rem_euclid(interval_ms);
    Duration::from_millis((interval_ms - elapsed).unsigned_abs())
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub price: Price,
    /// DCA level after an entry made this cycle.
    pub entered_level: Option<u32>,
    /// Gate that blocked the entry, if any.
    pub blocked_by: Option<&'static str>,
    pub placement: Option<PlacementReport>,
    /// Take-profit legs detected as filled.
    pub fills: usize,
}

impl CycleSummary {
    pub fn entered(&self) -> bool {
        self.entered_level.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    /// The cycle returned an error; it was logged and reported.
    Failed(String),
    /// The cycle panicked; the loop keeps running.
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cancelled: CancelReport,
    /// Quantity sold by the flatten order.
    pub flattened: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Graceful(ShutdownReport),
    /// Cleanup did not finish within the shutdown timeout.
    Forced,
}

pub struct Coordinator {
    config: AppConfig,
    symbol: Symbol,
    venue: DynVenue,
    recovery: Arc<RecoveryManager>,
    sync: Arc<StateSynchronizer>,
    take_profit: Arc<TakeProfitManager>,
    gate: EntryGate,
    signal: Box<dyn SignalSource>,
    stop: CancellationToken,
    io_cancel: CancellationToken,
    reporter: ErrorReporter,
    events: Mutex<Option<mpsc::Receiver<CycleEvent>>>,
    /// Average price the current ladder was built for.
    ladder_avg: Mutex<Option<Price>>,
}

impl Coordinator {
    pub fn new(
        config: AppConfig,
        venue: DynVenue,
        recovery: Arc<RecoveryManager>,
        stop: CancellationToken,
        io_cancel: CancellationToken,
    ) -> AppResult<Self> {
        config.validate()?;
        let symbol = config.symbol();

        let mut sync_config =
            SyncConfig::new(config.category, symbol.clone(), config.base_entry_amount);
        if let Some(quote) = symbol.as_str().strip_prefix(symbol.base_asset()) {
            if !quote.is_empty() {
                sync_config.quote_coin = quote.to_string();
            }
        }
        let sync = Arc::new(StateSynchronizer::new(
            Arc::clone(&venue),
            sync_config,
            io_cancel.clone(),
        ));
        let take_profit = Arc::new(TakeProfitManager::new(
            Arc::clone(&venue),
            Arc::clone(&sync),
            config.take_profit.manager_config(),
            TakeProfitClassifier::new(config.take_profit.classifier.clone()),
            config.take_profit.percent_source(),
        ));
        let gate = EntryGate::new(spacing_from_config(&config.spacing)?, config.max_dca_levels);
        let (reporter, events) = ErrorReporter::channel(config.error_queue_capacity);

        info!(
            symbol = %symbol,
            venue = venue.name(),
            spacing = gate.spacing_name(),
            max_dca_levels = config.max_dca_levels,
            tp_levels = config.take_profit.ladder.levels,
            "Coordinator initialized"
        );

        Ok(Self {
            config,
            symbol,
            venue,
            recovery,
            sync,
            take_profit,
            gate,
            signal: Box::new(AlwaysBuy),
            stop,
            io_cancel,
            reporter,
            events: Mutex::new(Some(events)),
            ladder_avg: Mutex::new(None),
        })
    }

    /// Replace the default [`AlwaysBuy`] signal.
    #[must_use]
    pub fn with_signal(mut self, signal: Box<dyn SignalSource>) -> Self {
        self.signal = signal;
        self
    }

    pub fn synchronizer(&self) -> &Arc<StateSynchronizer> {
        &self.sync
    }

    pub fn take_profit(&self) -> &Arc<TakeProfitManager> {
        &self.take_profit
    }

    fn category(&self) -> Category {
        self.config.category
    }

    /// Run until the stop signal fires, then clean up.
    ///
    /// Returns [`AppError::CredentialHalt`] when the stop came from repeated
    /// credential failures.
    pub async fn run(self) -> AppResult<ShutdownOutcome> {
        let watchdog = self.events.lock().take().map(|events| {
            tokio::spawn(
                CredentialWatchdog::new(self.config.max_credential_failures, self.stop.clone())
                    .run(events),
            )
        });

        info!(
            symbol = %self.symbol,
            interval_secs = self.config.interval_secs,
            "Starting DCA loop"
        );
        self.startup().await;

        loop {
            if !self.wait_for_boundary().await || self.stop.is_cancelled() {
                break;
            }
            self.tick().await;
        }

        let outcome = self.shutdown().await;

        if let Some(handle) = watchdog {
            handle.abort();
            if let Ok(Some(failures)) = handle.await {
                return Err(AppError::CredentialHalt { failures });
            }
        }
        Ok(outcome)
    }

    /// Pre-loop reconciliation: cache constraints, sync the position, and
    /// cancel legs left behind by an earlier process when configured.
    pub async fn startup(&self) {
        if let Err(e) = self.take_profit.refresh_constraints().await {
            warn!(error = %e, "Failed to fetch trading constraints, will retry on first use");
            self.reporter.report("startup_constraints", &e);
        }
        self.sync_position("startup").await;

        if self.config.cancel_orphaned_on_startup {
            let report = self.take_profit.cancel_orphaned().await;
            if report.cancelled > 0 {
                info!(cancelled = report.cancelled, "Cancelled orphaned take-profit legs");
            }
        }
    }

    async fn wait_for_boundary(&self) -> bool {
        let delay = next_boundary_delay(Utc::now(), self.config.interval());
        debug!(delay_ms = delay.as_millis() as u64, "Waiting for next interval boundary");
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.stop.cancelled() => false,
        }
    }

    /// Run one cycle, converting errors and panics into log lines.
    pub async fn tick(&self) -> CycleOutcome {
        let started = Instant::now();
        let outcome = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(Ok(summary)) => CycleOutcome::Completed(summary),
            Ok(Err(e)) => {
                warn!(error = %e, "Cycle failed, skipping");
                self.reporter.report("cycle", &e);
                CycleOutcome::Failed(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Cycle panicked, loop continues");
                CycleOutcome::Panicked(message)
            }
        };
        self.reporter.completed();

        let label = match &outcome {
            CycleOutcome::Completed(_) => "ok",
            CycleOutcome::Failed(_) => "error",
            CycleOutcome::Panicked(_) => "panic",
        };
        Metrics::cycle_completed(label, started.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    /// One cycle body. Only a missing price fails the whole cycle; every other
    /// stage logs, reports and carries on with the data it has.
    pub async fn run_cycle(&self) -> AppResult<CycleSummary> {
        if let Err(e) = self.sync.sync_balance().await {
            warn!(error = %e, "Balance refresh failed, using previous value");
            self.reporter.report("sync_balance", &e);
        }
        self.sync_position("sync_position").await;

        let price = self.venue.get_latest_price(&self.symbol).await?;
        if !price.is_positive() {
            return Err(VenueError::InvalidResponse(format!("non-positive price {price}")).into());
        }
        let mut summary = CycleSummary {
            price,
            ..CycleSummary::default()
        };

        let history = match self
            .venue
            .get_klines(&self.symbol, self.config.kline_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Kline fetch failed, continuing without history");
                self.reporter.report("klines", &e);
                Vec::new()
            }
        };
        self.take_profit.observe_prices(history.clone());

        let snapshot = self.sync.snapshot();
        match self.signal.evaluate(price, &history) {
            Signal::Hold => debug!(signal = self.signal.name(), "Signal holds"),
            Signal::Buy => {
                let decision = self.gate.check(&EntryGateInput {
                    dca_level: snapshot.dca.level,
                    avg_price: snapshot.is_open().then_some(snapshot.position.avg_price),
                    current_price: price,
                    history: &history,
                });
                match decision {
                    GateResult::Pass => match self.execute_entry(price, snapshot.balance).await {
                        Ok(level) => summary.entered_level = level,
                        Err(e) => {
                            warn!(error = %e, price = %price, "Entry failed");
                            self.reporter.report("entry", &e);
                        }
                    },
                    GateResult::Block { gate, reason } => {
                        Metrics::entry_blocked(gate);
                        info!(gate, reason = %reason, price = %price, "Entry blocked");
                        summary.blocked_by = Some(gate);
                    }
                }
            }
        }

        if summary.entered() {
            self.sync_position("resync").await;
        }

        if self.config.take_profit.auto_enabled {
            summary.placement = self.reconcile_take_profit(summary.entered()).await;
        }

        if self.take_profit.tracked_count() > 0 {
            if let Err(e) = self.take_profit.detect_fills().await {
                warn!(error = %e, "Fill detection failed");
                self.reporter.report("detect_fills", &e);
            }
        }
        summary.fills = self.take_profit.take_filled().len();

        self.emit_status(&summary);
        Ok(summary)
    }

    /// Market-buy `base_entry_amount` worth at `price`.
    ///
    /// Returns the new DCA level, or `None` when the entry was skipped.
    async fn execute_entry(&self, price: Price, balance: Option<Decimal>) -> AppResult<Option<u32>> {
        let constraints = self.take_profit.constraints().await?;
        let qty = Size::new(self.config.base_entry_amount / price.inner())
            .round_to_step(constraints.qty_step);

        if !constraints.meets_minimums(qty, price) {
            Metrics::order_skipped("entry_below_minimum");
            warn!(qty = %qty, price = %price, "Entry below venue minimums, skipping");
            return Ok(None);
        }
        if let Some(balance) = balance {
            if balance < qty.notional(price) {
                Metrics::order_skipped("insufficient_balance");
                warn!(balance = %balance, needed = %qty.notional(price), "Insufficient balance for entry, skipping");
                return Ok(None);
            }
        }

        let request =
            PlaceOrderRequest::market(self.category(), self.symbol.clone(), OrderSide::Buy, qty, "entry");
        let ack = self.venue.place_order(request).await?;
        let fill_price = if ack.avg_price.is_positive() {
            ack.avg_price
        } else {
            price
        };
        let level = self.sync.record_entry(fill_price);
        Metrics::order_placed("entry");
        info!(
            symbol = %self.symbol,
            order_id = %ack.order_id,
            qty = %qty,
            price = %fill_price,
            level,
            "Entry executed"
        );
        Ok(Some(level))
    }

    async fn sync_position(&self, stage: &'static str) {
        match self.sync.sync_position().await {
            Ok(SyncOutcome::ResyncRequired) => {
                // Legs gone from the venue filled; record them before cancelling the rest.
                let filled = if self.take_profit.tracked_count() > 0 {
                    match self.take_profit.detect_fills().await {
                        Ok(filled) => filled.len(),
                        Err(e) => {
                            warn!(stage, error = %e, "Fill detection before resync failed");
                            self.reporter.report(stage, &e);
                            0
                        }
                    }
                } else {
                    0
                };
                if filled > 0 {
                    info!(stage, filled, "Position closed by take-profit fills, clearing take-profit state");
                } else {
                    warn!(stage, "Position closed outside the bot, clearing take-profit state");
                }
                self.take_profit.cancel_all().await;
                self.take_profit.clear_tracked();
                *self.ladder_avg.lock() = None;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(stage, error = %e, "Position sync failed, continuing with previous replica");
                self.reporter.report(stage, &e);
            }
        }
    }

    /// Rebuild the ladder when an entry happened or the average price moved.
    async fn reconcile_take_profit(&self, entered: bool) -> Option<PlacementReport> {
        let position = self.sync.position();
        if !position.is_open() {
            *self.ladder_avg.lock() = None;
            return None;
        }
        let built_for = *self.ladder_avg.lock();
        if !entered && built_for == Some(position.avg_price) {
            return None;
        }

        match self.take_profit.update_all(position.avg_price).await {
            Ok(Some(report)) => {
                *self.ladder_avg.lock() = Some(self.sync.position().avg_price);
                Some(report)
            }
            Ok(None) => {
                self.take_profit.clear_tracked();
                *self.ladder_avg.lock() = None;
                None
            }
            Err(e @ OrderError::NonePlaced { .. }) => {
                // Not retried until the average price moves.
                warn!(error = %e, "Position too small for any take-profit leg");
                *self.ladder_avg.lock() = Some(position.avg_price);
                None
            }
            Err(e) => {
                warn!(error = %e, "Take-profit update failed, will retry next cycle");
                self.reporter.report("take_profit", &e);
                None
            }
        }
    }

    fn emit_status(&self, summary: &CycleSummary) {
        let snapshot = self.sync.snapshot();
        let stats = self.recovery.stats();
        let failing = self.recovery.recent_components(self.config.interval());
        for (category, count) in &stats.by_category {
            Metrics::recovery_window(&category.to_string(), *count);
        }
        info!(
            symbol = %self.symbol,
            price = %summary.price,
            size = %snapshot.position.size,
            avg_price = %snapshot.position.avg_price,
            level = snapshot.dca.level,
            balance = ?snapshot.balance,
            legs = self.take_profit.tracked_count(),
            entered = summary.entered(),
            blocked_by = summary.blocked_by.unwrap_or("-"),
            fills = summary.fills,
            recent_errors = stats.total,
            danger = ?stats.danger,
            failing = ?failing,
            "Cycle status"
        );
    }

    /// Cancel legs, flatten and disconnect, bounded by the shutdown timeout.
    ///
    /// Cleanup runs on its own task; if the timer wins the task is aborted and
    /// the outcome is [`ShutdownOutcome::Forced`].
    pub async fn shutdown(&self) -> ShutdownOutcome {
        let timeout = self.config.shutdown.timeout();
        info!(timeout_secs = timeout.as_secs(), "Shutting down");

        let cleanup = Cleanup {
            venue: Arc::clone(&self.venue),
            sync: Arc::clone(&self.sync),
            take_profit: Arc::clone(&self.take_profit),
            category: self.category(),
            symbol: self.symbol.clone(),
            flatten: self.config.shutdown.flatten_on_shutdown,
        };
        let mut handle = tokio::spawn(cleanup.run());

        let outcome = tokio::select! {
            joined = &mut handle => match joined {
                Ok(report) => {
                    info!(
                        cancelled = report.cancelled.cancelled,
                        flattened = ?report.flattened,
                        "Shutdown complete"
                    );
                    ShutdownOutcome::Graceful(report)
                }
                Err(e) => {
                    error!(error = %e, "Cleanup task failed");
                    ShutdownOutcome::Forced
                }
            },
            () = tokio::time::sleep(timeout) => {
                handle.abort();
                warn!(timeout_secs = timeout.as_secs(), "Cleanup exceeded shutdown timeout, forcing shutdown");
                ShutdownOutcome::Forced
            }
        };

        self.io_cancel.cancel();
        outcome
    }
}

struct Cleanup {
    venue: DynVenue,
    sync: Arc<StateSynchronizer>,
    take_profit: Arc<TakeProfitManager>,
    category: Category,
    symbol: Symbol,
    flatten: bool,
}

impl Cleanup {
    async fn run(self) -> ShutdownReport {
        let cancelled = self.take_profit.cancel_all().await;

        let mut flattened = None;
        if self.flatten {
            if let Err(e) = self.sync.sync_position().await {
                warn!(error = %e, "Position sync before flatten failed, using last replica");
            }
            let position = self.sync.position();
            if position.is_open() {
                let request = PlaceOrderRequest::market(
                    self.category,
                    self.symbol.clone(),
                    OrderSide::Sell,
                    position.size,
                    "flatten",
                )
                .reduce_only();
                match self.venue.place_order(request).await {
                    Ok(ack) => {
                        info!(order_id = %ack.order_id, qty = %ack.cum_exec_qty, "Position flattened");
                        flattened = Some(ack.cum_exec_qty);
                    }
                    Err(e) => error!(error = %e, size = %position.size, "Failed to flatten position"),
                }
            }
        }

        self.venue.disconnect().await;
        ShutdownReport {
            cancelled,
            flattened,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
