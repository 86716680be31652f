//! Take-profit leg manager.
//!
//! Owns the tracked leg set. The venue is the ground truth for what is still
//! resting: fill detection and cancellation both start from a venue query.
//!
//! An order on the venue is treated as ours when its id is tracked, or when the
//! classifier recognises it as a take-profit leg.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dca_core::{Category, OrderId, OrderSide, Price, Size, Symbol, TradingConstraints};
use dca_position::StateSynchronizer;
use dca_telemetry::Metrics;
use dca_venue::{DynVenue, OpenOrder, PlaceOrderRequest, Venue, VenueError};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::{ClassifyContext, TakeProfitClassifier};
use crate::distribution::distribute_quantity;
use crate::error::{OrderError, OrderResult};
use crate::leg::TakeProfitLeg;
use crate::percent::TakeProfitPercentSource;

/// Relative average-price difference above which the venue's value replaces the caller's.
const AVG_PRICE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Take-profit ladder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeProfitConfig {
    /// Number of legs. Default: 5.
    #[serde(default = "default_levels")]
    pub levels: u32,
    /// Share of the position per leg. Default: 0.20.
    #[serde(default = "default_level_fraction")]
    pub level_fraction: Decimal,
    /// Wall-clock budget for one placement batch (ms). Default: 90,000.
    #[serde(default = "default_batch_budget_ms")]
    pub batch_budget_ms: u64,
    /// Stop placing once less than this remains of the budget (ms). Default: 5,000.
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
}

fn default_levels() -> u32 {
    5
}

fn default_level_fraction() -> Decimal {
    Decimal::new(20, 2)
}

fn default_batch_budget_ms() -> u64 {
    90_000
}

fn default_safety_margin_ms() -> u64 {
    5_000
}

impl Default for TakeProfitConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            level_fraction: default_level_fraction(),
            batch_budget_ms: default_batch_budget_ms(),
            safety_margin_ms: default_safety_margin_ms(),
        }
    }
}

impl TakeProfitConfig {
    pub fn validate(&self) -> OrderResult<()> {
        if self.levels == 0 {
            return Err(OrderError::InvalidConfig("levels must be at least 1".into()));
        }
        if self.level_fraction <= Decimal::ZERO
            || self.level_fraction * Decimal::from(self.levels) > Decimal::ONE
        {
            return Err(OrderError::InvalidConfig(format!(
                "level_fraction {} x {} levels must be in (0, 1]",
                self.level_fraction, self.levels
            )));
        }
        if self.safety_margin_ms >= self.batch_budget_ms {
            return Err(OrderError::InvalidConfig(
                "safety margin must be shorter than the batch budget".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a placement batch. Partial placement is a success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementReport {
    pub placed: u32,
    /// Unfunded or below venue minimums.
    pub skipped: u32,
    pub failed: u32,
    /// Legs not attempted because the batch budget ran out.
    pub not_attempted: u32,
    pub cancelled_previous: u32,
}

/// Where the cancellation targets came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    Venue,
    /// The venue query failed; tracked legs were cancelled from memory.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReport {
    pub cancelled: u32,
    /// Already gone on the venue.
    pub not_found: u32,
    pub failed: u32,
    pub source: CancelSource,
}

impl CancelReport {
    fn new(source: CancelSource) -> Self {
        Self {
            cancelled: 0,
            not_found: 0,
            failed: 0,
            source,
        }
    }
}

pub struct TakeProfitManager {
    venue: DynVenue,
    sync: Arc<StateSynchronizer>,
    config: TakeProfitConfig,
    classifier: TakeProfitClassifier,
    percent_source: Box<dyn TakeProfitPercentSource>,
    legs: Mutex<BTreeMap<OrderId, TakeProfitLeg>>,
    filled: Mutex<Vec<TakeProfitLeg>>,
    constraints: RwLock<Option<TradingConstraints>>,
    history: RwLock<Vec<Price>>,
}

impl TakeProfitManager {
    pub fn new(
        venue: DynVenue,
        sync: Arc<StateSynchronizer>,
        config: TakeProfitConfig,
        classifier: TakeProfitClassifier,
        percent_source: Box<dyn TakeProfitPercentSource>,
    ) -> Self {
        Self {
            venue,
            sync,
            config,
            classifier,
            percent_source,
            legs: Mutex::new(BTreeMap::new()),
            filled: Mutex::new(Vec::new()),
            constraints: RwLock::new(None),
            history: RwLock::new(Vec::new()),
        }
    }

    fn symbol(&self) -> &Symbol {
        self.sync.symbol()
    }

    fn category(&self) -> Category {
        self.sync.category()
    }

    /// Tracked legs ordered by level.
    pub fn legs(&self) -> Vec<TakeProfitLeg> {
        let mut legs: Vec<TakeProfitLeg> = self.legs.lock().values().cloned().collect();
        legs.sort_by_key(|l| l.level);
        legs
    }

    pub fn tracked_count(&self) -> usize {
        self.legs.lock().len()
    }

    /// Drain legs detected as filled since the last call.
    pub fn take_filled(&self) -> Vec<TakeProfitLeg> {
        std::mem::take(&mut *self.filled.lock())
    }

    /// Forget all tracked legs without touching the venue.
    pub fn clear_tracked(&self) {
        self.legs.lock().clear();
    }

    /// Price history used by the take-profit distance source.
    pub fn observe_prices(&self, history: Vec<Price>) {
        *self.history.write() = history;
    }

    /// Cached venue constraints, fetched on first use.
    pub async fn constraints(&self) -> OrderResult<TradingConstraints> {
        if let Some(constraints) = *self.constraints.read() {
            return Ok(constraints);
        }
        self.refresh_constraints().await
    }

    pub async fn refresh_constraints(&self) -> OrderResult<TradingConstraints> {
        let constraints = self
            .venue
            .get_trading_constraints(self.category(), self.symbol())
            .await?;
        constraints
            .validate()
            .map_err(|e| OrderError::Venue(VenueError::InvalidResponse(e.to_string())))?;
        *self.constraints.write() = Some(constraints);
        debug!(symbol = %self.symbol(), ?constraints, "Trading constraints cached");
        Ok(constraints)
    }

    /// Replace the whole ladder for a position of `total` at `avg_price`.
    ///
    /// Fails only when no leg could be placed.
    pub async fn place_all(&self, total: Size, avg_price: Price) -> OrderResult<PlacementReport> {
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.batch_budget_ms);
        let margin = Duration::from_millis(self.config.safety_margin_ms);
        let mut report = PlacementReport::default();

        // Clear first: a crash mid-placement must not leave stale ids tracked.
        let previous = std::mem::take(&mut *self.legs.lock());
        for leg in previous.values() {
            match self
                .venue
                .cancel_order(self.category(), self.symbol(), &leg.order_id)
                .await
            {
                Ok(()) => report.cancelled_previous += 1,
                Err(VenueError::OrderNotFound(_)) => {}
                Err(e) => warn!(
                    order_id = %leg.order_id,
                    level = leg.level,
                    error = %e,
                    "Failed to cancel previous take-profit leg, continuing"
                ),
            }
        }

        let constraints = self.constraints().await?;
        let quantities = distribute_quantity(
            total,
            self.config.levels,
            self.config.level_fraction,
            &constraints,
        );
        let top_pct = {
            let history = self.history.read();
            self.percent_source.percent(&history)
        };
        let levels = Decimal::from(self.config.levels);

        for (idx, qty) in quantities.iter().copied().enumerate() {
            let level = idx as u32 + 1;

            let remaining = budget.saturating_sub(started.elapsed());
            if remaining < margin {
                report.not_attempted = self.config.levels - idx as u32;
                Metrics::order_skipped("budget_exhausted");
                warn!(
                    symbol = %self.symbol(),
                    placed = report.placed,
                    not_attempted = report.not_attempted,
                    "Take-profit batch budget exhausted"
                );
                break;
            }

            let level_pct = top_pct * Decimal::from(level) / levels;
            let target =
                Price::new(avg_price.inner() * (Decimal::ONE + level_pct)).round_to_tick(constraints.tick_size);

            if !qty.is_positive() || !constraints.meets_minimums(qty, target) {
                report.skipped += 1;
                Metrics::order_skipped(if qty.is_positive() { "below_minimum" } else { "unfunded" });
                debug!(level, qty = %qty, target = %target, "Skipping take-profit leg below venue minimums");
                continue;
            }

            let request = PlaceOrderRequest::limit(
                self.category(),
                self.symbol().clone(),
                OrderSide::Sell,
                qty,
                target,
                &format!("tp{level}"),
            )
            .reduce_only();

            match tokio::time::timeout(remaining, self.venue.place_order(request)).await {
                Ok(Ok(ack)) => {
                    info!(
                        symbol = %self.symbol(),
                        level,
                        order_id = %ack.order_id,
                        qty = %qty,
                        target = %target,
                        "Take-profit leg placed"
                    );
                    Metrics::order_placed("take_profit");
                    self.legs.lock().insert(
                        ack.order_id.clone(),
                        TakeProfitLeg::pending(level, target, qty, ack.order_id),
                    );
                    report.placed += 1;
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    Metrics::order_skipped("rejected");
                    warn!(level, qty = %qty, target = %target, error = %e, "Take-profit leg placement failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(level, "Take-profit leg placement exceeded the batch budget");
                }
            }
        }

        if report.placed == 0 {
            return Err(OrderError::NonePlaced {
                skipped: report.skipped,
                failed: report.failed,
            });
        }
        info!(
            symbol = %self.symbol(),
            placed = report.placed,
            skipped = report.skipped,
            failed = report.failed,
            avg_price = %avg_price,
            "Take-profit ladder placed"
        );
        Ok(report)
    }

    /// Re-derive the ladder after the average entry moved.
    ///
    /// Quantity and average price come from a fresh venue sync; the venue's
    /// average wins when it differs from `avg_price`. Returns `None` when the
    /// venue shows no open position.
    pub async fn update_all(&self, avg_price: Price) -> OrderResult<Option<PlacementReport>> {
        self.sync.sync_position().await?;
        let position = self.sync.position();
        if !position.is_open() {
            info!(symbol = %self.symbol(), "No open position, nothing to protect");
            return Ok(None);
        }

        let effective_avg = if differs_materially(position.avg_price, avg_price) {
            info!(
                supplied = %avg_price,
                venue = %position.avg_price,
                "Using venue average price for take-profit ladder"
            );
            position.avg_price
        } else {
            avg_price
        };

        self.reconcile().await?;
        self.place_all(position.size, effective_avg).await.map(Some)
    }

    /// Move tracked legs that are no longer resting on the venue to the filled set.
    pub async fn detect_fills(&self) -> OrderResult<Vec<TakeProfitLeg>> {
        let open = self
            .venue
            .get_open_orders(self.category(), self.symbol())
            .await?;
        Ok(self.mark_missing_as_filled(&open))
    }

    /// Cancel every leg of ours still resting on the venue.
    ///
    /// Targets come from a venue query; memory is used only when that fails.
    /// Orders already gone count as done, so repeated calls are harmless.
    pub async fn cancel_all(&self) -> CancelReport {
        self.cancel_matching("cancel_all").await
    }

    /// Cancel legs left behind by an earlier process.
    pub async fn cancel_orphaned(&self) -> CancelReport {
        self.cancel_matching("cancel_orphaned").await
    }

    async fn cancel_matching(&self, operation: &'static str) -> CancelReport {
        let (targets, source) = match self
            .venue
            .get_open_orders(self.category(), self.symbol())
            .await
        {
            Ok(open) => {
                let tracked = self.tracked_ids();
                let targets: Vec<OrderId> = open
                    .iter()
                    .filter(|o| self.is_ours(o, &tracked))
                    .map(|o| o.order_id.clone())
                    .collect();
                (targets, CancelSource::Venue)
            }
            Err(e) => {
                warn!(operation, error = %e, "Open order query failed, cancelling tracked legs from memory");
                (self.tracked_ids().into_iter().collect(), CancelSource::Memory)
            }
        };

        let mut report = CancelReport::new(source);
        for order_id in targets {
            match self
                .venue
                .cancel_order(self.category(), self.symbol(), &order_id)
                .await
            {
                Ok(()) => {
                    report.cancelled += 1;
                    self.legs.lock().remove(&order_id);
                }
                Err(VenueError::OrderNotFound(_)) => {
                    report.not_found += 1;
                    self.legs.lock().remove(&order_id);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(operation, order_id = %order_id, error = %e, "Failed to cancel take-profit leg");
                }
            }
        }

        if source == CancelSource::Venue && report.failed == 0 {
            // Tracked ids absent from the venue are no longer resting.
            self.legs.lock().clear();
        }
        info!(
            operation,
            cancelled = report.cancelled,
            not_found = report.not_found,
            failed = report.failed,
            source = ?report.source,
            "Take-profit cancellation finished"
        );
        report
    }

    /// Detect fills and adopt untracked legs from the venue.
    async fn reconcile(&self) -> OrderResult<()> {
        let open = self
            .venue
            .get_open_orders(self.category(), self.symbol())
            .await?;
        self.mark_missing_as_filled(&open);

        let tracked = self.tracked_ids();
        let ctx_position = self.sync.position();
        let ctx = ClassifyContext {
            symbol: self.symbol(),
            avg_price: Some(ctx_position.avg_price),
            position_size: ctx_position.size,
            tracked: &tracked,
        };
        let adopted: Vec<TakeProfitLeg> = open
            .iter()
            .filter(|o| !tracked.contains(&o.order_id))
            .filter(|o| self.classifier.is_take_profit_order(o, &ctx))
            .map(|o| TakeProfitLeg::pending(0, o.price, o.qty, o.order_id.clone()))
            .collect();

        if !adopted.is_empty() {
            info!(count = adopted.len(), "Adopting untracked take-profit legs from venue");
            let mut legs = self.legs.lock();
            for leg in adopted {
                legs.insert(leg.order_id.clone(), leg);
            }
        }
        Ok(())
    }

    fn mark_missing_as_filled(&self, open: &[OpenOrder]) -> Vec<TakeProfitLeg> {
        let open_ids: HashSet<&OrderId> = open.iter().map(|o| &o.order_id).collect();
        let newly_filled: Vec<TakeProfitLeg> = {
            let mut legs = self.legs.lock();
            let missing: Vec<OrderId> = legs
                .keys()
                .filter(|id| !open_ids.contains(id))
                .cloned()
                .collect();
            missing
                .into_iter()
                .filter_map(|id| legs.remove(&id))
                .map(TakeProfitLeg::into_filled)
                .collect()
        };

        if !newly_filled.is_empty() {
            for leg in &newly_filled {
                info!(
                    symbol = %self.symbol(),
                    level = leg.level,
                    order_id = %leg.order_id,
                    qty = %leg.quantity,
                    target = %leg.target_price,
                    "Take-profit leg filled"
                );
            }
            Metrics::take_profit_filled(self.symbol().as_str(), newly_filled.len());
            self.filled.lock().extend(newly_filled.iter().cloned());
        }
        newly_filled
    }

    fn tracked_ids(&self) -> HashSet<OrderId> {
        self.legs.lock().keys().cloned().collect()
    }

    fn is_ours(&self, order: &OpenOrder, tracked: &HashSet<OrderId>) -> bool {
        if tracked.contains(&order.order_id) {
            return true;
        }
        let position = self.sync.position();
        let ctx = ClassifyContext {
            symbol: self.symbol(),
            avg_price: Some(position.avg_price),
            position_size: position.size,
            tracked,
        };
        self.classifier.is_take_profit_order(order, &ctx)
    }
}

fn differs_materially(venue: Price, supplied: Price) -> bool {
    if !venue.is_positive() {
        return false;
    }
    ((venue.inner() - supplied.inner()).abs() / venue.inner()) > AVG_PRICE_EPSILON
}
