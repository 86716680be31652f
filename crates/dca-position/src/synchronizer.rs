//! State synchronizer.
//!
//! The only writer of the position replica. The replica is never derived from
//! fills: every accepted venue report overwrites size, notional and average
//! price together under the replica's write lock.
//!
//! # Locks
//!
//! - `position` (RwLock): size, notional, average price
//! - `dca` (Mutex): DCA level and last entry
//! - `balance` (RwLock): last fetched quote balance
//!
//! When both are needed, `position` is taken before `dca`.
//!
//! # DCA level
//!
//! The level counts entry decisions. It is estimated from the position only at
//! cold start (level 0 with an open venue position) and otherwise preserved
//! across reconciliation. A venue-side flatten resets it to 0.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dca_core::{Category, Price, Size, Symbol};
use dca_telemetry::Metrics;
use dca_venue::{DynVenue, Venue, VenuePosition};
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PositionError, PositionResult};

/// Sizes and notionals at or below this are treated as zero.
const DUST: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Synchronizer settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub category: Category,
    pub symbol: Symbol,
    /// Quote amount of one entry, used for the cold-start level estimate.
    pub base_entry_amount: Decimal,
    /// Quote coin for balance refreshes.
    pub quote_coin: String,
    /// Position fetch attempts before surfacing an error. Default: 3.
    /// A venue that retries its own calls gets a single attempt.
    pub fetch_attempts: u32,
    /// First retry delay; attempt `n` waits `n` times this. Default: 200ms.
    pub fetch_retry_delay: Duration,
}

impl SyncConfig {
    pub fn new(category: Category, symbol: Symbol, base_entry_amount: Decimal) -> Self {
        Self {
            category,
            symbol,
            base_entry_amount,
            quote_coin: "USDT".to_string(),
            fetch_attempts: 3,
            fetch_retry_delay: Duration::from_millis(200),
        }
    }
}

/// Local replica of the venue position. Long-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub size: Size,
    pub notional: Decimal,
    pub avg_price: Price,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat(symbol: Symbol) -> Self {
        Self {
            symbol,
            size: Size::ZERO,
            notional: Decimal::ZERO,
            avg_price: Price::ZERO,
            updated_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.size.inner() > DUST || self.notional > DUST
    }
}

/// DCA bookkeeping, guarded separately from the position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcaState {
    pub level: u32,
    pub last_entry_price: Option<Price>,
    pub last_entry_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of everything the synchronizer owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub position: Position,
    pub dca: DcaState,
    pub balance: Option<Decimal>,
}

impl PositionSnapshot {
    pub fn is_open(&self) -> bool {
        self.position.is_open()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// An open position was reported and copied into the replica.
    Updated(Position),
    /// No open position, and the replica was already flat.
    Flat,
    /// The venue is flat but the replica was open. The replica and DCA level
    /// were reset; dependent state must be cleared this cycle.
    ResyncRequired,
}

/// Venue position fields that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedRecord {
    pub size: Size,
    pub notional: Decimal,
    pub avg_price: Price,
}

/// Validate one venue position record for `symbol`.
///
/// Accepted only when it is for `symbol`, not a short, carries a non-trivial
/// size or notional, and has a strictly positive average price. An unparseable
/// size or notional counts as absent and is derived from the other field.
pub fn accept_record(symbol: &Symbol, record: &VenuePosition) -> Option<AcceptedRecord> {
    if Symbol::new(record.symbol.as_str()) != *symbol || record.is_sell() {
        return None;
    }

    let avg_price = match record.avg_price() {
        Ok(avg) if avg > Decimal::ZERO => avg,
        Ok(_) => return None,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "Rejecting position record");
            return None;
        }
    };

    let size = record.size().ok().filter(|s| *s > DUST);
    let notional = record.notional().ok().filter(|n| *n > DUST);
    let (size, notional) = match (size, notional) {
        (Some(size), Some(notional)) => (size, notional),
        (Some(size), None) => (size, size * avg_price),
        (None, Some(notional)) => (notional / avg_price, notional),
        (None, None) => return None,
    };

    Some(AcceptedRecord {
        size: Size::new(size),
        notional,
        avg_price: Price::new(avg_price),
    })
}

/// Reconciles the local replica against the venue.
pub struct StateSynchronizer {
    venue: DynVenue,
    config: SyncConfig,
    position: RwLock<Position>,
    dca: Mutex<DcaState>,
    balance: RwLock<Option<Decimal>>,
    cancel: CancellationToken,
}

impl StateSynchronizer {
    pub fn new(venue: DynVenue, config: SyncConfig, cancel: CancellationToken) -> Self {
        let position = Position::flat(config.symbol.clone());
        Self {
            venue,
            config,
            position: RwLock::new(position),
            dca: Mutex::new(DcaState::default()),
            balance: RwLock::new(None),
            cancel,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.config.symbol
    }

    pub fn category(&self) -> Category {
        self.config.category
    }

    /// Reconcile the replica with the venue's position report.
    ///
    /// Fetch errors surface after the configured attempts; callers keep using
    /// the previous snapshot.
    pub async fn sync_position(&self) -> PositionResult<SyncOutcome> {
        let records = self.fetch_positions().await?;
        let symbol = &self.config.symbol;
        let accepted = records.iter().find_map(|r| accept_record(symbol, r));

        let outcome = match accepted {
            Some(record) => {
                let position = Position {
                    symbol: symbol.clone(),
                    size: record.size,
                    notional: record.notional,
                    avg_price: record.avg_price,
                    updated_at: Some(Utc::now()),
                };
                let level = {
                    let mut replica = self.position.write();
                    *replica = position.clone();
                    let mut dca = self.dca.lock();
                    if dca.level == 0 {
                        dca.level = self.estimate_level(record.notional);
                        info!(
                            symbol = %symbol,
                            level = dca.level,
                            notional = %record.notional,
                            "Estimated DCA level from existing position"
                        );
                    }
                    dca.level
                };
                debug!(
                    symbol = %symbol,
                    size = %position.size,
                    avg_price = %position.avg_price,
                    level,
                    "Position synced"
                );
                SyncOutcome::Updated(position)
            }
            None => {
                let was_open = {
                    let mut replica = self.position.write();
                    let was_open = replica.is_open();
                    if was_open {
                        *replica = Position::flat(symbol.clone());
                        *self.dca.lock() = DcaState::default();
                    }
                    was_open
                };
                if was_open {
                    warn!(symbol = %symbol, "Venue reports no position while replica was open, resync required");
                    SyncOutcome::ResyncRequired
                } else {
                    SyncOutcome::Flat
                }
            }
        };

        let label = match &outcome {
            SyncOutcome::Updated(_) => "updated",
            SyncOutcome::Flat => "flat",
            SyncOutcome::ResyncRequired => "resync_required",
        };
        Metrics::position_sync(label);
        let snapshot = self.snapshot();
        Metrics::position_state(
            snapshot.position.size.inner().to_f64().unwrap_or_default(),
            snapshot.dca.level,
        );
        Ok(outcome)
    }

    /// Refresh the quote balance.
    pub async fn sync_balance(&self) -> PositionResult<Decimal> {
        let balance = self
            .venue
            .get_balance(&self.config.quote_coin)
            .await
            .map_err(PositionError::Balance)?;
        *self.balance.write() = Some(balance);
        Ok(balance)
    }

    /// Record an executed entry.
    pub fn record_entry(&self, price: Price) -> u32 {
        let mut dca = self.dca.lock();
        dca.level += 1;
        dca.last_entry_price = Some(price);
        dca.last_entry_at = Some(Utc::now());
        dca.level
    }

    pub fn dca_level(&self) -> u32 {
        self.dca.lock().level
    }

    pub fn position(&self) -> Position {
        self.position.read().clone()
    }

    pub fn balance(&self) -> Option<Decimal> {
        *self.balance.read()
    }

    /// Consistent copy of position, DCA state and balance.
    pub fn snapshot(&self) -> PositionSnapshot {
        let position = self.position.read();
        let dca = self.dca.lock();
        PositionSnapshot {
            position: position.clone(),
            dca: dca.clone(),
            balance: *self.balance.read(),
        }
    }

    fn estimate_level(&self, notional: Decimal) -> u32 {
        if self.config.base_entry_amount <= Decimal::ZERO {
            return 1;
        }
        (notional / self.config.base_entry_amount)
            .ceil()
            .to_u32()
            .unwrap_or(u32::MAX)
            .max(1)
    }

    async fn fetch_positions(&self) -> PositionResult<Vec<VenuePosition>> {
        let attempts = if self.venue.retries_calls() {
            1
        } else {
            self.config.fetch_attempts.max(1)
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .venue
                .get_positions(self.config.category, &self.config.symbol)
                .await
            {
                Ok(records) => return Ok(records),
                Err(e) if attempt >= attempts => {
                    Metrics::position_sync("failed");
                    return Err(PositionError::FetchFailed {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.config.fetch_retry_delay * attempt;
                    warn!(
                        symbol = %self.config.symbol,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Position fetch failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.cancel.cancelled() => return Err(PositionError::Cancelled),
                    }
                }
            }
        }
    }
}
