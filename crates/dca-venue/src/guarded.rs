//! Resilience-guarded venue adapter.
//!
//! Each call runs, inside the recovery executor:
//! rate limiter (one token) -> circuit breaker -> per-call timeout -> inner venue.
//!
//! Only infrastructure failures (network, timeout, temporary, rate limit) count
//! against the breaker. A rejected order proves the venue is answering.

use std::sync::Arc;
use std::time::Duration;

use dca_core::{Category, OrderId, Price, Symbol, TradingConstraints};
use dca_resilience::{Categorize, OperationClass, RecoveryManager, ResilienceRegistry};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{VenueError, VenueResult};
use crate::types::{OpenOrder, OrderAck, PlaceOrderRequest, VenuePosition};
use crate::venue::{BoxFuture, DynVenue, Venue};

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

const COMPONENT: &str = "venue";

pub struct GuardedVenue {
    inner: DynVenue,
    registry: Arc<ResilienceRegistry>,
    recovery: Arc<RecoveryManager>,
    cancel: CancellationToken,
    call_timeout: Duration,
}

impl GuardedVenue {
    pub fn new(
        inner: DynVenue,
        registry: Arc<ResilienceRegistry>,
        recovery: Arc<RecoveryManager>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            registry,
            recovery,
            cancel,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    async fn guarded<'a, T, F>(
        &'a self,
        class: OperationClass,
        operation: &'static str,
        f: F,
    ) -> VenueResult<T>
    where
        T: Send + 'a,
        F: Fn() -> BoxFuture<'a, VenueResult<T>> + Send + Sync + 'a,
    {
        let breaker = self.registry.breaker_for(class);
        let limiter = self.registry.limiter_for(class);
        let (breaker, limiter, f) = (&breaker, &limiter, &f);

        self.recovery
            .execute_with_recovery(COMPONENT, operation, || async move {
                limiter.wait_n(&self.cancel, 1).await?;
                breaker.try_acquire()?;

                debug!(class = %class, operation, "Venue call");
                let outcome = match tokio::time::timeout(self.call_timeout, f()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(VenueError::Timeout {
                        operation,
                        after: self.call_timeout,
                    }),
                };

                match &outcome {
                    Err(e) if e.category().is_infrastructure() => breaker.record_failure(),
                    _ => breaker.record_success(),
                }
                outcome
            })
            .await
    }
}

impl Venue for GuardedVenue {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn retries_calls(&self) -> bool {
        true
    }

    fn get_positions<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<Vec<VenuePosition>>> {
        Box::pin(self.guarded(OperationClass::AccountData, "get_positions", move || {
            self.inner.get_positions(category, symbol)
        }))
    }

    fn get_open_orders<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<Vec<OpenOrder>>> {
        Box::pin(self.guarded(OperationClass::AccountData, "get_open_orders", move || {
            self.inner.get_open_orders(category, symbol)
        }))
    }

    fn place_order(&self, request: PlaceOrderRequest) -> BoxFuture<'_, VenueResult<OrderAck>> {
        Box::pin(self.guarded(OperationClass::Trading, "place_order", move || {
            self.inner.place_order(request.clone())
        }))
    }

    fn cancel_order<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(self.guarded(OperationClass::Trading, "cancel_order", move || {
            self.inner.cancel_order(category, symbol, order_id)
        }))
    }

    fn get_latest_price<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, VenueResult<Price>> {
        Box::pin(self.guarded(OperationClass::MarketData, "get_latest_price", move || {
            self.inner.get_latest_price(symbol)
        }))
    }

    fn get_trading_constraints<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<TradingConstraints>> {
        Box::pin(
            self.guarded(OperationClass::MarketData, "get_trading_constraints", move || {
                self.inner.get_trading_constraints(category, symbol)
            }),
        )
    }

    fn get_balance<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, VenueResult<Decimal>> {
        Box::pin(self.guarded(OperationClass::AccountData, "get_balance", move || {
            self.inner.get_balance(coin)
        }))
    }

    fn get_klines<'a>(
        &'a self,
        symbol: &'a Symbol,
        limit: usize,
    ) -> BoxFuture<'a, VenueResult<Vec<Price>>> {
        Box::pin(self.guarded(OperationClass::MarketData, "get_klines", move || {
            self.inner.get_klines(symbol, limit)
        }))
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        self.inner.disconnect()
    }
}
