//! In-memory paper venue.
//!
//! Market orders fill immediately at the current price. Limit orders rest until
//! [`PaperVenue::set_price`] crosses them. Failures queued with
//! [`PaperVenue::fail_next`] are returned, one per call, by whichever method is
//! called next.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dca_core::{
    Category, OrderId, OrderSide, OrderType, Price, Size, Symbol, TradingConstraints,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{VenueError, VenueResult};
use crate::types::{OpenOrder, OrderAck, PlaceOrderRequest, VenuePosition};
use crate::venue::{BoxFuture, Venue};

const MAX_HISTORY: usize = 1_000;

#[derive(Debug, Clone, Copy)]
struct PaperPosition {
    size: Size,
    avg_price: Price,
}

#[derive(Debug)]
struct PaperState {
    price: Price,
    history: VecDeque<Price>,
    quote_balance: Decimal,
    position: Option<PaperPosition>,
    open_orders: BTreeMap<OrderId, OpenOrder>,
    constraints: TradingConstraints,
    placed: u64,
    cancelled: u64,
}

impl PaperState {
    fn buy(&mut self, qty: Size, price: Price) {
        self.quote_balance -= qty.notional(price);
        self.position = Some(match self.position {
            Some(pos) => {
                let total = pos.size + qty;
                let cost = pos.size.notional(pos.avg_price) + qty.notional(price);
                PaperPosition {
                    size: total,
                    avg_price: Price::new(cost / total.inner()),
                }
            }
            None => PaperPosition {
                size: qty,
                avg_price: price,
            },
        });
    }

    /// Sell up to `qty`; returns the quantity actually sold.
    fn sell(&mut self, qty: Size, price: Price) -> Size {
        let Some(pos) = self.position else {
            return Size::ZERO;
        };
        let sold = qty.min(pos.size);
        self.quote_balance += sold.notional(price);
        let remaining = pos.size - sold;
        self.position = remaining.is_positive().then_some(PaperPosition {
            size: remaining,
            avg_price: pos.avg_price,
        });
        sold
    }

    fn fill_crossed(&mut self) {
        let price = self.price;
        let crossed: Vec<OrderId> = self
            .open_orders
            .values()
            .filter(|o| match o.side {
                OrderSide::Sell => o.price <= price,
                OrderSide::Buy => o.price >= price,
            })
            .map(|o| o.order_id.clone())
            .collect();

        for order_id in crossed {
            let Some(order) = self.open_orders.remove(&order_id) else {
                continue;
            };
            match order.side {
                OrderSide::Sell => {
                    self.sell(order.qty, order.price);
                }
                OrderSide::Buy => self.buy(order.qty, order.price),
            }
            info!(order_id = %order.order_id, side = %order.side, price = %order.price, qty = %order.qty, "Paper limit order filled");
        }
    }
}

/// In-memory venue for tests and paper runs, trading a single symbol.
#[derive(Debug)]
pub struct PaperVenue {
    symbol: Symbol,
    state: Mutex<PaperState>,
    failures: Mutex<VecDeque<VenueError>>,
    latency: Mutex<Duration>,
    next_id: AtomicU64,
}

impl PaperVenue {
    pub fn new(symbol: Symbol, price: Price, quote_balance: Decimal) -> Self {
        Self {
            symbol,
            state: Mutex::new(PaperState {
                price,
                history: VecDeque::from([price]),
                quote_balance,
                position: None,
                open_orders: BTreeMap::new(),
                constraints: TradingConstraints::default(),
                placed: 0,
                cancelled: 0,
            }),
            failures: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_constraints(self, constraints: TradingConstraints) -> Self {
        self.state.lock().constraints = constraints;
        self
    }

    /// Make the next call fail with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, err: VenueError) {
        self.failures.lock().push_back(err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Move the market, filling any resting limit order the new price crosses.
    pub fn set_price(&self, price: Price) {
        let mut state = self.state.lock();
        state.price = price;
        state.history.push_back(price);
        while state.history.len() > MAX_HISTORY {
            state.history.pop_front();
        }
        state.fill_crossed();
    }

    /// Close the position outside the bot, as a manual close or liquidation would.
    pub fn close_position_externally(&self) {
        let mut state = self.state.lock();
        let price = state.price;
        if let Some(pos) = state.position {
            state.sell(pos.size, price);
        }
    }

    /// Rest an order that this process did not place.
    pub fn insert_foreign_order(&self, side: OrderSide, price: Price, qty: Size) -> OrderId {
        let order_id = self.next_order_id();
        let order = OpenOrder {
            order_id: order_id.clone(),
            symbol: self.symbol.clone(),
            side,
            order_type: OrderType::Limit,
            price,
            qty,
        };
        self.state.lock().open_orders.insert(order_id.clone(), order);
        order_id
    }

    pub fn open_orders(&self) -> Vec<OpenOrder> {
        self.state.lock().open_orders.values().cloned().collect()
    }

    /// Current position as (size, average price).
    pub fn position(&self) -> Option<(Size, Price)> {
        self.state.lock().position.map(|p| (p.size, p.avg_price))
    }

    pub fn quote_balance(&self) -> Decimal {
        self.state.lock().quote_balance
    }

    pub fn placed_count(&self) -> u64 {
        self.state.lock().placed
    }

    pub fn cancelled_count(&self) -> u64 {
        self.state.lock().cancelled
    }

    fn next_order_id(&self) -> OrderId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        OrderId::new(format!("paper-{n:06}"))
    }

    /// Apply latency and any queued failure.
    async fn prelude(&self) -> VenueResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn place(&self, request: &PlaceOrderRequest) -> VenueResult<OrderAck> {
        if request.symbol != self.symbol {
            return Err(VenueError::Rejected(format!(
                "unknown symbol {}",
                request.symbol
            )));
        }

        let mut state = self.state.lock();
        let market_price = state.price;
        let order_price = match request.order_type {
            OrderType::Market => market_price,
            OrderType::Limit => request
                .price
                .filter(|p| p.is_positive())
                .ok_or_else(|| VenueError::Rejected("limit order without price".to_string()))?,
        };

        if !state.constraints.meets_minimums(request.qty, order_price) {
            return Err(VenueError::Rejected(format!(
                "qty {} at {} below venue minimums",
                request.qty, order_price
            )));
        }
        if request.reduce_only && request.side == OrderSide::Sell && state.position.is_none() {
            return Err(VenueError::Position(
                "reduce-only order with no open position".to_string(),
            ));
        }

        let order_id = self.next_order_id();
        state.placed += 1;
        debug!(order_id = %order_id, link_id = %request.link_id, side = %request.side, qty = %request.qty, price = %order_price, "Paper order accepted");

        match request.order_type {
            OrderType::Market => {
                let filled = match request.side {
                    OrderSide::Buy => {
                        let cost = request.qty.notional(market_price);
                        if cost > state.quote_balance {
                            state.placed -= 1;
                            return Err(VenueError::InsufficientBalance(format!(
                                "need {cost}, have {}",
                                state.quote_balance
                            )));
                        }
                        state.buy(request.qty, market_price);
                        request.qty
                    }
                    OrderSide::Sell => state.sell(request.qty, market_price),
                };
                Ok(OrderAck {
                    order_id,
                    status: "Filled".to_string(),
                    cum_exec_qty: filled,
                    cum_exec_value: filled.notional(market_price),
                    avg_price: market_price,
                })
            }
            OrderType::Limit => {
                state.open_orders.insert(
                    order_id.clone(),
                    OpenOrder {
                        order_id: order_id.clone(),
                        symbol: request.symbol.clone(),
                        side: request.side,
                        order_type: OrderType::Limit,
                        price: order_price,
                        qty: request.qty,
                    },
                );
                state.fill_crossed();
                Ok(OrderAck {
                    order_id,
                    status: "New".to_string(),
                    cum_exec_qty: Size::ZERO,
                    cum_exec_value: Decimal::ZERO,
                    avg_price: Price::ZERO,
                })
            }
        }
    }
}

impl Venue for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    fn get_positions<'a>(
        &'a self,
        _category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<Vec<VenuePosition>>> {
        Box::pin(async move {
            self.prelude().await?;
            if *symbol != self.symbol {
                return Ok(Vec::new());
            }
            let state = self.state.lock();
            let record = match state.position {
                Some(pos) => VenuePosition {
                    symbol: symbol.to_string(),
                    side: OrderSide::Buy.to_string(),
                    size: pos.size.to_string(),
                    position_value: pos.size.notional(pos.avg_price).normalize().to_string(),
                    avg_price: pos.avg_price.to_string(),
                    mark_price: state.price.to_string(),
                    unrealised_pnl: ((state.price - pos.avg_price).inner() * pos.size.inner())
                        .normalize()
                        .to_string(),
                },
                // Flat positions are still reported, zeroed, like most venues do.
                None => VenuePosition {
                    symbol: symbol.to_string(),
                    side: String::new(),
                    size: "0".to_string(),
                    position_value: "0".to_string(),
                    avg_price: "0".to_string(),
                    mark_price: state.price.to_string(),
                    unrealised_pnl: "0".to_string(),
                },
            };
            Ok(vec![record])
        })
    }

    fn get_open_orders<'a>(
        &'a self,
        _category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<Vec<OpenOrder>>> {
        Box::pin(async move {
            self.prelude().await?;
            Ok(self
                .state
                .lock()
                .open_orders
                .values()
                .filter(|o| o.symbol == *symbol)
                .cloned()
                .collect())
        })
    }

    fn place_order(&self, request: PlaceOrderRequest) -> BoxFuture<'_, VenueResult<OrderAck>> {
        Box::pin(async move {
            self.prelude().await?;
            self.place(&request)
        })
    }

    fn cancel_order<'a>(
        &'a self,
        _category: Category,
        _symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            self.prelude().await?;
            let mut state = self.state.lock();
            match state.open_orders.remove(order_id) {
                Some(_) => {
                    state.cancelled += 1;
                    Ok(())
                }
                None => Err(VenueError::OrderNotFound(order_id.clone())),
            }
        })
    }

    fn get_latest_price<'a>(&'a self, _symbol: &'a Symbol) -> BoxFuture<'a, VenueResult<Price>> {
        Box::pin(async move {
            self.prelude().await?;
            Ok(self.state.lock().price)
        })
    }

    fn get_trading_constraints<'a>(
        &'a self,
        _category: Category,
        _symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<TradingConstraints>> {
        Box::pin(async move {
            self.prelude().await?;
            Ok(self.state.lock().constraints)
        })
    }

    fn get_balance<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, VenueResult<Decimal>> {
        Box::pin(async move {
            self.prelude().await?;
            let state = self.state.lock();
            if coin.eq_ignore_ascii_case(self.symbol.base_asset()) {
                return Ok(state.position.map(|p| p.size.inner()).unwrap_or_default());
            }
            Ok(state.quote_balance)
        })
    }

    fn get_klines<'a>(
        &'a self,
        _symbol: &'a Symbol,
        limit: usize,
    ) -> BoxFuture<'a, VenueResult<Vec<Price>>> {
        Box::pin(async move {
            self.prelude().await?;
            let state = self.state.lock();
            let skip = state.history.len().saturating_sub(limit);
            Ok(state.history.iter().skip(skip).copied().collect())
        })
    }
}
