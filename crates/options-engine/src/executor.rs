//! Places and cancels leg orders with bounded retry.
//!
//! Each step re-reads the broker's order book rather than trusting its own
//! view, so a step interrupted at any point converges on the next attempt:
//! - an order whose submission timed out is looked up before resubmitting
//! - an already-accepted order is verified, re-priced or read back
//! - a filled order is recorded and never touched again

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use theta_core::{Broker, Clock, ExecutionConfig, Leg, Order, OrderRequest, OrderStatus, OrderType};
use tracing::{info, warn};

use crate::error::{EngineError, PlaceError, Result};
use crate::pricing::{marketable_limit_price, PriceReader};
use crate::retry::{retry, RetryPolicy};

/// How far a persisted leg got towards its expected broker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    /// Filled, or armed for a stop. Nothing left to do.
    Settled,
    /// Not sent yet, or accepted but unconfirmed. Drive it through
    /// [`OrderExecutor::place_order`], which re-verifies a known order id.
    Pending,
    /// Rejected or cancelled. Needs a fresh order.
    Failed,
}

/// Classifies a non-empty leg loaded from the position set.
#[must_use]
pub fn placement_state(leg: &Leg) -> PlacementState {
    if !leg.is_placed() {
        return PlacementState::Pending;
    }
    match &leg.status {
        Some(OrderStatus::Complete) => PlacementState::Settled,
        Some(OrderStatus::Rejected | OrderStatus::Cancelled) => PlacementState::Failed,
        // A stop that has fired is followed by the watcher.
        Some(OrderStatus::TriggerPending | OrderStatus::Open) if leg.order_type.is_stop() => {
            PlacementState::Settled
        }
        _ => PlacementState::Pending,
    }
}

pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    pricing: PriceReader,
    policy: RetryPolicy,
    execution: ExecutionConfig,
    freak_threshold_pct: Decimal,
}

impl OrderExecutor {
    pub fn new(
        broker: Arc<dyn Broker>,
        clock: Arc<dyn Clock>,
        execution: ExecutionConfig,
        freak_threshold_pct: Decimal,
    ) -> Self {
        Self {
            pricing: PriceReader::new(broker.clone(), clock.clone(), &execution),
            policy: RetryPolicy::from(&execution),
            broker,
            clock,
            execution,
            freak_threshold_pct,
        }
    }

    /// Places `leg` and returns it with its order id, status and fill price.
    ///
    /// Progress (a recovered or assigned order id) is carried across retry
    /// attempts, so an order is submitted at most once per successful accept.
    /// A leg that already has an order id is re-verified, never resubmitted.
    ///
    /// # Errors
    ///
    /// [`PlaceError`] carrying the leg as far as it got: `UnexpectedStatus`
    /// for a rejected order, `RetriesExhausted` when the order does not reach
    /// the expected status in time.
    pub async fn place_order(&self, leg: Leg) -> std::result::Result<Leg, PlaceError> {
        let label = format!("place {}", leg.describe());
        let progress = Mutex::new(leg);
        let progress_ref = &progress;

        let result = retry(&self.policy, self.clock.as_ref(), &label, move || async move {
            let mut leg = progress_ref.lock().clone();
            let result = self.place_attempt(&mut leg).await;
            *progress_ref.lock() = leg;
            result
        })
        .await;

        let leg = progress.into_inner();
        if let Err(source) = result {
            if leg.is_placed() {
                warn!(
                    symbol = %leg.trading_symbol,
                    order_id = %leg.order_id,
                    error = %source,
                    "Placement failed after the order was accepted"
                );
            }
            return Err(PlaceError { leg, source });
        }
        info!(
            symbol = %leg.trading_symbol,
            order_id = %leg.order_id,
            status = ?leg.status.as_ref().map(OrderStatus::as_str),
            average_price = %leg.average_price,
            "Order placed"
        );
        Ok(leg)
    }

    async fn place_attempt(&self, leg: &mut Leg) -> Result<()> {
        if leg.order_type == OrderType::Limit {
            let ltp = self
                .pricing
                .denoised_last_price(&leg.quote_key(), self.freak_threshold_pct)
                .await?;
            leg.price = marketable_limit_price(ltp, leg.side, self.execution.limit_offset);
        }

        if leg.is_placed() {
            let live = self.find_order(&leg.order_id).await?;
            match live.status {
                OrderStatus::Complete => {
                    leg.status = Some(OrderStatus::Complete);
                    leg.average_price = live.average_price;
                    return Ok(());
                }
                OrderStatus::Rejected => {
                    leg.status = Some(OrderStatus::Rejected);
                    return Err(EngineError::unexpected_status(
                        &leg.trading_symbol,
                        &leg.order_id,
                        OrderStatus::Rejected,
                    ));
                }
                ref status if leg.order_type == OrderType::Limit && !status.is_terminal() => {
                    self.broker
                        .modify_order(&leg.order_id, &OrderRequest::from(&*leg))
                        .await?;
                    info!(order_id = %leg.order_id, price = %leg.price, "Re-priced open order");
                    self.clock.sleep(self.execution.fill_wait()).await;
                }
                _ => {}
            }
        } else {
            leg.order_id = self.submit(leg).await?;
            let wait = if leg.order_type == OrderType::Limit {
                self.execution.fill_wait()
            } else {
                self.execution.ack_wait()
            };
            self.clock.sleep(wait).await;
        }

        let live = self.find_order(&leg.order_id).await?;
        leg.status = Some(live.status.clone());

        let expected = if leg.order_type.is_stop() {
            OrderStatus::TriggerPending
        } else {
            OrderStatus::Complete
        };
        if live.status != expected {
            return Err(EngineError::unexpected_status(
                &leg.trading_symbol,
                &leg.order_id,
                live.status,
            ));
        }
        if live.status == OrderStatus::Complete {
            leg.average_price = live.average_price;
        }
        Ok(())
    }

    /// Submits a new order, resolving an ambiguous timeout against the order
    /// book.
    async fn submit(&self, leg: &Leg) -> Result<String> {
        let request = OrderRequest::from(leg);
        match self.broker.submit_order(&request).await {
            Ok(order_id) => Ok(order_id),
            Err(e) if e.is_order_timeout() => {
                warn!(
                    symbol = %leg.trading_symbol,
                    settle_secs = self.execution.settle_delay_secs,
                    "Order submission timed out, checking order book"
                );
                self.clock.sleep(self.execution.settle_delay()).await;

                let orders = self.broker.orders().await?;
                match orders.iter().rev().find(|order| order.matches(&request)) {
                    Some(order) => {
                        info!(
                            symbol = %leg.trading_symbol,
                            order_id = %order.order_id,
                            "Recovered order id after timeout"
                        );
                        Ok(order.order_id.clone())
                    }
                    None => Err(EngineError::OrderNotAccepted {
                        symbol: leg.trading_symbol.clone(),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancels a pending stop order and returns the leg with its final status.
    ///
    /// Filled or already-cancelled orders are reflected into the leg without
    /// a broker call. A leg that was never placed is returned unchanged.
    ///
    /// # Errors
    ///
    /// `UnexpectedStatus` when the order is in any other state after retries;
    /// `OrderNotFound` for an unknown order id.
    pub async fn cancel_order(&self, leg: Leg) -> Result<Leg> {
        if !leg.is_placed() {
            return Ok(leg);
        }

        let label = format!("cancel {}", leg.describe());
        let leg_ref = &leg;
        let status = retry(&self.policy, self.clock.as_ref(), &label, move || async move {
            self.cancel_attempt(leg_ref).await
        })
        .await?;

        info!(symbol = %leg.trading_symbol, order_id = %leg.order_id, %status, "Stop order settled");
        Ok(Leg {
            status: Some(status),
            ..leg
        })
    }

    async fn cancel_attempt(&self, leg: &Leg) -> Result<OrderStatus> {
        let live = self.find_order(&leg.order_id).await?;
        match live.status {
            OrderStatus::Complete | OrderStatus::Cancelled => Ok(live.status),
            OrderStatus::TriggerPending => {
                self.broker.cancel_order(&leg.order_id).await?;
                Ok(OrderStatus::Cancelled)
            }
            status => Err(EngineError::unexpected_status(
                &leg.trading_symbol,
                &leg.order_id,
                status,
            )),
        }
    }

    /// Cancels each leg in turn, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// The first cancel failure.
    pub async fn cancel_orders(&self, legs: Vec<Leg>) -> Result<Vec<Leg>> {
        let mut settled = Vec::with_capacity(legs.len());
        for leg in legs {
            settled.push(self.cancel_order(leg).await?);
        }
        Ok(settled)
    }

    /// Looks up an order in the broker's order book, retried.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` wrapping `OrderNotFound` when the id never appears.
    pub async fn live_order(&self, order_id: &str) -> Result<Order> {
        let label = format!("live order {order_id}");
        retry(&self.policy, self.clock.as_ref(), &label, move || async move {
            self.find_order(order_id).await
        })
        .await
    }

    async fn find_order(&self, order_id: &str) -> Result<Order> {
        self.broker
            .orders()
            .await?
            .into_iter()
            .find(|order| order.order_id == order_id)
            .ok_or_else(|| EngineError::order_not_found(order_id))
    }
}
