//! Stop-loss order reconciliation.

use std::sync::Arc;

use theta_core::{Leg, Notifier, OrderStatus, OrderType};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::executor::OrderExecutor;

/// Sends a notification, logging instead of failing when delivery fails.
pub async fn notify_best_effort(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.notify(subject, body).await {
        warn!(subject, error = %e, "Notification failed");
    }
}

fn status_label(status: Option<&OrderStatus>) -> &str {
    status.map_or("UNKNOWN", OrderStatus::as_str)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchOutcome {
    pub leg: Leg,
    /// Whether the leg differs from the one passed in.
    pub changed: bool,
}

impl WatchOutcome {
    fn unchanged(leg: Leg) -> Self {
        Self {
            leg,
            changed: false,
        }
    }
}

/// Follows a stop-loss leg through trigger and fill.
///
/// A fired stop becomes a working order at the exchange; the watcher turns it
/// into a LIMIT leg and keeps re-pricing it until it fills. Any other status
/// change (fill, cancel, reject) is reported once and adopted.
pub struct Watcher {
    executor: Arc<OrderExecutor>,
    notifier: Arc<dyn Notifier>,
    subject: String,
}

impl Watcher {
    pub fn new(
        executor: Arc<OrderExecutor>,
        notifier: Arc<dyn Notifier>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            notifier,
            subject: subject.into(),
        }
    }

    /// # Errors
    ///
    /// Broker failures after retries, or a failed re-placement.
    pub async fn watch(&self, leg: Leg) -> Result<WatchOutcome> {
        if !leg.is_placed() {
            return Ok(WatchOutcome::unchanged(leg));
        }

        let live = match self.executor.live_order(&leg.order_id).await {
            Ok(order) => order,
            Err(e) if matches!(e.root(), EngineError::OrderNotFound { .. }) => {
                warn!(symbol = %leg.trading_symbol, order_id = %leg.order_id, "Stop order missing from order book");
                return Ok(WatchOutcome::unchanged(leg));
            }
            Err(e) => return Err(e),
        };

        let before = status_label(leg.status.as_ref()).to_string();

        let live_status = live.status.clone();
        match (leg.order_type, &live_status) {
            (OrderType::StopLoss | OrderType::Limit, OrderStatus::Open) => {
                let mut leg = leg;
                if leg.order_type == OrderType::StopLoss {
                    info!(symbol = %leg.trading_symbol, "Stop triggered, converting to LIMIT");
                    leg.order_type = OrderType::Limit;
                }
                let leg = self.executor.place_order(leg).await?;
                let after = status_label(leg.status.as_ref()).to_string();
                self.report(&leg.trading_symbol, &before, &after).await;
                Ok(WatchOutcome { leg, changed: true })
            }
            _ if leg.status.as_ref() == Some(&live.status) => Ok(WatchOutcome::unchanged(leg)),
            _ => {
                self.report(&leg.trading_symbol, &before, live.status.as_str())
                    .await;
                let mut leg = leg;
                if live.status == OrderStatus::Complete {
                    leg.average_price = live.average_price;
                }
                leg.status = Some(live.status);
                Ok(WatchOutcome { leg, changed: true })
            }
        }
    }

    async fn report(&self, symbol: &str, from: &str, to: &str) {
        let body = format!("Order {symbol} changed from {from} to {to}");
        info!(symbol, from, to, "Stop order status changed");
        notify_best_effort(self.notifier.as_ref(), &self.subject, &body).await;
    }
}
