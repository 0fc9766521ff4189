//! Strike rounding, de-noised price reads and marketable limit prices.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use theta_core::{Broker, Clock, ExecutionConfig, Side};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::retry::{retry, RetryPolicy};

/// Rounds `price` to the nearest multiple of `step`, ties away from zero.
#[must_use]
pub fn nearest_multiple(price: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return price;
    }
    (price / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

/// Limit price that crosses the spread by `offset`.
///
/// Sells keep the LTP when the offset would take the price below zero.
#[must_use]
pub fn marketable_limit_price(ltp: Decimal, side: Side, offset: Decimal) -> Decimal {
    match side {
        Side::Buy => ltp + offset,
        Side::Sell => {
            let price = ltp - offset;
            if price < Decimal::ZERO {
                ltp
            } else {
                price
            }
        }
    }
}

/// Percentage move from `from` to `to`, relative to `from`.
fn change_pct(from: Decimal, to: Decimal) -> Decimal {
    if from.is_zero() {
        return Decimal::ZERO;
    }
    ((to - from) / from * Decimal::ONE_HUNDRED).abs()
}

/// Last-price reads against the broker.
#[derive(Clone)]
pub struct PriceReader {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    samples: u32,
    interval: Duration,
}

impl PriceReader {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, execution: &ExecutionConfig) -> Self {
        Self {
            broker,
            clock,
            policy: RetryPolicy::from(execution),
            samples: execution.price_samples,
            interval: execution.sample_interval(),
        }
    }

    /// Last traded price, retried.
    ///
    /// # Errors
    ///
    /// Broker failure after retries.
    pub async fn last_price(&self, instrument: &str) -> Result<Decimal> {
        let broker = self.broker.as_ref();
        let label = format!("last price {instrument}");
        retry(&self.policy, self.clock.as_ref(), &label, move || async move {
            broker.last_price(instrument).await.map_err(EngineError::from)
        })
        .await
    }

    /// At-the-money strike for the underlying quoted as `spot_symbol`.
    ///
    /// # Errors
    ///
    /// Broker failure after retries.
    pub async fn atm_strike(&self, spot_symbol: &str, step: Decimal) -> Result<Decimal> {
        let spot = self.last_price(spot_symbol).await?;
        let strike = nearest_multiple(spot, step);
        debug!(spot_symbol, %spot, %strike, "ATM strike");
        Ok(strike)
    }

    /// Reads the price, then samples it again at a fixed interval. Fails if
    /// any two consecutive samples differ by more than `threshold_pct`
    /// percent of the earlier one; otherwise returns the final sample.
    ///
    /// Not retried here: callers retry the surrounding step.
    ///
    /// # Errors
    ///
    /// `FreakPrice` on a jump; broker failures.
    pub async fn denoised_last_price(&self, instrument: &str, threshold_pct: Decimal) -> Result<Decimal> {
        let mut previous = self.broker.last_price(instrument).await?;
        for _ in 0..self.samples {
            self.clock.sleep(self.interval).await;
            let current = self.broker.last_price(instrument).await?;
            let change = change_pct(previous, current);
            if change > threshold_pct {
                warn!(
                    symbol = instrument,
                    from = %previous,
                    to = %current,
                    change_pct = %change.round_dp(2),
                    "Freak price rejected"
                );
                return Err(EngineError::FreakPrice {
                    symbol: instrument.to_string(),
                    from: previous,
                    to: current,
                    change_pct: change.round_dp(2),
                });
            }
            previous = current;
        }
        Ok(previous)
    }
}
