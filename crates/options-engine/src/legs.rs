//! Builds order legs and derives protective stop-loss legs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use theta_core::{
    Leg, OptionType, OrderType, Side, StopLossConfig, StopLossMode, StrategyConfig,
};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::resolver::{ExpiryClass, InstrumentResolver, OptionSelection};

/// Floors `value` to a multiple of `step`.
#[must_use]
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

/// Stop-loss risk percentage for a leg expiring on `expiry`.
///
/// In time-decay mode the stop widens as expiry nears: the base percentage
/// more than a day out, `expiry_day_pct` within the last day, `expired_pct`
/// once the expiry cutoff has passed.
#[must_use]
pub fn risk_pct(
    config: &StopLossConfig,
    expiry: Option<chrono::NaiveDate>,
    now: DateTime<Utc>,
    timezone: Tz,
) -> Decimal {
    let (StopLossMode::TimeDecay, Some(expiry)) = (config.mode, expiry) else {
        return config.base_pct;
    };

    let cutoff = expiry.and_time(config.expiry_cutoff);
    let Some(expires_at) = timezone.from_local_datetime(&cutoff).earliest() else {
        return config.base_pct;
    };
    let expires_at = expires_at.with_timezone(&Utc);

    if now > expires_at {
        config.expired_pct
    } else if expires_at - now < Duration::hours(24) {
        config.expiry_day_pct
    } else {
        config.base_pct
    }
}

/// Stop-loss leg protecting a filled short `leg`.
///
/// Opposite side, SL order type, trigger at `average_price` marked up by the
/// risk percentage and floored to `trigger_step`, limit at the truncated
/// trigger plus `limit_offset`.
#[must_use]
pub fn stop_loss_leg(filled: &Leg, pct: Decimal, config: &StopLossConfig) -> Leg {
    let raw_trigger = filled.average_price * (Decimal::ONE + pct / Decimal::ONE_HUNDRED);
    let trigger = floor_to_step(raw_trigger, config.trigger_step);

    Leg {
        side: filled.side.flip(),
        order_type: OrderType::StopLoss,
        trigger_price: trigger,
        price: trigger.trunc() + config.limit_offset,
        order_id: String::new(),
        status: None,
        average_price: Decimal::ZERO,
        closed: false,
        ..filled.clone()
    }
}

/// Turns strategy settings and live data into fully-specified legs.
#[derive(Clone)]
pub struct LegCalculator {
    resolver: InstrumentResolver,
    strategy: StrategyConfig,
    timezone: Tz,
}

impl LegCalculator {
    pub fn new(resolver: InstrumentResolver, strategy: StrategyConfig, timezone: Tz) -> Self {
        Self {
            resolver,
            strategy,
            timezone,
        }
    }

    /// # Errors
    ///
    /// `Config` when the lot multiplier is missing or zero; resolution errors.
    pub async fn calculate_leg(
        &self,
        option_type: OptionType,
        strike: Decimal,
        side: Side,
    ) -> Result<Leg> {
        let lots = self
            .strategy
            .lots
            .filter(|lots| *lots > 0)
            .ok_or_else(|| EngineError::Config("lot multiplier is not set".to_string()))?;

        let selection = OptionSelection {
            underlying: self.strategy.underlying.clone(),
            exchange: self.strategy.exchange.clone(),
            expiry: ExpiryClass::from_config(&self.strategy),
            strike,
            option_type,
        };
        let resolved = self.resolver.resolve(&selection).await?;

        let leg = Leg {
            trading_symbol: resolved.trading_symbol,
            exchange: self.strategy.exchange.clone(),
            option_type: Some(option_type),
            strike,
            expiry: Some(resolved.expiry),
            lot_size: resolved.lot_size,
            lots,
            quantity: lots * resolved.lot_size,
            product: self.strategy.product,
            order_type: self.strategy.order_type,
            side,
            ..Leg::default()
        };

        info!(
            symbol = %leg.trading_symbol,
            side = %leg.side,
            quantity = leg.quantity,
            expiry = %resolved.expiry,
            "Calculated leg"
        );
        Ok(leg)
    }

    /// Stop-loss leg for `filled`, using the risk percentage at `now`.
    #[must_use]
    pub fn stop_loss_leg(&self, filled: &Leg, now: DateTime<Utc>) -> Leg {
        let config = &self.strategy.stop_loss;
        let pct = risk_pct(config, filled.expiry, now, self.timezone);
        let stop = stop_loss_leg(filled, pct, config);

        info!(
            symbol = %stop.trading_symbol,
            average_price = %filled.average_price,
            risk_pct = %pct,
            trigger = %stop.trigger_price,
            limit = %stop.price,
            "Calculated stop-loss leg"
        );
        stop
    }
}
