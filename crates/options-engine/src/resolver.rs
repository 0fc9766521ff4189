//! Resolves a logical strike/expiry selection to a tradable contract.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use theta_core::{Broker, Clock, ExpirySchedule, Instrument, OptionType, StrategyConfig};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::retry::{retry, RetryPolicy};

/// Which expiry of the option chain to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryClass {
    /// Nearest listed expiry.
    Weekly,
    /// Final expiry of the month `n` months ahead (`Monthly(0)` is the current month).
    Monthly(u32),
}

impl ExpiryClass {
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config.expiry {
            ExpirySchedule::Weekly => Self::Weekly,
            ExpirySchedule::Monthly => Self::Monthly(config.month_offset),
        }
    }
}

impl std::fmt::Display for ExpiryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weekly => f.write_str("weekly"),
            Self::Monthly(offset) => write!(f, "monthly+{offset}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSelection {
    /// Trading symbol prefix, e.g. `NIFTY`.
    pub underlying: String,
    pub exchange: String,
    pub expiry: ExpiryClass,
    pub strike: Decimal,
    pub option_type: OptionType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstrument {
    pub trading_symbol: String,
    pub lot_size: u32,
    pub expiry: NaiveDate,
    pub tick_size: Decimal,
}

/// Picks the contract for `class` from candidates sorted by ascending expiry.
///
/// Monthly selection walks the list grouping consecutive entries by calendar
/// month and takes the last entry of the `offset`-th group.
#[must_use]
pub fn select_expiry<'a>(sorted: &[&'a Instrument], class: ExpiryClass) -> Option<&'a Instrument> {
    match class {
        ExpiryClass::Weekly => sorted.first().copied(),
        ExpiryClass::Monthly(offset) => {
            let mut month_ends: Vec<&'a Instrument> = Vec::new();
            let mut current = None;
            for &instrument in sorted {
                let month = instrument.expiry.map(|d| (d.year(), d.month()));
                if month == current {
                    if let Some(last) = month_ends.last_mut() {
                        *last = instrument;
                    }
                } else {
                    month_ends.push(instrument);
                    current = month;
                }
            }
            month_ends.get(usize::try_from(offset).ok()?).copied()
        }
    }
}

#[derive(Clone)]
pub struct InstrumentResolver {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl InstrumentResolver {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            broker,
            clock,
            policy,
        }
    }

    /// # Errors
    ///
    /// `NoInstrument` when nothing matches; broker failures after retries.
    pub async fn resolve(&self, selection: &OptionSelection) -> Result<ResolvedInstrument> {
        let broker = self.broker.as_ref();
        let exchange = selection.exchange.as_str();
        let label = format!("instruments {exchange}");

        let instruments = retry(&self.policy, self.clock.as_ref(), &label, move || async move {
            broker.instruments(exchange).await.map_err(EngineError::from)
        })
        .await?;

        let segment = format!("{exchange}-OPT");
        let mut candidates: Vec<&Instrument> = instruments
            .iter()
            .filter(|i| {
                i.trading_symbol.starts_with(&selection.underlying)
                    && i.segment == segment
                    && i.exchange == exchange
                    && i.strike == selection.strike
                    && i.option_type() == Some(selection.option_type)
                    && i.expiry.is_some()
            })
            .collect();
        candidates.sort_by_key(|i| i.expiry);

        let instrument = select_expiry(&candidates, selection.expiry).ok_or_else(|| {
            EngineError::NoInstrument {
                underlying: selection.underlying.clone(),
                strike: selection.strike,
                option_type: selection.option_type,
                expiry: selection.expiry.to_string(),
            }
        })?;

        debug!(
            symbol = %instrument.trading_symbol,
            expiry = ?instrument.expiry,
            candidates = candidates.len(),
            "Resolved instrument"
        );

        Ok(ResolvedInstrument {
            trading_symbol: instrument.trading_symbol.clone(),
            lot_size: instrument.lot_size,
            expiry: instrument.expiry.unwrap_or_default(),
            tick_size: instrument.tick_size,
        })
    }
}
