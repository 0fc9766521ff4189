//! Short strangle lifecycle: entry, protection, holding and unwind.
//!
//! The persisted [`PositionSet`] is the only recovery mechanism. Every leg
//! is written back as soon as the broker accepts it, and a slot that already
//! holds an order is followed up instead of being sent again, so `start()`
//! and `stop()` can be re-run after a crash and pick up where the previous
//! run stopped.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use theta_core::{Broker, Clock, Leg, Notifier, OptionType, OrderStatus, Side, StrategyConfig};
use tracing::{info, warn};

use crate::error::{EngineError, PlaceError, Result};
use crate::executor::{placement_state, OrderExecutor, PlacementState};
use crate::legs::LegCalculator;
use crate::positions::{LegSlot, PositionSet, PositionStore};
use crate::pricing::PriceReader;
use crate::registry::StrategyContext;
use crate::resolver::InstrumentResolver;
use crate::retry::{retry, RetryPolicy};
use crate::schedule::WindowGate;
use crate::watcher::{notify_best_effort, Watcher};

/// A runnable strategy.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> Phase;

    /// Enters the position and holds it until the exit window.
    async fn start(&mut self) -> Result<StartOutcome>;

    /// Unwinds whatever the persisted set holds and resets it.
    async fn stop(&mut self) -> Result<()>;

    /// The persisted position set.
    async fn snapshot(&mut self) -> Result<PositionSet>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingEntry,
    PlacingPrimaryLegs,
    PlacingStopLegs,
    Holding,
    Unwinding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The venue does not trade today; nothing was done.
    MarketClosed,
    /// The persisted set is part way through an unwind; call `stop()`.
    UnwindPending,
    /// Held until the exit window opened; call `stop()`.
    Completed,
}

const SELL_SLOTS: [(LegSlot, LegSlot); 2] = [
    (LegSlot::SellCall, LegSlot::SellCallStop),
    (LegSlot::SellPut, LegSlot::SellPutStop),
];

const STOP_SLOTS: [LegSlot; 2] = [LegSlot::SellCallStop, LegSlot::SellPutStop];

const WING_SLOTS: [LegSlot; 2] = [LegSlot::BuyCallWing, LegSlot::BuyPutWing];

/// Sells an ATM call and put, optionally buys protective wings, and guards
/// each short with a stop-loss order.
pub struct ShortStrangle {
    name: String,
    config: StrategyConfig,
    phase: Phase,
    set: Option<PositionSet>,
    positions: PositionStore,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    gate: WindowGate,
    pricing: PriceReader,
    calculator: LegCalculator,
    executor: Arc<OrderExecutor>,
    watcher: Watcher,
}

fn validate(config: &StrategyConfig) -> Result<()> {
    if config.strike_step <= Decimal::ZERO {
        return Err(EngineError::Config("strike_step must be positive".to_string()));
    }
    if config.entry.start >= config.entry.end || config.exit.start >= config.exit.end {
        return Err(EngineError::Config(
            "entry and exit windows must end after they start".to_string(),
        ));
    }
    if config.underlying.is_empty() || config.exchange.is_empty() || config.spot_symbol.is_empty() {
        return Err(EngineError::Config(
            "underlying, exchange and spot_symbol are required".to_string(),
        ));
    }
    Ok(())
}

impl ShortStrangle {
    /// # Errors
    ///
    /// `Config` for inconsistent strategy settings.
    pub fn new(ctx: StrategyContext) -> Result<Self> {
        validate(&ctx.strategy)?;

        let policy = RetryPolicy::from(&ctx.execution);
        let resolver = InstrumentResolver::new(ctx.broker.clone(), ctx.clock.clone(), policy);
        let executor = Arc::new(OrderExecutor::new(
            ctx.broker.clone(),
            ctx.clock.clone(),
            ctx.execution.clone(),
            ctx.strategy.freak_threshold_pct,
        ));
        let subject = format!("{} trade update", ctx.name);

        Ok(Self {
            positions: PositionStore::new(ctx.store.clone(), ctx.name.clone()),
            gate: WindowGate::new(ctx.clock.clone(), ctx.timezone, ctx.scheduler.poll_interval()),
            pricing: PriceReader::new(ctx.broker.clone(), ctx.clock.clone(), &ctx.execution),
            calculator: LegCalculator::new(resolver, ctx.strategy.clone(), ctx.timezone),
            watcher: Watcher::new(executor.clone(), ctx.notifier.clone(), subject),
            executor,
            policy,
            phase: Phase::Idle,
            set: None,
            name: ctx.name,
            config: ctx.strategy,
            broker: ctx.broker,
            clock: ctx.clock,
            notifier: ctx.notifier,
        })
    }

    fn required_slots(&self) -> Vec<LegSlot> {
        let mut slots = Vec::with_capacity(6);
        if self.config.wing_distance.is_some() {
            slots.extend(WING_SLOTS);
        }
        slots.extend([LegSlot::SellCall, LegSlot::SellPut]);
        slots.extend(STOP_SLOTS);
        slots
    }

    async fn load(&mut self) -> Result<PositionSet> {
        let set = self.positions.load().await?;
        self.set = Some(set.clone());
        Ok(set)
    }

    async fn commit(&mut self, set: &PositionSet) -> Result<()> {
        self.positions.save(set).await?;
        self.set = Some(set.clone());
        Ok(())
    }

    async fn market_open(&self) -> Result<bool> {
        let broker = self.broker.as_ref();
        retry(&self.policy, self.clock.as_ref(), "market open", move || async move {
            broker.is_market_open().await.map_err(EngineError::from)
        })
        .await
    }

    /// Places and persists the leg for `slot`. An empty slot gets a freshly
    /// calculated leg at `strike`; an occupied one is resumed.
    async fn place_slot(
        &mut self,
        set: &mut PositionSet,
        slot: LegSlot,
        option_type: OptionType,
        strike: Option<Decimal>,
        side: Side,
    ) -> Result<()> {
        let existing = set.get(slot).clone();
        let leg = if existing.is_empty() {
            let strike = strike.ok_or_else(|| {
                EngineError::Config(format!("no strike available for {slot}"))
            })?;
            self.calculator.calculate_leg(option_type, strike, side).await?
        } else {
            match self.resumed_leg(slot, existing) {
                Some(leg) => leg,
                None => return Ok(()),
            }
        };
        self.place_and_commit(set, slot, leg).await
    }

    /// The leg to send again for an occupied slot, or `None` when the slot
    /// needs no further work.
    fn resumed_leg(&self, slot: LegSlot, existing: Leg) -> Option<Leg> {
        match placement_state(&existing) {
            PlacementState::Settled => {
                info!(slot = %slot, symbol = %existing.trading_symbol, "Leg already placed");
                None
            }
            PlacementState::Pending => {
                info!(
                    slot = %slot,
                    order_id = %existing.order_id,
                    "Confirming previously accepted order"
                );
                Some(existing)
            }
            PlacementState::Failed => {
                warn!(
                    slot = %slot,
                    order_id = %existing.order_id,
                    status = ?existing.status.as_ref().map(OrderStatus::as_str),
                    "Replacing order that did not go through"
                );
                Some(existing.unplaced())
            }
        }
    }

    /// Sends `leg` and records the outcome. An order the broker accepted is
    /// persisted even when confirming it failed, so the next run follows it
    /// up instead of sending a duplicate.
    async fn place_and_commit(
        &mut self,
        set: &mut PositionSet,
        slot: LegSlot,
        leg: Leg,
    ) -> Result<()> {
        match self.executor.place_order(leg).await {
            Ok(leg) => {
                set.set(slot, leg);
                self.commit(set).await
            }
            Err(PlaceError { leg, source }) => {
                if leg.is_placed() {
                    set.set(slot, leg);
                    self.commit(set).await?;
                }
                Err(source)
            }
        }
    }

    async fn place_primary_legs(&mut self, set: &mut PositionSet) -> Result<()> {
        self.phase = Phase::PlacingPrimaryLegs;

        let primary: Vec<LegSlot> = self
            .required_slots()
            .into_iter()
            .filter(|slot| !STOP_SLOTS.contains(slot))
            .collect();
        let settled = primary
            .iter()
            .all(|slot| placement_state(set.get(*slot)) == PlacementState::Settled);
        if settled {
            return Ok(());
        }

        let atm = if primary.iter().any(|slot| set.get(*slot).is_empty()) {
            let atm = self
                .pricing
                .atm_strike(&self.config.spot_symbol, self.config.strike_step)
                .await?;
            info!(strategy = %self.name, %atm, "Entering position");
            Some(atm)
        } else {
            None
        };

        if let Some(distance) = self.config.wing_distance {
            self.place_slot(
                set,
                LegSlot::BuyCallWing,
                OptionType::Call,
                atm.map(|atm| atm + distance),
                Side::Buy,
            )
            .await?;
            self.place_slot(
                set,
                LegSlot::BuyPutWing,
                OptionType::Put,
                atm.map(|atm| atm - distance),
                Side::Buy,
            )
            .await?;
        }
        self.place_slot(set, LegSlot::SellCall, OptionType::Call, atm, Side::Sell)
            .await?;
        self.place_slot(set, LegSlot::SellPut, OptionType::Put, atm, Side::Sell)
            .await
    }

    async fn place_stop_legs(&mut self, set: &mut PositionSet) -> Result<()> {
        self.phase = Phase::PlacingStopLegs;

        for (sell_slot, stop_slot) in SELL_SLOTS {
            let existing = set.get(stop_slot).clone();
            let stop = if existing.is_empty() {
                self.calculator
                    .stop_loss_leg(set.get(sell_slot), self.clock.now())
            } else {
                match self.resumed_leg(stop_slot, existing) {
                    Some(stop) => stop,
                    None => continue,
                }
            };
            self.place_and_commit(set, stop_slot, stop).await?;
        }
        Ok(())
    }

    async fn hold(&mut self, set: &mut PositionSet) -> Result<()> {
        self.phase = Phase::Holding;

        loop {
            if self.gate.has_started(&self.config.exit) {
                info!(strategy = %self.name, "Exit window reached");
                return Ok(());
            }

            for slot in STOP_SLOTS {
                let outcome = self.watcher.watch(set.get(slot).clone()).await?;
                if outcome.changed {
                    set.set(slot, outcome.leg);
                    self.commit(set).await?;
                }
            }

            self.gate.tick().await;
        }
    }

    /// Places the exit order for `slot` and marks the leg closed. An exit
    /// order accepted by a previous run is followed up rather than sent again.
    async fn flatten(&mut self, set: &mut PositionSet, slot: LegSlot) -> Result<()> {
        let leg = set.get(slot).clone();
        if leg.is_empty() || leg.closed {
            return Ok(());
        }

        let mut exit = leg.exit_leg();
        exit.order_id = leg.exit_order_id.clone();

        match self.executor.place_order(exit).await {
            Ok(exit) => {
                info!(
                    slot = %slot,
                    symbol = %exit.trading_symbol,
                    average_price = %exit.average_price,
                    "Position flattened"
                );
                set.set(
                    slot,
                    Leg {
                        closed: true,
                        exit_order_id: exit.order_id,
                        ..leg
                    },
                );
                self.commit(set).await
            }
            Err(PlaceError { leg: exit, source }) => {
                let exit_order_id = match placement_state(&exit) {
                    PlacementState::Failed => String::new(),
                    _ => exit.order_id,
                };
                if exit_order_id != leg.exit_order_id {
                    set.set(
                        slot,
                        Leg {
                            exit_order_id,
                            ..leg
                        },
                    );
                    self.commit(set).await?;
                }
                Err(source)
            }
        }
    }

    async fn announce(&self, body: &str) {
        let subject = format!("{} trade update", self.name);
        notify_best_effort(self.notifier.as_ref(), &subject, body).await;
    }
}

fn summary(set: &PositionSet) -> String {
    set.legs()
        .map(|(slot, leg)| {
            format!(
                "{slot}: {} {} x{} avg {}",
                leg.side, leg.trading_symbol, leg.quantity, leg.average_price
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Strategy for ShortStrangle {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    async fn start(&mut self) -> Result<StartOutcome> {
        self.phase = Phase::AwaitingEntry;

        if !self.market_open().await? {
            info!(strategy = %self.name, "Market closed today");
            self.phase = Phase::Idle;
            return Ok(StartOutcome::MarketClosed);
        }

        let mut set = self.load().await?;
        if set.is_unwinding() {
            warn!(strategy = %self.name, "Previous unwind did not finish");
            return Ok(StartOutcome::UnwindPending);
        }

        let fully_placed = self
            .required_slots()
            .into_iter()
            .all(|slot| !set.get(slot).is_empty());
        if set.is_empty() {
            self.gate.wait_for(&self.config.entry).await;
        } else {
            info!(
                strategy = %self.name,
                fully_placed,
                "Resuming from persisted position set"
            );
        }

        self.place_primary_legs(&mut set).await?;
        self.place_stop_legs(&mut set).await?;
        if !fully_placed {
            self.announce(&format!("Entered position\n{}", summary(&set)))
                .await;
        }

        self.hold(&mut set).await?;
        Ok(StartOutcome::Completed)
    }

    async fn stop(&mut self) -> Result<()> {
        self.phase = Phase::Unwinding;

        let mut set = match self.set.take() {
            Some(set) => set,
            None => self.load().await?,
        };
        if set.is_empty() {
            info!(strategy = %self.name, "Nothing to unwind");
            self.phase = Phase::Idle;
            return Ok(());
        }

        let stops: Vec<Leg> = STOP_SLOTS.iter().map(|slot| set.get(*slot).clone()).collect();
        let settled = self.executor.cancel_orders(stops).await?;
        for (slot, leg) in STOP_SLOTS.into_iter().zip(settled) {
            set.set(slot, leg);
        }
        self.commit(&set).await?;

        for (sell_slot, stop_slot) in SELL_SLOTS {
            if set.get(stop_slot).status == Some(OrderStatus::Complete) && !set.get(sell_slot).closed {
                info!(slot = %sell_slot, "Already bought back by its stop");
                set.get_mut(sell_slot).closed = true;
                self.commit(&set).await?;
                continue;
            }
            self.flatten(&mut set, sell_slot).await?;
        }
        for slot in WING_SLOTS {
            self.flatten(&mut set, slot).await?;
        }

        let closed = summary(&set);
        self.commit(&PositionSet::default()).await?;
        self.phase = Phase::Idle;

        info!(strategy = %self.name, "Position unwound");
        self.announce(&format!("Exited position\n{closed}")).await;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<PositionSet> {
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theta_core::TimeWindow;

    #[test]
    fn rejects_inverted_window() {
        let mut config = StrategyConfig::default();
        config.entry = TimeWindow::new(config.entry.end, config.entry.start);
        assert!(matches!(validate(&config), Err(EngineError::Config(_))));
    }

    #[test]
    fn rejects_zero_strike_step() {
        let config = StrategyConfig {
            strike_step: Decimal::ZERO,
            ..StrategyConfig::default()
        };
        assert!(matches!(validate(&config), Err(EngineError::Config(_))));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&StrategyConfig::default()).is_ok());
    }
}
