//! Multi-leg options strategy engine.
//!
//! Builds on the [`theta_core`] seams ([`Broker`](theta_core::Broker),
//! [`StateStore`](theta_core::StateStore), [`Notifier`](theta_core::Notifier),
//! [`Clock`](theta_core::Clock)):
//!
//! - [`resolver`] maps an underlying, strike and expiry class to a contract
//! - [`pricing`] reads de-noised prices and ATM strikes
//! - [`legs`] sizes entry legs and derives stop-loss legs
//! - [`executor`] places, re-prices and cancels orders with bounded retry
//! - [`watcher`] follows stop-loss orders through trigger and fill
//! - [`strategy`] runs the short strangle lifecycle over a persisted
//!   [`PositionSet`]

pub mod error;
pub mod executor;
pub mod legs;
pub mod positions;
pub mod pricing;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod schedule;
pub mod strategy;
pub mod watcher;

pub use error::{EngineError, PlaceError, Result};
pub use executor::{placement_state, OrderExecutor, PlacementState};
pub use legs::LegCalculator;
pub use positions::{LegSlot, PositionSet, PositionStore};
pub use pricing::PriceReader;
pub use registry::{StrategyContext, StrategyRegistry};
pub use resolver::{ExpiryClass, InstrumentResolver, OptionSelection, ResolvedInstrument};
pub use retry::{retry, RetryPolicy};
pub use schedule::WindowGate;
pub use strategy::{Phase, ShortStrangle, StartOutcome, Strategy};
pub use watcher::{notify_best_effort, WatchOutcome, Watcher};
