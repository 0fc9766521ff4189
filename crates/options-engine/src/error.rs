//! Engine error type.

use rust_decimal::Decimal;
use theta_core::{BrokerError, Leg, OptionType, OrderStatus, StoreError};
use thiserror::Error;

/// Errors raised while running a strategy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No tradable contract matches the selection.
    #[error("no instrument for {underlying} {strike} {option_type} ({expiry})")]
    NoInstrument {
        underlying: String,
        strike: Decimal,
        option_type: OptionType,
        expiry: String,
    },

    /// Consecutive price samples moved more than the allowed threshold.
    #[error("freak price on {symbol}: {from} -> {to} ({change_pct}%)")]
    FreakPrice {
        symbol: String,
        from: Decimal,
        to: Decimal,
        change_pct: Decimal,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// The broker reports a status other than the one the step requires.
    #[error("order {order_id} for {symbol} has unexpected status {status}")]
    UnexpectedStatus {
        symbol: String,
        order_id: String,
        status: OrderStatus,
    },

    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: String },

    /// A timed-out submission left no matching order in the order book.
    #[error("order for {symbol} was not accepted")]
    OrderNotAccepted { symbol: String },

    #[error("{label} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Box<EngineError>,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
}

impl EngineError {
    pub fn unexpected_status(
        symbol: impl Into<String>,
        order_id: impl Into<String>,
        status: OrderStatus,
    ) -> Self {
        Self::UnexpectedStatus {
            symbol: symbol.into(),
            order_id: order_id.into(),
            status,
        }
    }

    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::OrderNotFound {
            order_id: order_id.into(),
        }
    }

    /// Returns true if repeating the step may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Broker(e) => e.is_retryable(),
            Self::FreakPrice { .. } | Self::OrderNotAccepted { .. } | Self::OrderNotFound { .. } => {
                true
            }
            Self::UnexpectedStatus { status, .. } => {
                !matches!(status, OrderStatus::Rejected | OrderStatus::Cancelled)
            }
            _ => false,
        }
    }

    /// The underlying error, looking through retry exhaustion.
    #[must_use]
    pub fn root(&self) -> &EngineError {
        match self {
            Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A failed placement, with the leg as far as it got.
///
/// `leg.order_id` is set when the broker accepted the order before the
/// failure. Persist it so the next run re-verifies that order instead of
/// submitting another.
#[derive(Debug, Error)]
#[error("placing {}: {source}", .leg.trading_symbol)]
pub struct PlaceError {
    pub leg: Leg,
    pub source: EngineError,
}

impl From<PlaceError> for EngineError {
    fn from(err: PlaceError) -> Self {
        err.source
    }
}
