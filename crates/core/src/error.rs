//! Error types for the capability traits.
//!
//! Broker, store and notifier implementations map their failures into these
//! enums so the engine can decide what to retry without knowing the backend.

use thiserror::Error;

/// Message fragment the broker uses when an order submission times out
/// upstream. The order may or may not have been accepted.
pub const ORDER_TIMEOUT_MESSAGE: &str = "Order request timed out";

/// Errors returned by a [`Broker`](crate::traits::Broker).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Order submission timed out upstream; the order may exist anyway.
    #[error("order request timed out: {0}")]
    OrderTimeout(String),

    /// Session rejected or expired.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Order not found.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// The order ID that was not found.
        order_id: String,
    },

    /// Instrument not found.
    #[error("instrument not found: {exchange}:{symbol}")]
    InstrumentNotFound {
        /// Exchange code.
        exchange: String,
        /// Trading symbol.
        symbol: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl BrokerError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Creates an order not found error.
    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::OrderNotFound {
            order_id: order_id.into(),
        }
    }

    /// Creates an instrument not found error.
    pub fn instrument_not_found(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self::InstrumentNotFound {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }

    /// Returns true if the request may succeed when repeated.
    ///
    /// `OrderTimeout` is not included: it has to be resolved by looking the
    /// order up, not by resubmitting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Returns true for the ambiguous "submitted but unconfirmed" outcome.
    #[must_use]
    pub fn is_order_timeout(&self) -> bool {
        matches!(self, Self::OrderTimeout(_))
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors returned by a [`StateStore`](crate::traits::StateStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the given key.
    #[error("record not found: {namespace}/{id}")]
    NotFound {
        /// Namespace of the missing record.
        namespace: String,
        /// Record id.
        id: String,
    },

    /// Backend failure (connection, query, migration).
    #[error("database error: {0}")]
    Database(String),

    /// Document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors returned by a [`Notifier`](crate::traits::Notifier).
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery to the channel failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Notifier is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),
}
