use crate::error::{BrokerError, NotifyError, StoreError};
use crate::types::{Instrument, Margins, NetPosition, Order, OrderRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Brokerage account operations used by the engine.
///
/// Instruments are addressed as `EXCHANGE:SYMBOL` for quotes, and by
/// `(symbol, exchange)` elsewhere.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Validates the session credentials.
    async fn authenticate(&self) -> Result<(), BrokerError>;

    /// Whether the venue trades today.
    async fn is_market_open(&self) -> Result<bool, BrokerError>;

    /// Last traded price for `EXCHANGE:SYMBOL`.
    async fn last_price(&self, instrument: &str) -> Result<Decimal, BrokerError>;

    /// Full instrument master for an exchange.
    async fn instruments(&self, exchange: &str) -> Result<Vec<Instrument>, BrokerError>;

    /// Single instrument lookup.
    async fn instrument(
        &self,
        symbol: &str,
        exchange: &str,
    ) -> Result<Option<Instrument>, BrokerError>;

    /// Today's order book.
    async fn orders(&self) -> Result<Vec<Order>, BrokerError>;

    /// Submits an order and returns the broker's order id.
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError>;

    /// Modifies price/quantity of an open order.
    async fn modify_order(&self, order_id: &str, request: &OrderRequest)
        -> Result<(), BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    async fn positions(&self) -> Result<Vec<NetPosition>, BrokerError>;

    async fn margins(&self) -> Result<Margins, BrokerError>;
}

/// Identifies a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub namespace: String,
    pub id: String,
}

/// A record and the key it is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: RecordKey,
    pub document: serde_json::Value,
}

/// Durable single-document-per-namespace storage.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Creates the namespace if it does not exist yet.
    async fn create_namespace(&self, name: &str) -> Result<(), StoreError>;

    /// First record of the namespace, if any.
    async fn get(&self, namespace: &str) -> Result<Option<StoredRecord>, StoreError>;

    async fn insert(
        &self,
        namespace: &str,
        document: serde_json::Value,
    ) -> Result<RecordKey, StoreError>;

    /// Replaces the document stored under `key`.
    async fn update(&self, key: &RecordKey, document: serde_json::Value)
        -> Result<(), StoreError>;
}

/// Human-facing notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}
