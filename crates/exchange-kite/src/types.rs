//! Kite Connect wire types and their conversion into core types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use theta_core::{
    BrokerError, Instrument, Margins, NetPosition, Order, OrderRequest, OrderStatus, OrderType,
    Product, Side,
};

// =============================================================================
// Envelope
// =============================================================================

/// Every JSON response is wrapped as `{"status": ..., "data": ...}` or
/// `{"status": "error", "message": ..., "error_type": ...}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: String,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderIdData {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LtpEntry {
    pub last_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileData {
    pub user_id: String,
}

// =============================================================================
// Enum codes
// =============================================================================

pub(crate) fn parse_side(code: &str) -> Option<Side> {
    match code {
        "BUY" => Some(Side::Buy),
        "SELL" => Some(Side::Sell),
        _ => None,
    }
}

pub(crate) fn parse_product(code: &str) -> Option<Product> {
    match code {
        "MIS" => Some(Product::Intraday),
        "NRML" => Some(Product::CarryForward),
        "CNC" => Some(Product::Delivery),
        _ => None,
    }
}

pub(crate) fn parse_order_type(code: &str) -> Option<OrderType> {
    match code {
        "MARKET" => Some(OrderType::Market),
        "LIMIT" => Some(OrderType::Limit),
        "SL" => Some(OrderType::StopLoss),
        "SL-M" => Some(OrderType::StopLossMarket),
        _ => None,
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOrder {
    pub order_id: String,
    pub exchange: String,
    pub tradingsymbol: String,
    pub product: String,
    pub order_type: String,
    pub transaction_type: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub trigger_price: Decimal,
    #[serde(default)]
    pub average_price: Decimal,
    pub status: Option<String>,
    pub status_message: Option<String>,
}

impl RawOrder {
    /// Converts to a core order, or `None` for products/types the engine
    /// never trades (bracket, cover, MTF...).
    pub fn into_order(self) -> Option<Order> {
        Some(Order {
            product: parse_product(&self.product)?,
            order_type: parse_order_type(&self.order_type)?,
            side: parse_side(&self.transaction_type)?,
            order_id: self.order_id,
            exchange: self.exchange,
            trading_symbol: self.tradingsymbol,
            quantity: self.quantity,
            price: self.price,
            trigger_price: self.trigger_price,
            average_price: self.average_price,
            status: self
                .status
                .as_deref()
                .map_or_else(|| OrderStatus::Other(String::new()), OrderStatus::from),
            status_message: self.status_message,
        })
    }
}

/// Form fields for `POST /orders/regular`.
pub(crate) fn order_form(request: &OrderRequest) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("tradingsymbol", &request.trading_symbol)
        .append_pair("exchange", &request.exchange)
        .append_pair("transaction_type", request.side.as_str())
        .append_pair("order_type", request.order_type.as_str())
        .append_pair("quantity", &request.quantity.to_string())
        .append_pair("product", request.product.as_str())
        .append_pair("validity", "DAY");
    if let Some(price) = request.price {
        form.append_pair("price", &price.to_string());
    }
    if let Some(trigger) = request.trigger_price {
        form.append_pair("trigger_price", &trigger.to_string());
    }
    form.finish()
}

/// Form fields for `PUT /orders/regular/{id}`.
pub(crate) fn modify_form(request: &OrderRequest) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("order_type", request.order_type.as_str())
        .append_pair("quantity", &request.quantity.to_string())
        .append_pair("validity", "DAY");
    if let Some(price) = request.price {
        form.append_pair("price", &price.to_string());
    }
    if let Some(trigger) = request.trigger_price {
        form.append_pair("trigger_price", &trigger.to_string());
    }
    form.finish()
}

// =============================================================================
// Portfolio
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawPositions {
    #[serde(default)]
    pub net: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPosition {
    pub tradingsymbol: String,
    pub exchange: String,
    pub product: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub pnl: Decimal,
}

impl RawPosition {
    pub fn into_position(self) -> Option<NetPosition> {
        Some(NetPosition {
            product: parse_product(&self.product)?,
            trading_symbol: self.tradingsymbol,
            exchange: self.exchange,
            quantity: self.quantity,
            average_price: self.average_price,
            pnl: self.pnl,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMargins {
    pub equity: Option<RawSegmentMargin>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSegmentMargin {
    #[serde(default)]
    pub net: Decimal,
    pub available: Option<RawAvailable>,
    pub utilised: Option<RawUtilised>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAvailable {
    #[serde(default)]
    pub cash: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUtilised {
    #[serde(default)]
    pub debits: Decimal,
}

impl From<RawMargins> for Margins {
    fn from(raw: RawMargins) -> Self {
        let Some(equity) = raw.equity else {
            return Self::default();
        };
        Self {
            net: equity.net,
            available_cash: equity.available.map(|a| a.cash).unwrap_or_default(),
            utilised: equity.utilised.map(|u| u.debits).unwrap_or_default(),
        }
    }
}

// =============================================================================
// Instrument dump
// =============================================================================

/// One row of the `/instruments/{exchange}` CSV dump.
#[derive(Debug, Deserialize)]
struct RawInstrument {
    instrument_token: u64,
    tradingsymbol: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    expiry: String,
    #[serde(default)]
    strike: String,
    #[serde(default)]
    tick_size: String,
    #[serde(default)]
    lot_size: u32,
    #[serde(default)]
    instrument_type: String,
    #[serde(default)]
    segment: String,
    exchange: String,
}

fn decimal_field(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or_default()
}

impl From<RawInstrument> for Instrument {
    fn from(raw: RawInstrument) -> Self {
        Self {
            instrument_token: raw.instrument_token,
            trading_symbol: raw.tradingsymbol,
            name: raw.name,
            exchange: raw.exchange,
            segment: raw.segment,
            instrument_type: raw.instrument_type,
            strike: decimal_field(&raw.strike).normalize(),
            expiry: NaiveDate::parse_from_str(raw.expiry.trim(), "%Y-%m-%d").ok(),
            lot_size: raw.lot_size,
            tick_size: decimal_field(&raw.tick_size),
        }
    }
}

/// Parses the instrument master CSV.
pub(crate) fn parse_instruments(body: &str) -> Result<Vec<Instrument>, BrokerError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut instruments = Vec::new();
    for row in reader.deserialize::<RawInstrument>() {
        let raw = row.map_err(|e| BrokerError::Serialization(format!("instrument dump: {e}")))?;
        instruments.push(Instrument::from(raw));
    }
    Ok(instruments)
}
