//! Core domain types shared by the engine and the broker gateways.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionType {
    /// Exchange code for the option type (`CE` / `PE`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[default]
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    /// The opposite side, used to flatten a position.
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Margin product an order is placed under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Intraday, squared off by the broker at session end.
    #[serde(rename = "MIS")]
    Intraday,
    /// Carry-forward derivatives position.
    #[default]
    #[serde(rename = "NRML")]
    CarryForward,
    /// Cash and carry delivery.
    #[serde(rename = "CNC")]
    Delivery,
}

impl Product {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intraday => "MIS",
            Self::CarryForward => "NRML",
            Self::Delivery => "CNC",
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "LIMIT")]
    Limit,
    /// Stop-loss limit: arms at the trigger price, then works at the limit price.
    #[serde(rename = "SL")]
    StopLoss,
    /// Stop-loss market.
    #[serde(rename = "SL-M")]
    StopLossMarket,
}

impl OrderType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLoss => "SL",
            Self::StopLossMarket => "SL-M",
        }
    }

    /// Whether the order carries a limit price.
    #[must_use]
    pub fn is_priced(self) -> bool {
        matches!(self, Self::Limit | Self::StopLoss)
    }

    /// Whether the order carries a trigger price.
    #[must_use]
    pub fn is_stop(self) -> bool {
        matches!(self, Self::StopLoss | Self::StopLossMarket)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker-reported order status.
///
/// Unknown statuses (e.g. `VALIDATION PENDING`, `PUT ORDER REQ RECEIVED`) are
/// preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Open,
    Complete,
    Cancelled,
    Rejected,
    TriggerPending,
    Other(String),
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "OPEN",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::TriggerPending => "TRIGGER PENDING",
            Self::Other(s) => s,
        }
    }

    /// Whether the order can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Rejected)
    }
}

impl From<&str> for OrderStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Self::Open,
            "COMPLETE" => Self::Complete,
            "CANCELLED" => Self::Cancelled,
            "REJECTED" => Self::Rejected,
            "TRIGGER PENDING" => Self::TriggerPending,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One order of a multi-leg strategy, through its whole lifecycle.
///
/// The empty (default) leg marks an unused slot. A leg becomes non-empty once
/// its trading symbol is resolved, gains an `order_id` when the broker accepts
/// it, and carries the broker's `status` and fill price from then on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Leg {
    pub trading_symbol: String,
    pub exchange: String,
    pub option_type: Option<OptionType>,
    pub strike: Decimal,
    pub expiry: Option<NaiveDate>,
    pub lot_size: u32,
    /// Lot multiplier; `quantity = lots * lot_size`.
    pub lots: u32,
    pub quantity: u32,
    pub product: Product,
    pub order_type: OrderType,
    pub side: Side,
    pub price: Decimal,
    pub trigger_price: Decimal,
    pub order_id: String,
    pub status: Option<OrderStatus>,
    pub average_price: Decimal,
    /// Set once the exit order for this leg has filled during an unwind.
    pub closed: bool,
    /// Id of the accepted exit order while an unwind is still confirming it.
    pub exit_order_id: String,
}

impl Leg {
    /// True for an unused slot (no trading symbol resolved yet).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trading_symbol.is_empty()
    }

    /// True once the broker has accepted the order.
    #[must_use]
    pub fn is_placed(&self) -> bool {
        !self.order_id.is_empty()
    }

    /// True once the order is placed and reported complete.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.is_placed() && self.status == Some(OrderStatus::Complete)
    }

    /// Quote key in `EXCHANGE:SYMBOL` form.
    #[must_use]
    pub fn quote_key(&self) -> String {
        format!("{}:{}", self.exchange, self.trading_symbol)
    }

    /// Opposite-side order that flattens this leg.
    ///
    /// Identity and sizing are kept; runtime fields are cleared so the exit
    /// is submitted as a fresh order.
    #[must_use]
    pub fn exit_leg(&self) -> Self {
        let mut exit = self.clone();
        exit.side = self.side.flip();
        exit.order_id.clear();
        exit.status = None;
        exit.average_price = Decimal::ZERO;
        exit.trigger_price = Decimal::ZERO;
        exit.closed = false;
        exit.exit_order_id.clear();
        if exit.order_type.is_stop() {
            exit.order_type = OrderType::Limit;
        }
        exit
    }

    /// The same order, not yet sent. Used to replace a rejected or
    /// cancelled order.
    #[must_use]
    pub fn unplaced(&self) -> Self {
        Self {
            order_id: String::new(),
            status: None,
            average_price: Decimal::ZERO,
            ..self.clone()
        }
    }

    /// Short label for logs and notifications.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} {} x{} @ {}",
            self.side, self.trading_symbol, self.quantity, self.order_type
        )
    }
}

/// Order submission parameters derived from a [`Leg`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub exchange: String,
    pub trading_symbol: String,
    pub product: Product,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: u32,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
}

impl From<&Leg> for OrderRequest {
    fn from(leg: &Leg) -> Self {
        Self {
            exchange: leg.exchange.clone(),
            trading_symbol: leg.trading_symbol.clone(),
            product: leg.product,
            order_type: leg.order_type,
            side: leg.side,
            quantity: leg.quantity,
            price: leg.order_type.is_priced().then_some(leg.price),
            trigger_price: leg.order_type.is_stop().then_some(leg.trigger_price),
        }
    }
}

/// An entry of the broker's order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub exchange: String,
    pub trading_symbol: String,
    pub product: Product,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: u32,
    pub price: Decimal,
    pub trigger_price: Decimal,
    pub average_price: Decimal,
    pub status: OrderStatus,
    pub status_message: Option<String>,
}

impl Order {
    /// Whether this book entry has the shape of `request`.
    ///
    /// Used to recover the id of an order whose submission timed out.
    #[must_use]
    pub fn matches(&self, request: &OrderRequest) -> bool {
        self.exchange == request.exchange
            && self.trading_symbol == request.trading_symbol
            && self.product == request.product
            && self.order_type == request.order_type
            && self.side == request.side
            && self.quantity == request.quantity
    }
}

/// Tradable instrument metadata from the broker's instrument master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_token: u64,
    pub trading_symbol: String,
    /// Underlying name, e.g. `NIFTY`.
    pub name: String,
    pub exchange: String,
    /// Exchange segment, e.g. `NFO-OPT`.
    pub segment: String,
    /// `CE`, `PE`, `FUT` or `EQ`.
    pub instrument_type: String,
    pub strike: Decimal,
    pub expiry: Option<NaiveDate>,
    pub lot_size: u32,
    pub tick_size: Decimal,
}

impl Instrument {
    /// Option type, if this instrument is an option.
    #[must_use]
    pub fn option_type(&self) -> Option<OptionType> {
        match self.instrument_type.as_str() {
            "CE" => Some(OptionType::Call),
            "PE" => Some(OptionType::Put),
            _ => None,
        }
    }
}

/// Net position held at the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetPosition {
    pub trading_symbol: String,
    pub exchange: String,
    pub product: Product,
    /// Signed quantity: negative for short positions.
    pub quantity: i64,
    pub average_price: Decimal,
    pub pnl: Decimal,
}

/// Equity segment margin summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub net: Decimal,
    pub available_cash: Decimal,
    pub utilised: Decimal,
}
