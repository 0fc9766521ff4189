//! In-process broker and notifier doubles for engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use theta_core::error::ORDER_TIMEOUT_MESSAGE;
use theta_core::{
    Broker, BrokerError, ExecutionConfig, Instrument, ManualClock, Margins, NetPosition,
    Notifier, NotifyError, Order, OrderRequest, OrderStatus, OrderType, SchedulerConfig,
    StateStore, StrategyConfig,
};
use theta_engine::StrategyContext;
use theta_store::MemoryStore;

pub const IST: chrono_tz::Tz = chrono_tz::Asia::Kolkata;
pub const SPOT: &str = "NSE:NIFTY 50";
pub const CALL: &str = "NIFTY24O2419450CE";
pub const PUT: &str = "NIFTY24O2419450PE";
pub const CALL_WING: &str = "NIFTY24O2419650CE";
pub const PUT_WING: &str = "NIFTY24O2419250PE";

/// 2024-10-17 (a Thursday) at `hour:minute` venue time.
pub fn ist(hour: u32, minute: u32) -> DateTime<Utc> {
    IST.with_ymd_and_hms(2024, 10, 17, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn quote(symbol: &str) -> String {
    format!("NFO:{symbol}")
}

pub fn option(symbol: &str, strike: Decimal, kind: &str, expiry: (i32, u32, u32)) -> Instrument {
    Instrument {
        instrument_token: 0,
        trading_symbol: symbol.to_string(),
        name: symbol.chars().take_while(char::is_ascii_alphabetic).collect(),
        exchange: "NFO".to_string(),
        segment: "NFO-OPT".to_string(),
        instrument_type: kind.to_string(),
        strike,
        expiry: NaiveDate::from_ymd_opt(expiry.0, expiry.1, expiry.2),
        lot_size: 25,
        tick_size: dec!(0.05),
    }
}

/// Weekly and monthly NIFTY options around 19450, plus a BANKNIFTY decoy.
pub fn option_chain() -> Vec<Instrument> {
    vec![
        option("NIFTY24OCT19450CE", dec!(19450), "CE", (2024, 10, 31)),
        option(CALL, dec!(19450), "CE", (2024, 10, 24)),
        option(PUT, dec!(19450), "PE", (2024, 10, 24)),
        option("NIFTY24OCT19450PE", dec!(19450), "PE", (2024, 10, 31)),
        option(CALL_WING, dec!(19650), "CE", (2024, 10, 24)),
        option(PUT_WING, dec!(19250), "PE", (2024, 10, 24)),
        option("NIFTY24NOV19450CE", dec!(19450), "CE", (2024, 11, 28)),
        option("BANKNIFTY24O2319450CE", dec!(19450), "CE", (2024, 10, 23)),
    ]
}

/// Simulated broker with an order book.
///
/// LIMIT and MARKET orders fill on submission, SL orders rest as
/// `TRIGGER PENDING`. Price scripts are consumed one value per read and
/// the last value repeats.
pub struct StubBroker {
    market_open: AtomicBool,
    instruments: Vec<Instrument>,
    prices: Mutex<HashMap<String, VecDeque<Decimal>>>,
    orders: Mutex<Vec<Order>>,
    submits: Mutex<Vec<OrderRequest>>,
    modifies: Mutex<Vec<String>>,
    cancels: Mutex<Vec<String>>,
    next_id: AtomicU64,
    timeout_next_submit: AtomicBool,
    rest_limits: AtomicBool,
    fail_book_after_submit: AtomicBool,
    book_down: AtomicBool,
}

impl StubBroker {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self {
            market_open: AtomicBool::new(true),
            instruments,
            prices: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            submits: Mutex::new(Vec::new()),
            modifies: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            timeout_next_submit: AtomicBool::new(false),
            rest_limits: AtomicBool::new(false),
            fail_book_after_submit: AtomicBool::new(false),
            book_down: AtomicBool::new(false),
        }
    }

    /// A broker quoting the spot at 19432 and the ATM call/put at 100/80.
    pub fn nifty() -> Self {
        let broker = Self::new(option_chain());
        broker.set_price(SPOT, dec!(19432));
        broker.set_price(&quote(CALL), dec!(100));
        broker.set_price(&quote(PUT), dec!(80));
        broker.set_price(&quote(CALL_WING), dec!(30));
        broker.set_price(&quote(PUT_WING), dec!(25));
        broker
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.store(open, Ordering::SeqCst);
    }

    pub fn set_price(&self, key: &str, price: Decimal) {
        self.script_prices(key, &[price]);
    }

    pub fn script_prices(&self, key: &str, prices: &[Decimal]) {
        self.prices
            .lock()
            .insert(key.to_string(), prices.iter().copied().collect());
    }

    /// The next submission is accepted but reported as timed out.
    pub fn time_out_next_submit(&self) {
        self.timeout_next_submit.store(true, Ordering::SeqCst);
    }

    /// The next submission is accepted, after which the order book is
    /// unreachable until [`StubBroker::restore_order_book`].
    pub fn break_order_book_after_next_submit(&self) {
        self.fail_book_after_submit.store(true, Ordering::SeqCst);
    }

    pub fn restore_order_book(&self) {
        self.book_down.store(false, Ordering::SeqCst);
    }

    /// LIMIT orders stay OPEN until modified.
    pub fn rest_limit_orders(&self) {
        self.rest_limits.store(true, Ordering::SeqCst);
    }

    /// Adds an order to the book directly, as if placed by an earlier run.
    pub fn seed_order(&self, order: Order) {
        self.orders.lock().push(order);
    }

    pub fn set_status(&self, order_id: &str, status: OrderStatus, average_price: Decimal) {
        let mut orders = self.orders.lock();
        if let Some(order) = orders.iter_mut().find(|o| o.order_id == order_id) {
            order.status = status;
            order.average_price = average_price;
        }
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders
            .lock()
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
    }

    pub fn submits(&self) -> Vec<OrderRequest> {
        self.submits.lock().clone()
    }

    pub fn modifies(&self) -> Vec<String> {
        self.modifies.lock().clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().clone()
    }

    fn peek_price(&self, key: &str) -> Option<Decimal> {
        self.prices.lock().get(key).and_then(|q| q.front().copied())
    }

    fn fill_price(&self, request: &OrderRequest) -> Decimal {
        request.price.unwrap_or_else(|| {
            self.peek_price(&format!("{}:{}", request.exchange, request.trading_symbol))
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl Broker for StubBroker {
    async fn authenticate(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn is_market_open(&self) -> Result<bool, BrokerError> {
        Ok(self.market_open.load(Ordering::SeqCst))
    }

    async fn last_price(&self, instrument: &str) -> Result<Decimal, BrokerError> {
        let mut prices = self.prices.lock();
        let script = prices
            .get_mut(instrument)
            .ok_or_else(|| BrokerError::api(400, format!("no quote for {instrument}")))?;
        let price = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        price.ok_or_else(|| BrokerError::api(400, format!("no quote for {instrument}")))
    }

    async fn instruments(&self, exchange: &str) -> Result<Vec<Instrument>, BrokerError> {
        Ok(self
            .instruments
            .iter()
            .filter(|i| i.exchange == exchange)
            .cloned()
            .collect())
    }

    async fn instrument(
        &self,
        symbol: &str,
        exchange: &str,
    ) -> Result<Option<Instrument>, BrokerError> {
        Ok(self
            .instruments
            .iter()
            .find(|i| i.trading_symbol == symbol && i.exchange == exchange)
            .cloned())
    }

    async fn orders(&self) -> Result<Vec<Order>, BrokerError> {
        if self.book_down.load(Ordering::SeqCst) {
            return Err(BrokerError::Network("connection reset".to_string()));
        }
        Ok(self.orders.lock().clone())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError> {
        self.submits.lock().push(request.clone());

        let order_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let rest = self.rest_limits.load(Ordering::SeqCst);
        let (status, average_price) = match request.order_type {
            OrderType::StopLoss | OrderType::StopLossMarket => {
                (OrderStatus::TriggerPending, Decimal::ZERO)
            }
            OrderType::Limit if rest => (OrderStatus::Open, Decimal::ZERO),
            OrderType::Limit | OrderType::Market => {
                (OrderStatus::Complete, self.fill_price(request))
            }
        };

        self.orders.lock().push(Order {
            order_id: order_id.clone(),
            exchange: request.exchange.clone(),
            trading_symbol: request.trading_symbol.clone(),
            product: request.product,
            order_type: request.order_type,
            side: request.side,
            quantity: request.quantity,
            price: request.price.unwrap_or_default(),
            trigger_price: request.trigger_price.unwrap_or_default(),
            average_price,
            status,
            status_message: None,
        });

        if self.fail_book_after_submit.swap(false, Ordering::SeqCst) {
            self.book_down.store(true, Ordering::SeqCst);
        }
        if self.timeout_next_submit.swap(false, Ordering::SeqCst) {
            return Err(BrokerError::OrderTimeout(ORDER_TIMEOUT_MESSAGE.to_string()));
        }
        Ok(order_id)
    }

    /// Modifying an open order fills it at the new price.
    async fn modify_order(&self, order_id: &str, request: &OrderRequest) -> Result<(), BrokerError> {
        self.modifies.lock().push(order_id.to_string());

        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| BrokerError::order_not_found(order_id))?;
        let price = request.price.unwrap_or(order.price);
        order.order_type = request.order_type;
        order.price = price;
        order.status = OrderStatus::Complete;
        order.average_price = price;
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.cancels.lock().push(order_id.to_string());

        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| BrokerError::order_not_found(order_id))?;
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<NetPosition>, BrokerError> {
        Ok(Vec::new())
    }

    async fn margins(&self) -> Result<Margins, BrokerError> {
        Ok(Margins::default())
    }
}

/// Collects notifications as `(subject, body)` pairs.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.messages().into_iter().map(|(_, body)| body).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .push((subject.to_string(), body.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("webhook down".to_string()));
        }
        Ok(())
    }
}

pub fn strategy_config() -> StrategyConfig {
    StrategyConfig {
        lots: Some(2),
        ..StrategyConfig::default()
    }
}

/// Test harness wiring the doubles into a [`StrategyContext`].
pub struct Harness {
    pub broker: Arc<StubBroker>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn at(hour: u32, minute: u32) -> Self {
        Self {
            broker: Arc::new(StubBroker::nifty()),
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(RecordingNotifier::default()),
            clock: Arc::new(ManualClock::new(ist(hour, minute))),
        }
    }

    pub fn context(&self, strategy: StrategyConfig) -> StrategyContext {
        StrategyContext {
            name: "twelvethirty".to_string(),
            broker: self.broker.clone(),
            store: self.store.clone() as Arc<dyn StateStore>,
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            timezone: IST,
            execution: ExecutionConfig::default(),
            scheduler: SchedulerConfig::default(),
            strategy,
        }
    }
}
