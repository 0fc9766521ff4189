use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::{OrderType, Product};

/// Name of the built-in strategy.
pub const DEFAULT_STRATEGY: &str = "twelvethirty";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub venue: VenueConfig,
    pub kite: KiteConfig,
    pub store: StoreConfig,
    pub notifier: NotifierConfig,
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
    pub strategies: BTreeMap<String, StrategyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut strategies = BTreeMap::new();
        strategies.insert(DEFAULT_STRATEGY.to_string(), StrategyConfig::default());
        Self {
            venue: VenueConfig::default(),
            kite: KiteConfig::default(),
            store: StoreConfig::default(),
            notifier: NotifierConfig::default(),
            execution: ExecutionConfig::default(),
            scheduler: SchedulerConfig::default(),
            strategies,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn strategy(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies.get(name)
    }
}

/// Trading venue calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub timezone: Tz,
    /// Exchange holidays; weekends are always closed.
    pub holidays: Vec<NaiveDate>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            holidays: Vec::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KiteConfig {
    pub api_url: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for KiteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.kite.trade".to_string(),
            api_key: String::new(),
            access_token: String::new(),
            requests_per_minute: 180,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for KiteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key)
            .field("access_token", &"[REDACTED]")
            .field("requests_per_minute", &self.requests_per_minute)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://theta.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// JSON webhook endpoint; notifications are only logged when unset.
    pub webhook_url: Option<String>,
}

/// Order placement timings and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub attempts: u32,
    pub retry_delay_secs: u64,
    /// Wait before looking up an order whose submission timed out.
    pub settle_delay_secs: u64,
    /// Wait after submitting or modifying a LIMIT order.
    pub fill_wait_secs: u64,
    /// Wait after submitting any other order type.
    pub ack_wait_secs: u64,
    /// Extra samples taken by the de-noised price read.
    pub price_samples: u32,
    pub sample_interval_secs: u64,
    /// Added to (buy) or taken from (sell) the LTP for LIMIT orders.
    pub limit_offset: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay_secs: 5,
            settle_delay_secs: 30,
            fill_wait_secs: 10,
            ack_wait_secs: 1,
            price_samples: 5,
            sample_interval_secs: 1,
            limit_offset: Decimal::ONE,
        }
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    #[must_use]
    pub fn fill_wait(&self) -> Duration {
        Duration::from_secs(self.fill_wait_secs)
    }

    #[must_use]
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }

    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Which expiry series a strategy trades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirySchedule {
    /// Nearest expiry.
    #[default]
    Weekly,
    /// Last expiry of the month `month_offset` months ahead.
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossMode {
    /// Risk percentage widens as expiry approaches.
    #[default]
    TimeDecay,
    /// Always `base_pct`.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopLossConfig {
    pub mode: StopLossMode,
    /// Used more than a day before expiry, and always in fixed mode.
    pub base_pct: Decimal,
    /// Used within the last day before expiry.
    pub expiry_day_pct: Decimal,
    /// Used once expiry has passed.
    pub expired_pct: Decimal,
    /// Trigger prices are floored to a multiple of this.
    pub trigger_step: Decimal,
    /// Limit price = truncated trigger + this.
    pub limit_offset: Decimal,
    /// Time of day at which an expiry date is considered elapsed.
    #[serde(with = "hhmm")]
    pub expiry_cutoff: NaiveTime,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            mode: StopLossMode::TimeDecay,
            base_pct: Decimal::from(30),
            expiry_day_pct: Decimal::from(40),
            expired_pct: Decimal::from(70),
            trigger_step: Decimal::new(1, 1),
            limit_offset: Decimal::from(5),
            expiry_cutoff: hm(15, 30),
        }
    }
}

/// Daily wall-clock window `[start, end)` in venue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Trading symbol prefix of the options, e.g. `NIFTY`.
    pub underlying: String,
    /// Quote key of the underlying index, e.g. `NSE:NIFTY 50`.
    pub spot_symbol: String,
    /// Derivatives exchange, e.g. `NFO`.
    pub exchange: String,
    pub expiry: ExpirySchedule,
    pub month_offset: u32,
    pub strike_step: Decimal,
    /// Lot multiplier. Required to trade.
    pub lots: Option<u32>,
    pub product: Product,
    pub order_type: OrderType,
    pub entry: TimeWindow,
    pub exit: TimeWindow,
    pub stop_loss: StopLossConfig,
    pub freak_threshold_pct: Decimal,
    /// Distance of the protective long wings from ATM; no wings when unset.
    pub wing_distance: Option<Decimal>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            underlying: "NIFTY".to_string(),
            spot_symbol: "NSE:NIFTY 50".to_string(),
            exchange: "NFO".to_string(),
            expiry: ExpirySchedule::Weekly,
            month_offset: 0,
            strike_step: Decimal::from(50),
            lots: None,
            product: Product::CarryForward,
            order_type: OrderType::Limit,
            entry: TimeWindow::new(hm(12, 25), hm(12, 35)),
            exit: TimeWindow::new(hm(15, 25), hm(15, 30)),
            stop_loss: StopLossConfig::default(),
            freak_threshold_pct: Decimal::from(20),
            wing_distance: None,
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// `HH:MM` (or `HH:MM:SS`) serde format for [`NaiveTime`].
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| de::Error::custom(format!("invalid time '{raw}': {e}")))
    }
}
