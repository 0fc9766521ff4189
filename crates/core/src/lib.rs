pub mod clock;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, ExecutionConfig, ExpirySchedule, KiteConfig, NotifierConfig, SchedulerConfig,
    StopLossConfig, StopLossMode, StoreConfig, StrategyConfig, TimeWindow, VenueConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{BrokerError, NotifyError, StoreError};
pub use traits::{Broker, Notifier, RecordKey, StateStore, StoredRecord};
pub use types::{
    Instrument, Leg, Margins, NetPosition, OptionType, Order, OrderRequest, OrderStatus,
    OrderType, Product, Side,
};
