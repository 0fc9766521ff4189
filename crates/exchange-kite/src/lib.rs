//! Kite Connect gateway.
//!
//! Provides a rate-limited REST client implementing the engine's
//! [`Broker`](theta_core::Broker) capability:
//!
//! - Quotes (`/quote/ltp`) and the instrument master CSV dump
//! - Regular order placement, modification and cancellation
//! - Order book, net positions and equity margins
//!
//! # Example
//!
//! ```ignore
//! use theta_core::Broker;
//! use theta_kite::{KiteClient, KiteClientConfig};
//!
//! let client = KiteClient::new(KiteClientConfig::default().with_credentials(key, token))?;
//! client.authenticate().await?;
//! let spot = client.last_price("NSE:NIFTY 50").await?;
//! ```

pub mod client;
mod types;

pub use client::{is_trading_day, KiteClient, KiteClientConfig, KITE_API_URL};
