//! Kite Connect v3 REST client with rate limiting.
//!
//! Implements [`Broker`] over the Kite REST API. The client is handed an
//! already-issued access token; session bootstrap happens elsewhere.

use crate::types::{
    modify_form, order_form, parse_instruments, Envelope, LtpEntry, OrderIdData, ProfileData,
    RawMargins, RawOrder, RawPositions,
};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use parking_lot::Mutex;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use theta_core::error::ORDER_TIMEOUT_MESSAGE;
use theta_core::{
    Broker, BrokerError, Instrument, KiteConfig, Margins, NetPosition, Order, OrderRequest,
    VenueConfig,
};
use tracing::{debug, info};

// =============================================================================
// Constants
// =============================================================================

/// Kite Connect production API base URL.
pub const KITE_API_URL: &str = "https://api.kite.trade";

const KITE_VERSION: &str = "3";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Kite client.
#[derive(Debug)]
pub struct KiteClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    pub api_key: String,

    /// Session access token.
    pub access_token: SecretString,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Venue time zone for the trading-day check.
    pub timezone: Tz,

    /// Exchange holidays.
    pub holidays: Vec<NaiveDate>,
}

impl Default for KiteClientConfig {
    fn default() -> Self {
        Self {
            base_url: KITE_API_URL.to_string(),
            api_key: String::new(),
            access_token: SecretString::from(String::new()),
            requests_per_minute: nonzero!(180u32),
            timeout_secs: 30,
            timezone: chrono_tz::Asia::Kolkata,
            holidays: Vec::new(),
        }
    }
}

impl KiteClientConfig {
    /// Builds the client configuration from application settings.
    #[must_use]
    pub fn from_settings(kite: &KiteConfig, venue: &VenueConfig) -> Self {
        Self {
            base_url: kite.api_url.clone(),
            api_key: kite.api_key.clone(),
            access_token: SecretString::from(kite.access_token.clone()),
            requests_per_minute: NonZeroU32::new(kite.requests_per_minute)
                .unwrap_or(nonzero!(180u32)),
            timeout_secs: kite.timeout_secs,
            timezone: venue.timezone,
            holidays: venue.holidays.clone(),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the API key and access token.
    #[must_use]
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        self.api_key = api_key.into();
        self.access_token = SecretString::from(access_token.into());
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the holiday calendar.
    #[must_use]
    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }
}

fn transport(err: reqwest::Error) -> BrokerError {
    if err.is_timeout() {
        BrokerError::Timeout(err.to_string())
    } else {
        BrokerError::Network(err.to_string())
    }
}

/// Maps an error envelope to a [`BrokerError`].
fn classify(status_code: u16, message: String, error_type: Option<&str>) -> BrokerError {
    if message.contains(ORDER_TIMEOUT_MESSAGE) {
        return BrokerError::OrderTimeout(message);
    }
    if status_code == 403 || error_type == Some("TokenException") {
        return BrokerError::Authentication(message);
    }
    BrokerError::api(status_code, message)
}

/// Whether `date` is a trading day: a weekday not listed as a holiday.
#[must_use]
pub fn is_trading_day(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !holidays.contains(&date)
}

// =============================================================================
// KiteClient
// =============================================================================

type InstrumentCache = HashMap<String, (NaiveDate, Arc<Vec<Instrument>>)>;

/// Kite Connect REST API client.
///
/// All requests are rate-limited and carry the session token. The instrument
/// dump is cached per exchange for the current venue day.
pub struct KiteClient {
    config: KiteClientConfig,

    http: Client,

    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,

    instruments: Mutex<InstrumentCache>,
}

impl std::fmt::Debug for KiteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteClient")
            .field("base_url", &self.config.base_url)
            .field("api_key", &self.config.api_key)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl KiteClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: KiteClientConfig) -> Result<Self, BrokerError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrokerError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            instruments: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn venue_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.timezone).date_naive()
    }

    /// Waits for the rate limiter and builds an authenticated request.
    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.base_url, path);
        debug!("{} {}", method, url);

        self.http
            .request(method, url)
            .header("X-Kite-Version", KITE_VERSION)
            .header(
                "Authorization",
                format!(
                    "token {}:{}",
                    self.config.api_key,
                    self.config.access_token.expose_secret()
                ),
            )
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BrokerError> {
        let response = self
            .request(Method::GET, path)
            .await
            .send()
            .await
            .map_err(transport)?;
        Self::handle_response(response).await
    }

    async fn send_form<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: String,
    ) -> Result<T, BrokerError> {
        let response = self
            .request(method, path)
            .await
            .header("Content-Type", FORM_CONTENT_TYPE)
            .body(form)
            .send()
            .await
            .map_err(transport)?;
        Self::handle_response(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, BrokerError> {
        let response = self
            .request(Method::DELETE, path)
            .await
            .send()
            .await
            .map_err(transport)?;
        Self::handle_response(response).await
    }

    /// Unwraps the response envelope, converting errors appropriately.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BrokerError> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return Err(BrokerError::rate_limit(retry_after));
        }

        let text = response.text().await.map_err(transport)?;
        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(BrokerError::from(e)),
            Err(_) => return Err(classify(status.as_u16(), text, None)),
        };

        if !status.is_success() || envelope.status == "error" {
            let message = envelope.message.unwrap_or_else(|| status.to_string());
            return Err(classify(
                status.as_u16(),
                message,
                envelope.error_type.as_deref(),
            ));
        }

        envelope
            .data
            .ok_or_else(|| BrokerError::Serialization("response has no data".to_string()))
    }

    async fn fetch_instruments(&self, exchange: &str) -> Result<Vec<Instrument>, BrokerError> {
        let path = format!("/instruments/{exchange}");
        let response = self
            .request(Method::GET, &path)
            .await
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(classify(status.as_u16(), message, None));
        }

        parse_instruments(&body)
    }

    /// Instrument master for an exchange, served from the daily cache.
    async fn cached_instruments(&self, exchange: &str) -> Result<Arc<Vec<Instrument>>, BrokerError> {
        let today = self.venue_today();
        if let Some((day, cached)) = self.instruments.lock().get(exchange) {
            if *day == today {
                return Ok(Arc::clone(cached));
            }
        }

        let fetched = Arc::new(self.fetch_instruments(exchange).await?);
        info!(
            exchange,
            count = fetched.len(),
            "Loaded instrument master"
        );
        self.instruments
            .lock()
            .insert(exchange.to_string(), (today, Arc::clone(&fetched)));
        Ok(fetched)
    }
}

#[async_trait]
impl Broker for KiteClient {
    async fn authenticate(&self) -> Result<(), BrokerError> {
        let profile: ProfileData = self.get("/user/profile").await?;
        info!(user_id = %profile.user_id, "Kite session validated");
        Ok(())
    }

    async fn is_market_open(&self) -> Result<bool, BrokerError> {
        Ok(is_trading_day(self.venue_today(), &self.config.holidays))
    }

    async fn last_price(&self, instrument: &str) -> Result<Decimal, BrokerError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("i", instrument)
            .finish();
        let quotes: HashMap<String, LtpEntry> = self.get(&format!("/quote/ltp?{query}")).await?;

        quotes
            .get(instrument)
            .map(|q| q.last_price)
            .ok_or_else(|| {
                let (exchange, symbol) = instrument.split_once(':').unwrap_or(("", instrument));
                BrokerError::instrument_not_found(exchange, symbol)
            })
    }

    async fn instruments(&self, exchange: &str) -> Result<Vec<Instrument>, BrokerError> {
        Ok(self.cached_instruments(exchange).await?.as_ref().clone())
    }

    async fn instrument(
        &self,
        symbol: &str,
        exchange: &str,
    ) -> Result<Option<Instrument>, BrokerError> {
        let instruments = self.cached_instruments(exchange).await?;
        Ok(instruments
            .iter()
            .find(|i| i.trading_symbol == symbol && i.exchange == exchange)
            .cloned())
    }

    async fn orders(&self) -> Result<Vec<Order>, BrokerError> {
        let raw: Vec<RawOrder> = self.get("/orders").await?;
        Ok(raw.into_iter().filter_map(RawOrder::into_order).collect())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError> {
        let data: OrderIdData = self
            .send_form(Method::POST, "/orders/regular", order_form(request))
            .await?;
        info!(
            order_id = %data.order_id,
            symbol = %request.trading_symbol,
            side = %request.side,
            quantity = request.quantity,
            "Order submitted"
        );
        Ok(data.order_id)
    }

    async fn modify_order(&self, order_id: &str, request: &OrderRequest) -> Result<(), BrokerError> {
        let _: OrderIdData = self
            .send_form(
                Method::PUT,
                &format!("/orders/regular/{order_id}"),
                modify_form(request),
            )
            .await?;
        info!(order_id, price = ?request.price, "Order modified");
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let _: OrderIdData = self.delete(&format!("/orders/regular/{order_id}")).await?;
        info!(order_id, "Order cancelled");
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<NetPosition>, BrokerError> {
        let raw: RawPositions = self.get("/portfolio/positions").await?;
        Ok(raw
            .net
            .into_iter()
            .filter_map(|p| p.into_position())
            .collect())
    }

    async fn margins(&self) -> Result<Margins, BrokerError> {
        let raw: RawMargins = self.get("/user/margins").await?;
        Ok(Margins::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use theta_core::{OrderStatus, OrderType, Product, Side};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> KiteClient {
        let config = KiteClientConfig::default()
            .with_base_url(server.uri())
            .with_credentials("key", "token");
        KiteClient::new(config).unwrap()
    }

    fn sell_request() -> OrderRequest {
        OrderRequest {
            exchange: "NFO".to_string(),
            trading_symbol: "NIFTY24O1719450CE".to_string(),
            product: Product::CarryForward,
            order_type: OrderType::Limit,
            side: Side::Sell,
            quantity: 50,
            price: Some(dec!(101)),
            trigger_price: None,
        }
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_client_config_default() {
        let config = KiteClientConfig::default();
        assert_eq!(config.base_url, KITE_API_URL);
        assert_eq!(config.requests_per_minute.get(), 180);
    }

    #[test]
    fn test_config_from_settings() {
        let kite = KiteConfig {
            api_key: "k".to_string(),
            access_token: "t".to_string(),
            requests_per_minute: 0,
            ..KiteConfig::default()
        };
        let config = KiteClientConfig::from_settings(&kite, &VenueConfig::default());
        assert_eq!(config.api_key, "k");
        assert_eq!(config.access_token.expose_secret(), "t");
        assert_eq!(config.requests_per_minute.get(), 180);
    }

    #[test]
    fn test_client_debug_does_not_expose_token() {
        let client = KiteClient::new(
            KiteClientConfig::default().with_credentials("key", "very-secret"),
        )
        .unwrap();
        assert!(!format!("{client:?}").contains("very-secret"));
    }

    // ==================== Calendar Tests ====================

    #[test]
    fn test_trading_day_excludes_weekends_and_holidays() {
        let friday = NaiveDate::from_ymd_opt(2024, 10, 18).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 10, 19).unwrap();
        let diwali = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();

        assert!(is_trading_day(friday, &[]));
        assert!(!is_trading_day(saturday, &[]));
        assert!(!is_trading_day(diwali, &[diwali]));
    }

    // ==================== Error Mapping Tests ====================

    #[test]
    fn test_classify_errors() {
        assert!(matches!(
            classify(504, "Order request timed out. Please retry.".into(), Some("NetworkException")),
            BrokerError::OrderTimeout(_)
        ));
        assert!(matches!(
            classify(403, "Incorrect api_key or access_token.".into(), Some("TokenException")),
            BrokerError::Authentication(_)
        ));
        assert!(matches!(
            classify(400, "Invalid price".into(), Some("InputException")),
            BrokerError::Api { status_code: 400, .. }
        ));
    }

    // ==================== Mock Server Tests ====================

    #[tokio::test]
    async fn test_last_price_sends_auth_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/quote/ltp"))
            .and(query_param("i", "NSE:NIFTY 50"))
            .and(header("X-Kite-Version", "3"))
            .and(header("Authorization", "token key:token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"NSE:NIFTY 50": {"instrument_token": 256265, "last_price": 19432.5}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let price = client.last_price("NSE:NIFTY 50").await.unwrap();
        assert_eq!(price, dec!(19432.5));
    }

    #[tokio::test]
    async fn test_submit_order_posts_form() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .and(body_string_contains("tradingsymbol=NIFTY24O1719450CE"))
            .and(body_string_contains("transaction_type=SELL"))
            .and(body_string_contains("order_type=LIMIT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"order_id": "230915000123"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let order_id = client.submit_order(&sell_request()).await.unwrap();
        assert_eq!(order_id, "230915000123");
    }

    #[tokio::test]
    async fn test_submit_order_timeout_is_ambiguous() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .respond_with(ResponseTemplate::new(504).set_body_json(serde_json::json!({
                "status": "error",
                "message": "Order request timed out",
                "error_type": "NetworkException"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.submit_order(&sell_request()).await.unwrap_err();
        assert!(err.is_order_timeout());
    }

    #[tokio::test]
    async fn test_rate_limit_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.orders().await.unwrap_err();
        assert!(matches!(err, BrokerError::RateLimit { retry_after_secs: 2 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_orders_are_mapped() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": [
                    {
                        "order_id": "1",
                        "exchange": "NFO",
                        "tradingsymbol": "NIFTY24O1719450CE",
                        "product": "NRML",
                        "order_type": "LIMIT",
                        "transaction_type": "SELL",
                        "quantity": 50,
                        "price": 101,
                        "trigger_price": 0,
                        "average_price": 101.4,
                        "status": "COMPLETE"
                    },
                    {
                        "order_id": "2",
                        "exchange": "NSE",
                        "tradingsymbol": "INFY",
                        "product": "BO",
                        "order_type": "LIMIT",
                        "transaction_type": "BUY",
                        "status": "OPEN"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let orders = client.orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Complete);
        assert_eq!(orders[0].average_price, dec!(101.4));
    }

    #[tokio::test]
    async fn test_expired_token_maps_to_authentication() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/profile"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "status": "error",
                "message": "Incorrect `api_key` or `access_token`.",
                "error_type": "TokenException"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, BrokerError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_instruments_are_cached_per_day() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/instruments/NFO"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "instrument_token,exchange_token,tradingsymbol,name,last_price,expiry,strike,tick_size,lot_size,instrument_type,segment,exchange\n\
                 12138498,47416,NIFTY24O1719450CE,\"NIFTY\",0,2024-10-17,19450.0,0.05,25,CE,NFO-OPT,NFO\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.instruments("NFO").await.unwrap().len(), 1);

        let found = client
            .instrument("NIFTY24O1719450CE", "NFO")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.lot_size, 25);
        assert!(client.instrument("MISSING", "NFO").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_and_margins() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/orders/regular/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"order_id": "77"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user/margins"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {
                    "equity": {
                        "net": 150000.5,
                        "available": {"cash": 200000},
                        "utilised": {"debits": 49999.5}
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.cancel_order("77").await.unwrap();

        let margins = client.margins().await.unwrap();
        assert_eq!(margins.net, dec!(150000.5));
        assert_eq!(margins.available_cash, dec!(200000));
        assert_eq!(margins.utilised, dec!(49999.5));
    }
}
