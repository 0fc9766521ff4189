//! Order execution, price sampling and stop reconciliation against the stub
//! broker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{quote, Harness, RecordingNotifier, StubBroker, CALL, PUT};
use rust_decimal_macros::dec;
use theta_core::{
    Broker, ExecutionConfig, Leg, ManualClock, OptionType, OrderStatus, OrderType, Product, Side,
};
use theta_engine::{
    EngineError, ExpiryClass, InstrumentResolver, OptionSelection, OrderExecutor, PriceReader,
    RetryPolicy, Watcher,
};

fn sell_call() -> Leg {
    Leg {
        trading_symbol: CALL.to_string(),
        exchange: "NFO".to_string(),
        option_type: Some(OptionType::Call),
        strike: dec!(19450),
        lot_size: 25,
        lots: 2,
        quantity: 50,
        product: Product::CarryForward,
        order_type: OrderType::Limit,
        side: Side::Sell,
        ..Leg::default()
    }
}

fn executor(harness: &Harness) -> OrderExecutor {
    OrderExecutor::new(
        harness.broker.clone(),
        harness.clock.clone(),
        ExecutionConfig::default(),
        dec!(20),
    )
}

// ============================================
// Order placement
// ============================================

#[tokio::test]
async fn test_timed_out_submit_recovers_order_id() {
    let harness = Harness::at(12, 30);
    harness.broker.time_out_next_submit();

    let leg = executor(&harness).place_order(sell_call()).await.unwrap();

    assert_eq!(harness.broker.submits().len(), 1);
    assert_eq!(leg.order_id, "1000");
    assert_eq!(leg.status, Some(OrderStatus::Complete));
    assert_eq!(leg.average_price, dec!(99));
    assert!(harness.clock.slept() >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_open_limit_is_repriced_not_resubmitted() {
    let harness = Harness::at(12, 30);
    harness.broker.rest_limit_orders();

    let leg = executor(&harness).place_order(sell_call()).await.unwrap();

    assert_eq!(harness.broker.submits().len(), 1);
    assert_eq!(harness.broker.modifies(), vec!["1000".to_string()]);
    assert_eq!(leg.status, Some(OrderStatus::Complete));
}

#[tokio::test]
async fn test_stop_order_expects_trigger_pending() {
    let harness = Harness::at(12, 30);
    let stop = Leg {
        side: Side::Buy,
        order_type: OrderType::StopLoss,
        trigger_price: dec!(128.7),
        price: dec!(133),
        ..sell_call()
    };

    let leg = executor(&harness).place_order(stop).await.unwrap();

    assert_eq!(leg.status, Some(OrderStatus::TriggerPending));
    assert_eq!(leg.average_price, dec!(0));
    assert_eq!(harness.broker.submits()[0].price, Some(dec!(133)));
}

#[tokio::test]
async fn test_rejected_order_is_fatal() {
    let harness = Harness::at(12, 30);
    let exec = executor(&harness);
    let placed = Leg {
        order_id: "42".to_string(),
        order_type: OrderType::Market,
        ..sell_call()
    };
    harness.broker.seed_order(theta_core::Order {
        order_id: "42".to_string(),
        exchange: "NFO".to_string(),
        trading_symbol: CALL.to_string(),
        product: Product::CarryForward,
        order_type: OrderType::Market,
        side: Side::Sell,
        quantity: 50,
        price: dec!(0),
        trigger_price: dec!(0),
        average_price: dec!(0),
        status: OrderStatus::Rejected,
        status_message: Some("margin exceeded".to_string()),
    });

    let err = exec.place_order(placed).await.unwrap_err();

    assert!(matches!(
        err.source,
        EngineError::UnexpectedStatus { status: OrderStatus::Rejected, .. }
    ));
    assert_eq!(err.leg.order_id, "42");
    assert_eq!(err.leg.status, Some(OrderStatus::Rejected));
    assert!(harness.broker.submits().is_empty());
}

#[tokio::test]
async fn test_cancel_of_unplaced_leg_is_a_no_op() {
    let harness = Harness::at(12, 30);
    let leg = executor(&harness).cancel_order(Leg::default()).await.unwrap();
    assert_eq!(leg, Leg::default());
    assert!(harness.broker.cancels().is_empty());
}

// ============================================
// De-noised prices
// ============================================

fn reader(broker: Arc<StubBroker>, samples: u32) -> PriceReader {
    let config = ExecutionConfig {
        price_samples: samples,
        ..ExecutionConfig::default()
    };
    PriceReader::new(broker, Arc::new(ManualClock::new(common::ist(12, 30))), &config)
}

#[tokio::test]
async fn test_price_jump_is_rejected() {
    let broker = Arc::new(StubBroker::nifty());
    broker.script_prices(&quote(CALL), &[dec!(100), dec!(100), dec!(126)]);

    let err = reader(broker, 2)
        .denoised_last_price(&quote(CALL), dec!(20))
        .await
        .unwrap_err();

    match err {
        EngineError::FreakPrice { from, to, .. } => {
            assert_eq!(from, dec!(100));
            assert_eq!(to, dec!(126));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_small_moves_return_last_sample() {
    let broker = Arc::new(StubBroker::nifty());
    broker.script_prices(
        &quote(CALL),
        &[dec!(100), dec!(103), dec!(105), dec!(104), dec!(106)],
    );

    let price = reader(broker, 4)
        .denoised_last_price(&quote(CALL), dec!(20))
        .await
        .unwrap();
    assert_eq!(price, dec!(106));
}

#[tokio::test]
async fn test_atm_strike_rounds_spot() {
    let broker = Arc::new(StubBroker::nifty());
    let strike = reader(broker, 0)
        .atm_strike(common::SPOT, dec!(50))
        .await
        .unwrap();
    assert_eq!(strike, dec!(19450));
}

// ============================================
// Instrument resolution
// ============================================

fn resolver(broker: Arc<StubBroker>) -> InstrumentResolver {
    InstrumentResolver::new(
        broker,
        Arc::new(ManualClock::new(common::ist(12, 30))),
        RetryPolicy::default(),
    )
}

fn selection(expiry: ExpiryClass, option_type: OptionType) -> OptionSelection {
    OptionSelection {
        underlying: "NIFTY".to_string(),
        exchange: "NFO".to_string(),
        expiry,
        strike: dec!(19450),
        option_type,
    }
}

#[tokio::test]
async fn test_resolves_weekly_and_monthly_contracts() {
    let resolver = resolver(Arc::new(StubBroker::nifty()));

    let weekly = resolver
        .resolve(&selection(ExpiryClass::Weekly, OptionType::Put))
        .await
        .unwrap();
    assert_eq!(weekly.trading_symbol, PUT);
    assert_eq!(weekly.lot_size, 25);

    let monthly = resolver
        .resolve(&selection(ExpiryClass::Monthly(0), OptionType::Call))
        .await
        .unwrap();
    assert_eq!(monthly.trading_symbol, "NIFTY24OCT19450CE");

    let next = resolver
        .resolve(&selection(ExpiryClass::Monthly(1), OptionType::Call))
        .await
        .unwrap();
    assert_eq!(next.trading_symbol, "NIFTY24NOV19450CE");
}

#[tokio::test]
async fn test_unknown_strike_is_no_instrument() {
    let resolver = resolver(Arc::new(StubBroker::nifty()));
    let mut wanted = selection(ExpiryClass::Weekly, OptionType::Call);
    wanted.strike = dec!(30000);

    let err = resolver.resolve(&wanted).await.unwrap_err();
    assert!(matches!(err, EngineError::NoInstrument { .. }));
}

// ============================================
// Stop-loss watching
// ============================================

async fn placed_stop(harness: &Harness) -> Leg {
    let stop = Leg {
        side: Side::Buy,
        order_type: OrderType::StopLoss,
        trigger_price: dec!(128.7),
        price: dec!(133),
        ..sell_call()
    };
    executor(harness).place_order(stop).await.unwrap()
}

fn watcher(harness: &Harness, notifier: Arc<RecordingNotifier>) -> Watcher {
    Watcher::new(Arc::new(executor(harness)), notifier, "twelvethirty trade update")
}

#[tokio::test]
async fn test_pending_stop_is_unchanged() {
    let harness = Harness::at(13, 0);
    let stop = placed_stop(&harness).await;
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = watcher(&harness, notifier.clone()).watch(stop.clone()).await.unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.leg, stop);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_triggered_stop_is_chased_as_limit() {
    let harness = Harness::at(13, 0);
    let stop = placed_stop(&harness).await;
    harness
        .broker
        .set_status(&stop.order_id, OrderStatus::Open, dec!(0));
    let notifier = Arc::new(RecordingNotifier::default());
    let watcher = watcher(&harness, notifier.clone());

    let outcome = watcher.watch(stop.clone()).await.unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.leg.order_type, OrderType::Limit);
    assert_eq!(outcome.leg.order_id, stop.order_id);
    assert_eq!(outcome.leg.status, Some(OrderStatus::Complete));
    assert_eq!(outcome.leg.average_price, dec!(101));
    assert_eq!(harness.broker.modifies(), vec![stop.order_id.clone()]);
    assert_eq!(harness.broker.submits().len(), 1);
    assert_eq!(
        notifier.bodies(),
        vec![format!("Order {CALL} changed from TRIGGER PENDING to COMPLETE")]
    );

    let again = watcher.watch(outcome.leg.clone()).await.unwrap();
    assert!(!again.changed);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_filled_stop_records_fill_once() {
    let harness = Harness::at(13, 0);
    let stop = placed_stop(&harness).await;
    harness
        .broker
        .set_status(&stop.order_id, OrderStatus::Complete, dec!(130.5));
    let notifier = Arc::new(RecordingNotifier::default());
    let watcher = watcher(&harness, notifier.clone());

    let outcome = watcher.watch(stop).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.leg.status, Some(OrderStatus::Complete));
    assert_eq!(outcome.leg.average_price, dec!(130.5));

    let again = watcher.watch(outcome.leg).await.unwrap();
    assert!(!again.changed);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_cancelled_stop_is_reported_and_recorded() {
    let harness = Harness::at(13, 0);
    let stop = placed_stop(&harness).await;
    harness.broker.cancel_order(&stop.order_id).await.unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let watcher = watcher(&harness, notifier.clone());

    let outcome = watcher.watch(stop.clone()).await.unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.leg.status, Some(OrderStatus::Cancelled));
    assert_eq!(outcome.leg.order_id, stop.order_id);
    assert_eq!(
        notifier.bodies(),
        vec![format!("Order {CALL} changed from TRIGGER PENDING to CANCELLED")]
    );
    assert_eq!(harness.broker.submits().len(), 1);

    let again = watcher.watch(outcome.leg).await.unwrap();
    assert!(!again.changed);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_accepted_order_is_returned_when_confirmation_fails() {
    let harness = Harness::at(12, 30);
    harness.broker.break_order_book_after_next_submit();

    let err = executor(&harness).place_order(sell_call()).await.unwrap_err();

    assert_eq!(err.leg.order_id, "1000");
    assert!(err.leg.is_placed());
    assert!(matches!(err.source.root(), EngineError::Broker(_)));
    assert_eq!(harness.broker.submits().len(), 1);
}
