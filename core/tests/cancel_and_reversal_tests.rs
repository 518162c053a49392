// tests/cancel_and_reversal_tests.rs
mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use orderflow::carrier::ShipmentDirection;
use orderflow::model::{DiscountKind, OrderStatus, PaymentStatus, ReversalKind, ShippingStatus, TrackingEvent};
use orderflow::ports::{InventoryStore, PromoStore, ReversalStore};
use orderflow::{Fulfilment, OrderflowError};
use serial_test::serial;
use uuid::Uuid;

fn delivered_event(days_ago: i64) -> TrackingEvent {
  TrackingEvent {
    status: "DELIVERED".into(),
    location: Some("Pune".into()),
    at: Utc::now() - ChronoDuration::days(days_ago),
  }
}

async fn delivered_order(world: &World, service: &Fulfilment, days_ago: i64) -> Uuid {
  let intent = shipped_order(service).await;
  world.carrier.track_events.lock().push(delivered_event(days_ago));
  let order = service.refresh_tracking(intent.order_id).await.unwrap();
  assert_eq!(order.shipping_status, ShippingStatus::Delivered);
  intent.order_id
}

fn reason() -> String {
  "does not fit".to_string()
}

#[tokio::test]
#[serial]
async fn refresh_tracking_marks_delivery_at_the_event_time() {
  let world = World::new();
  let service = world.start(1);
  let intent = shipped_order(&service).await;

  // in transit: nothing changes
  world.carrier.track_events.lock().push(TrackingEvent {
    status: "In Transit".into(),
    location: Some("Mumbai hub".into()),
    at: Utc::now() - ChronoDuration::days(2),
  });
  let order = service.refresh_tracking(intent.order_id).await.unwrap();
  assert_eq!(order.shipping_status, ShippingStatus::Shipped);
  assert_eq!(order.shipment.events.len(), 1);

  let event = delivered_event(1);
  world.carrier.track_events.lock().push(event.clone());
  let order = service.refresh_tracking(intent.order_id).await.unwrap();
  assert_eq!(order.shipping_status, ShippingStatus::Delivered);
  assert_eq!(order.delivered_at, Some(event.at));

  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.events.len(), 2);
  assert_eq!(view.delivered_at, Some(event.at));
}

#[tokio::test]
#[serial]
async fn cancel_of_a_delivered_order_is_rejected() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_order(&world, &service, 1).await;
  let before = world.deps.orders.get(order_id).await.unwrap().unwrap();

  let err = service.cancel_order(order_id, "too late").await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));

  let after = world.deps.orders.get(order_id).await.unwrap().unwrap();
  assert_eq!(before, after);
  assert_eq!(count(&world.carrier.cancel_calls), 0);
  assert!(world.gateway.refunds.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn cancel_of_a_shipped_order_refunds_and_gives_everything_back() {
  let world = World::new();
  world.add_promo(
    "SAVE10",
    DiscountKind::Percentage {
      percent: d("10"),
      max_discount: None,
    },
    "0",
    5,
  );
  let service = world.start(1);
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("tee", "TEE-L", "L", 2)], Some("save10")))
    .await
    .unwrap();
  service.verify_payment(signed_callback(&intent, "pay_1")).await.unwrap();
  service.queue().wait_idle().await;
  assert_eq!(world.deps.inventory.stock("TEE-L").await.unwrap(), Some(8));
  assert_eq!(world.promos.get("SAVE10").await.unwrap().unwrap().current_uses, 1);

  let outcome = service.cancel_order(intent.order_id, "changed mind").await.unwrap();

  assert!(outcome.carrier_cancelled);
  assert_eq!(count(&world.carrier.cancel_calls), 1);
  let refund = outcome.refund.expect("paid order is refunded");
  assert_eq!(refund.amount, intent.amount);
  assert_eq!(world.gateway.refunds.lock().as_slice(), &[("pay_1".to_string(), intent.amount)]);

  let order = outcome.order;
  assert_eq!(order.shipping_status, ShippingStatus::Cancelled);
  assert_eq!(order.order_status, OrderStatus::Cancelled);
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert!(order.cancelled_at.is_some());
  assert_eq!(order.refunded_amount(), intent.amount);

  assert_eq!(world.deps.inventory.stock("TEE-L").await.unwrap(), Some(10));
  assert_eq!(world.promos.get("SAVE10").await.unwrap().unwrap().current_uses, 0);

  // second cancel changes nothing
  let again = service.cancel_order(intent.order_id, "changed mind").await.unwrap();
  assert!(again.refund.is_none());
  assert!(!again.carrier_cancelled);
  assert_eq!(world.gateway.refunds.lock().len(), 1);
  assert_eq!(world.deps.inventory.stock("TEE-L").await.unwrap(), Some(10));
}

#[tokio::test]
#[serial]
async fn carrier_refusal_leaves_the_order_untouched() {
  let world = World::new();
  let service = world.start(1);
  let intent = shipped_order(&service).await;
  *world.carrier.cancel_accepted.lock() = Some(false);
  let before = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();

  let err = service.cancel_order(intent.order_id, "changed mind").await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));

  let after = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  assert_eq!(before, after);
  assert_eq!(after.shipping_status, ShippingStatus::Shipped);
  assert!(world.gateway.refunds.lock().is_empty());
  assert_eq!(world.deps.inventory.stock("TEE-L").await.unwrap(), Some(8));
}

#[tokio::test]
#[serial]
async fn cancel_of_an_unpaid_order_needs_no_refund() {
  let world = World::new();
  let service = world.start(1);
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("mug", "MUG", "", 1)], None))
    .await
    .unwrap();

  let outcome = service.cancel_order(intent.order_id, "abandoned").await.unwrap();
  assert!(outcome.refund.is_none());
  assert!(!outcome.carrier_cancelled);
  assert_eq!(outcome.order.payment_status, PaymentStatus::Failed);
  assert_eq!(outcome.order.shipping_status, ShippingStatus::Cancelled);

  // a late callback for it cannot revive the order
  let err = service.verify_payment(signed_callback(&intent, "pay_9")).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));
}

#[tokio::test]
#[serial]
async fn return_within_the_window_refunds_and_books_a_pickup() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_order(&world, &service, 2).await;
  let paid = world.deps.orders.get(order_id).await.unwrap().unwrap();

  let request = service
    .create_return(order_id, reason(), vec!["https://img.example/1.jpg".into()])
    .await
    .unwrap();

  assert!(request.rma.starts_with("RMA-"), "{}", request.rma);
  assert_eq!(request.kind, ReversalKind::Return);
  assert!(request.forward_shipment.is_none());
  assert!(!request.reverse_shipment.shipment_id.is_empty());

  let refund = request.refund.clone().expect("return is refunded");
  assert_eq!(refund.amount, paid.totals.total);
  let order = world.deps.orders.get(order_id).await.unwrap().unwrap();
  assert_eq!(order.refunded_amount(), paid.totals.total);
  // delivery stays the recorded state of the forward shipment
  assert_eq!(order.shipping_status, ShippingStatus::Delivered);

  let bookings = world.carrier.bookings.lock().clone();
  let reverse = bookings.last().unwrap();
  assert_eq!(reverse.direction, ShipmentDirection::Reverse);
  assert_eq!(reverse.reference, request.rma);
  assert_eq!(reverse.customer.pincode, "411001");
}

#[tokio::test]
#[serial]
async fn repeated_return_returns_the_request_on_file() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_order(&world, &service, 1).await;

  let first = service.create_return(order_id, reason(), Vec::new()).await.unwrap();
  let bookings = count(&world.carrier.create_calls);
  let second = service.create_return(order_id, reason(), Vec::new()).await.unwrap();

  assert_eq!(first, second);
  assert_eq!(count(&world.carrier.create_calls), bookings);
  assert_eq!(world.gateway.refunds.lock().len(), 1);
}

#[tokio::test]
#[serial]
async fn return_outside_the_window_is_rejected() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_order(&world, &service, 8).await;

  let err = service.create_return(order_id, reason(), Vec::new()).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(ref m) if m.contains("window")), "{err}");
  assert!(world.gateway.refunds.lock().is_empty());
}

#[tokio::test]
#[serial]
async fn return_before_delivery_is_rejected() {
  let world = World::new();
  let service = world.start(1);
  let intent = shipped_order(&service).await;

  let err = service.create_return(intent.order_id, reason(), Vec::new()).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));
}

#[tokio::test]
#[serial]
async fn reversal_input_is_validated() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_order(&world, &service, 1).await;

  let images: Vec<String> = (0..6).map(|i| format!("https://img.example/{i}.jpg")).collect();
  let err = service.create_return(order_id, reason(), images).await.unwrap_err();
  assert!(matches!(err, OrderflowError::Validation(_)));

  let err = service.create_return(order_id, "  ".into(), Vec::new()).await.unwrap_err();
  assert!(matches!(err, OrderflowError::Validation(_)));

  let err = service
    .create_exchange(order_id, String::new(), reason(), Vec::new())
    .await
    .unwrap_err();
  assert!(matches!(err, OrderflowError::Validation(_)));

  let err = service.create_return(Uuid::new_v4(), reason(), Vec::new()).await.unwrap_err();
  assert!(matches!(err, OrderflowError::NotFound(_)));
}

#[tokio::test]
#[serial]
async fn exchange_books_a_replacement_in_the_new_size() {
  let world = World::new();
  let service = world.start(1);
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("tee", "TEE-L", "L", 2)], None))
    .await
    .unwrap();
  service.verify_payment(signed_callback(&intent, "pay_1")).await.unwrap();
  service.queue().wait_idle().await;
  world.carrier.track_events.lock().push(delivered_event(1));
  service.refresh_tracking(intent.order_id).await.unwrap();

  let request = service
    .create_exchange(intent.order_id, "M".into(), "too big".into(), Vec::new())
    .await
    .unwrap();

  assert_eq!(request.kind, ReversalKind::Exchange { new_size: "M".into() });
  assert!(request.refund.is_none());
  let forward = request.forward_shipment.clone().expect("replacement booked");
  assert!(forward.tracking_code.is_some());

  assert_eq!(world.deps.inventory.stock("TEE-M").await.unwrap(), Some(8));
  assert!(world.gateway.refunds.lock().is_empty());

  let bookings = world.carrier.bookings.lock().clone();
  let replacement = bookings.last().unwrap();
  assert_eq!(replacement.direction, ShipmentDirection::Forward);
  assert_eq!(replacement.reference, format!("{}-X", request.rma));
  assert_eq!(replacement.items[0].sku, "TEE-M");
  assert_eq!(replacement.items[0].units, 2);
  // priced as originally paid, not at the M sale price
  assert_eq!(replacement.items[0].selling_price, d("499"));
}

#[tokio::test]
#[serial]
async fn exchange_to_a_missing_size_books_nothing() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_order(&world, &service, 1).await;
  let bookings = count(&world.carrier.create_calls);

  // neither item on this order comes in XL
  let err = service
    .create_exchange(order_id, "XL".into(), reason(), Vec::new())
    .await
    .unwrap_err();
  assert!(matches!(err, OrderflowError::LineItemUnavailable { .. }));
  assert_eq!(count(&world.carrier.create_calls), bookings);
}

#[tokio::test]
#[serial]
async fn cancel_retried_after_a_failed_save_refunds_once() {
  let world = World::new();
  world.add_promo(
    "SAVE10",
    DiscountKind::Percentage {
      percent: d("10"),
      max_discount: None,
    },
    "0",
    5,
  );
  let service = world.start(1);
  let mut intents = Vec::new();
  for payment_id in ["pay_1", "pay_2"] {
    let intent = service
      .create_order_intent(intent_request(vec![cart_line("tee", "TEE-L", "L", 1)], Some("SAVE10")))
      .await
      .unwrap();
    service.verify_payment(signed_callback(&intent, payment_id)).await.unwrap();
    service.queue().wait_idle().await;
    intents.push(intent);
  }
  assert_eq!(world.promos.get("SAVE10").await.unwrap().unwrap().current_uses, 2);
  let intent = &intents[0];

  // the refund is stored, the cancellation itself is not
  world.orders.script_saves([true, false]);
  let err = service.cancel_order(intent.order_id, "changed mind").await.unwrap_err();
  assert!(matches!(err, OrderflowError::Storage { .. }), "{err}");
  let stored = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  assert_eq!(stored.refunded_amount(), intent.amount);
  assert_ne!(stored.order_status, OrderStatus::Cancelled);

  let outcome = service.cancel_order(intent.order_id, "changed mind").await.unwrap();
  assert!(outcome.refund.is_none());
  assert_eq!(outcome.order.order_status, OrderStatus::Cancelled);
  assert_eq!(outcome.order.refunds.len(), 1);
  assert_eq!(world.gateway.refunds.lock().as_slice(), &[("pay_1".to_string(), intent.amount)]);

  assert_eq!(world.deps.inventory.stock("TEE-L").await.unwrap(), Some(9));
  assert_eq!(world.promos.get("SAVE10").await.unwrap().unwrap().current_uses, 1);
}

#[tokio::test]
#[serial]
async fn cancel_during_booking_waits_and_cancels_the_new_shipment() {
  let world = World::new();
  *world.carrier.create_delay.lock() = Some(std::time::Duration::from_millis(200));
  let service = world.start(1);
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("mug", "MUG", "", 1)], None))
    .await
    .unwrap();
  service.verify_payment(signed_callback(&intent, "pay_1")).await.unwrap();

  for _ in 0..200 {
    if count(&world.carrier.create_calls) >= 1 {
      break;
    }
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  }
  assert_eq!(count(&world.carrier.create_calls), 1);
  let mid_flight = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  assert_eq!(mid_flight.shipping_status, ShippingStatus::Processing);

  let outcome = service.cancel_order(intent.order_id, "changed mind").await.unwrap();
  service.queue().wait_idle().await;

  assert!(outcome.carrier_cancelled);
  assert_eq!(count(&world.carrier.cancel_calls), 1);
  assert_eq!(outcome.order.shipment.shipment_id.as_deref(), Some("ship-1"));
  assert_eq!(outcome.refund.map(|r| r.amount), Some(intent.amount));

  let order = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  assert_eq!(order.shipping_status, ShippingStatus::Cancelled);
  assert_eq!(order.order_status, OrderStatus::Cancelled);
  assert_eq!(count(&world.carrier.create_calls), 1);
  assert_eq!(world.deps.inventory.stock("MUG").await.unwrap(), Some(10));
}

async fn delivered_tee_order(world: &World, service: &Fulfilment) -> Uuid {
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("tee", "TEE-L", "L", 2)], None))
    .await
    .unwrap();
  service.verify_payment(signed_callback(&intent, "pay_1")).await.unwrap();
  service.queue().wait_idle().await;
  world.carrier.track_events.lock().push(delivered_event(1));
  service.refresh_tracking(intent.order_id).await.unwrap();
  intent.order_id
}

#[tokio::test]
#[serial]
async fn exchange_to_another_size_returns_the_request_on_file() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_tee_order(&world, &service).await;

  let first = service
    .create_exchange(order_id, "M".into(), "too big".into(), Vec::new())
    .await
    .unwrap();
  let bookings = count(&world.carrier.create_calls);
  let second = service
    .create_exchange(order_id, "S".into(), "still too big".into(), Vec::new())
    .await
    .unwrap();

  assert_eq!(first, second);
  assert_eq!(second.kind, ReversalKind::Exchange { new_size: "M".into() });
  assert_eq!(count(&world.carrier.create_calls), bookings);
  assert_eq!(world.deps.inventory.stock("TEE-M").await.unwrap(), Some(8));
  assert_eq!(world.deps.inventory.stock("TEE-S").await.unwrap(), Some(10));
  assert_eq!(world.reversals.list_for_order(order_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn return_after_an_exchange_is_rejected() {
  let world = World::new();
  let service = world.start(1);
  let order_id = delivered_tee_order(&world, &service).await;

  let exchange = service
    .create_exchange(order_id, "M".into(), "too big".into(), Vec::new())
    .await
    .unwrap();
  let bookings = count(&world.carrier.create_calls);

  let err = service.create_return(order_id, reason(), Vec::new()).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(ref m) if m.contains(&exchange.rma)), "{err}");

  assert!(world.gateway.refunds.lock().is_empty());
  assert_eq!(count(&world.carrier.create_calls), bookings);
  let order = world.deps.orders.get(order_id).await.unwrap().unwrap();
  assert_eq!(order.refunded_amount(), d("0"));
  assert_eq!(world.reversals.list_for_order(order_id).await.unwrap().len(), 1);
}
