// tests/shipment_tests.rs
mod common;

use common::*;
use orderflow::carrier::{CarrierSession, CourierOption, ServiceabilityQuery};
use orderflow::model::{PaymentStatus, ShippingStatus};
use orderflow::shipment::ShipmentOrchestrator;
use orderflow::{OrderflowError, ShipmentQueue};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

async fn paid_order(service: &orderflow::Fulfilment) -> orderflow::OrderIntent {
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("tee", "TEE-L", "L", 2)], None))
    .await
    .unwrap();
  service.verify_payment(signed_callback(&intent, "pay_1")).await.unwrap();
  service.queue().wait_idle().await;
  intent
}

#[tokio::test]
#[serial]
async fn paid_order_is_booked_in_the_background() {
  setup_tracing();
  let world = World::new();
  let service = world.start(2);

  let intent = paid_order(&service).await;
  let view = service.shipping_status(intent.order_id).await.unwrap();

  assert_eq!(view.payment_status, PaymentStatus::Paid);
  assert_eq!(view.shipping_status, ShippingStatus::Shipped);
  assert_eq!(view.shipment_id.as_deref(), Some("ship-1"));
  assert_eq!(view.tracking_code.as_deref(), Some("AWB-ship-1"));
  assert_eq!(view.tracking_url.as_deref(), Some("https://track.example/AWB-ship-1"));
  assert_eq!(view.courier_name.as_deref(), Some("Budget Post"));
  assert!(view.shipping_error.is_empty());
  assert_eq!(view.attempts, 1);
  assert!(view.shipped_at.is_some());

  // cheapest courier went into the booking, with the package weight of two 0.3 kg tees
  let booking = world.carrier.bookings.lock()[0].clone();
  assert_eq!(booking.courier_id, Some(3));
  assert_eq!(booking.package.weight_kg, d("0.6"));
  assert_eq!(booking.pickup_pincode, "110001");
}

#[tokio::test]
#[serial]
async fn a_401_refreshes_the_token_once_and_retries_the_call_once() {
  let world = World::new();
  let service = world.start(1);

  // warm the token, then have the carrier revoke it
  world.deps.carrier.tokens().get().await.unwrap();
  world.carrier.revoke_current_token();
  assert_eq!(count(&world.carrier.auth_calls), 1);

  let intent = paid_order(&service).await;
  let order = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  assert_eq!(order.shipping_status, ShippingStatus::Shipped);
  assert_eq!(count(&world.carrier.auth_calls), 2);
  // serviceability hit the 401 and was repeated once; later calls used the new token
  assert_eq!(count(&world.carrier.serviceability_calls), 2);
  assert_eq!(count(&world.carrier.create_calls), 1);
}

#[tokio::test]
#[serial]
async fn persistent_401_surfaces_as_auth_error_after_one_refresh() {
  let world = World::new();
  let session = CarrierSession::new(world.carrier.clone(), test_carrier_policy());
  let carrier = world.carrier.clone();

  let query = ServiceabilityQuery {
    pickup_pincode: "110001".into(),
    delivery_pincode: "411001".into(),
    weight_kg: d("0.5"),
    reverse: false,
  };
  // revoke every token the fake will hand out in this test
  for n in 1..=3 {
    carrier.revoked.lock().insert(format!("tok-{n}"));
  }
  let err = session.check_serviceability(&query).await.unwrap_err();
  assert!(matches!(err, OrderflowError::CarrierAuth(_)));
  assert_eq!(count(&carrier.auth_calls), 2);
  assert_eq!(count(&carrier.serviceability_calls), 2);
}

#[tokio::test]
#[serial]
async fn concurrent_token_requests_authenticate_once() {
  let world = World::new();
  *world.carrier.auth_delay.lock() = Some(Duration::from_millis(20));
  let session = Arc::new(CarrierSession::new(world.carrier.clone(), test_carrier_policy()));

  let mut handles = Vec::new();
  for _ in 0..8 {
    let session = session.clone();
    handles.push(tokio::spawn(async move { session.tokens().get().await.unwrap() }));
  }
  for h in handles {
    assert_eq!(h.await.unwrap(), "tok-1");
  }
  assert_eq!(count(&world.carrier.auth_calls), 1);
}

#[tokio::test]
#[serial]
async fn transient_failures_are_retried_within_the_call() {
  let world = World::new();
  world.carrier.fail_next_create([carrier_status(503), OrderflowError::CarrierTransport("reset".into())]);
  let service = world.start(1);

  let intent = paid_order(&service).await;
  let order = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  assert_eq!(order.shipping_status, ShippingStatus::Shipped);
  assert_eq!(count(&world.carrier.create_calls), 3);
}

#[tokio::test]
#[serial]
async fn permission_denied_is_recorded_with_remediation() {
  let world = World::new();
  world.carrier.fail_next_create([carrier_status(403)]);
  let service = world.start(1);

  let intent = paid_order(&service).await;
  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::PermissionDenied);
  assert!(view.shipping_error.contains("ACME-42"), "{}", view.shipping_error);
  assert!(view.shipping_error.contains("kyc@carrier.example"));
  // not retried: 403 is account level
  assert_eq!(count(&world.carrier.create_calls), 1);

  let err = service.retry_shipping(intent.order_id).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));
}

#[tokio::test]
#[serial]
async fn booking_rejection_is_failed_and_retry_books_again() {
  let world = World::new();
  world.carrier.fail_next_create([carrier_status(422)]);
  let service = world.start(1);

  let intent = paid_order(&service).await;
  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::Failed);
  assert!(view.shipping_error.contains("422"));
  assert!(view.shipment_id.is_none());

  let retried = service.retry_shipping(intent.order_id).await.unwrap();
  assert_eq!(retried.shipping_status, ShippingStatus::Retrying);
  assert!(retried.shipping_error.is_empty());
  service.queue().wait_idle().await;

  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::Shipped);
  assert_eq!(view.attempts, 2);
}

#[tokio::test]
#[serial]
async fn tracking_failure_keeps_the_shipment_and_retry_reuses_it() {
  let world = World::new();
  world.carrier.fail_next_assign([carrier_status(400)]);
  let service = world.start(1);

  let intent = paid_order(&service).await;
  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::AwbFailed);
  assert_eq!(view.shipment_id.as_deref(), Some("ship-1"));
  assert!(view.tracking_code.is_none());

  service.retry_shipping(intent.order_id).await.unwrap();
  service.queue().wait_idle().await;

  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::Shipped);
  assert_eq!(view.tracking_code.as_deref(), Some("AWB-ship-1"));
  // no second booking at the carrier
  assert_eq!(count(&world.carrier.create_calls), 1);
  assert_eq!(count(&world.carrier.assign_calls), 2);
}

#[tokio::test]
#[serial]
async fn unserviceable_pincode_fails_the_attempt() {
  let world = World::new();
  *world.carrier.couriers.lock() = Some(Vec::<CourierOption>::new());
  let service = world.start(1);

  let intent = paid_order(&service).await;
  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::Failed);
  assert!(view.shipping_error.contains("411001"));
  assert_eq!(count(&world.carrier.create_calls), 0);
}

#[tokio::test]
#[serial]
async fn retry_is_rejected_for_shipped_delivered_and_cancelled() {
  let world = World::new();
  let service = world.start(1);

  let shipped = paid_order(&service).await;
  let err = service.retry_shipping(shipped.order_id).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));

  world.carrier.track_events.lock().push(orderflow::model::TrackingEvent {
    status: "Delivered".into(),
    location: Some("Pune".into()),
    at: chrono::Utc::now(),
  });
  service.refresh_tracking(shipped.order_id).await.unwrap();
  let err = service.retry_shipping(shipped.order_id).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));

  let unpaid = service
    .create_order_intent(intent_request(vec![cart_line("mug", "MUG", "", 1)], None))
    .await
    .unwrap();
  service.cancel_order(unpaid.order_id, "changed mind").await.unwrap();
  let err = service.retry_shipping(unpaid.order_id).await.unwrap_err();
  assert!(matches!(err, OrderflowError::PreconditionFailed(_)));
}

#[tokio::test]
#[serial]
async fn retry_is_accepted_from_pending() {
  let world = World::new();
  let service = world.start(1);
  let intent = service
    .create_order_intent(intent_request(vec![cart_line("mug", "MUG", "", 1)], None))
    .await
    .unwrap();

  // paid, but the job never ran (e.g. the process died before it was queued)
  let mut order = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
  order.payment_status = PaymentStatus::Paid;
  world.deps.orders.save(&order).await.unwrap();

  let retried = service.retry_shipping(intent.order_id).await.unwrap();
  assert_eq!(retried.shipping_status, ShippingStatus::Retrying);
  service.queue().wait_idle().await;
  let view = service.shipping_status(intent.order_id).await.unwrap();
  assert_eq!(view.shipping_status, ShippingStatus::Shipped);
}

#[tokio::test]
#[serial]
async fn recovery_requeues_orders_left_mid_flight() {
  let world = World::new();
  let intents = {
    // first process: payments land in the store but no job is ever queued
    let service = world.start(1);
    let mut intents = Vec::new();
    for _ in 0..3 {
      let intent = service
        .create_order_intent(intent_request(vec![cart_line("mug", "MUG", "", 1)], None))
        .await
        .unwrap();
      intents.push(intent);
    }
    for (i, intent) in intents.iter().enumerate() {
      let mut order = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
      order.payment_status = PaymentStatus::Paid;
      order.gateway_payment_id = Some(format!("pay_{i}"));
      if i == 1 {
        // crashed halfway through an attempt
        order.shipping_status = ShippingStatus::Processing;
        order.shipment.attempts = 1;
      }
      world.deps.orders.save(&order).await.unwrap();
    }
    intents
  };

  let (queue, _handles) = ShipmentQueue::start(world.deps.clone(), Arc::new(ShipmentOrchestrator::new()), 2);
  assert_eq!(queue.recover(&world.deps).await.unwrap(), 3);
  queue.wait_idle().await;

  for intent in &intents {
    let order = world.deps.orders.get(intent.order_id).await.unwrap().unwrap();
    assert_eq!(order.shipping_status, ShippingStatus::Shipped);
  }
  let crashed = world.deps.orders.get(intents[1].order_id).await.unwrap().unwrap();
  assert_eq!(crashed.shipment.attempts, 2);
  assert_eq!(count(&world.carrier.create_calls), 3);
}
