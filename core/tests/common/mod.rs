// tests/common/mod.rs
#![allow(dead_code)] // not every test binary uses every helper

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use orderflow::carrier::{BookingPayload, CarrierToken, CourierOption, ServiceabilityQuery, TrackingAssignment};
use orderflow::memory::{MemoryCatalog, MemoryInventory, MemoryOrders, MemoryPromos, MemoryReversals};
use orderflow::model::{
  Address, CatalogItem, DiscountKind, ItemVisibility, Order, PromoCode, ShippingStatus, SizeVariant, TrackingEvent,
};
use orderflow::ports::{CarrierClient, GatewayIntent, OrderStore, PaymentGateway};
use orderflow::signature::{sign_payment, verify_payment_signature};
use orderflow::{
  CarrierPolicy, CarrierSession, CartLine, Collaborators, Fulfilment, OrderIntent, OrderIntentRequest, OrderLocks,
  OrderflowError, PaymentCallback, Result, Settings,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

pub const GATEWAY_SECRET: &str = "test-gateway-secret";

pub fn d(s: &str) -> Decimal {
  s.parse().unwrap()
}

// --- Fake payment gateway ---

#[derive(Default)]
pub struct FakeGateway {
  pub intents: AtomicUsize,
  pub refunds: Mutex<Vec<(String, Decimal)>>,
  pub fail_refunds: Mutex<bool>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
  async fn create_intent(&self, amount: Decimal, currency: &str, _receipt: &str) -> Result<GatewayIntent> {
    let n = self.intents.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(GatewayIntent {
      gateway_order_id: format!("gw_order_{n}"),
      amount,
      currency: currency.to_string(),
    })
  }

  fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
    verify_payment_signature(GATEWAY_SECRET, gateway_order_id, payment_id, signature)
  }

  async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<String> {
    if *self.fail_refunds.lock() {
      return Err(OrderflowError::Gateway("refund declined".into()));
    }
    let mut refunds = self.refunds.lock();
    refunds.push((payment_id.to_string(), amount));
    Ok(format!("rfnd_{}", refunds.len()))
  }
}

// --- Fake carrier aggregator ---

pub fn carrier_status(status: u16) -> OrderflowError {
  OrderflowError::CarrierRequest {
    status,
    message: format!("scripted {status}"),
  }
}

/// Answers every call successfully unless a failure was scripted for that
/// operation. Tokens listed in `revoked` get a 401 on any call.
#[derive(Default)]
pub struct FakeCarrier {
  pub auth_calls: AtomicUsize,
  pub serviceability_calls: AtomicUsize,
  pub create_calls: AtomicUsize,
  pub assign_calls: AtomicUsize,
  pub cancel_calls: AtomicUsize,
  pub track_calls: AtomicUsize,
  pub revoked: Mutex<HashSet<String>>,
  pub auth_delay: Mutex<Option<Duration>>,
  pub create_delay: Mutex<Option<Duration>>,
  pub create_script: Mutex<VecDeque<OrderflowError>>,
  pub assign_script: Mutex<VecDeque<OrderflowError>>,
  pub couriers: Mutex<Option<Vec<CourierOption>>>,
  pub cancel_accepted: Mutex<Option<bool>>,
  pub track_events: Mutex<Vec<TrackingEvent>>,
  pub bookings: Mutex<Vec<BookingPayload>>,
}

impl FakeCarrier {
  fn check_token(&self, token: &str) -> Result<()> {
    if self.revoked.lock().contains(token) {
      return Err(carrier_status(401));
    }
    Ok(())
  }

  pub fn current_token(&self) -> String {
    format!("tok-{}", self.auth_calls.load(Ordering::SeqCst))
  }

  pub fn revoke_current_token(&self) {
    let token = self.current_token();
    self.revoked.lock().insert(token);
  }

  pub fn fail_next_create(&self, errors: impl IntoIterator<Item = OrderflowError>) {
    self.create_script.lock().extend(errors);
  }

  pub fn fail_next_assign(&self, errors: impl IntoIterator<Item = OrderflowError>) {
    self.assign_script.lock().extend(errors);
  }

}

pub fn count(counter: &AtomicUsize) -> usize {
  counter.load(Ordering::SeqCst)
}

#[async_trait]
impl CarrierClient for FakeCarrier {
  async fn authenticate(&self) -> Result<CarrierToken> {
    let delay = *self.auth_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    let n = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(CarrierToken {
      token: format!("tok-{n}"),
      expires_in: None,
    })
  }

  async fn check_serviceability(&self, token: &str, _query: &ServiceabilityQuery) -> Result<Vec<CourierOption>> {
    self.serviceability_calls.fetch_add(1, Ordering::SeqCst);
    self.check_token(token)?;
    let scripted = self.couriers.lock().clone();
    Ok(scripted.unwrap_or_else(|| {
      vec![
        CourierOption {
          courier_id: 7,
          courier_name: "Swift Express".into(),
          rate: d("95.00"),
          estimated_days: Some(4),
        },
        CourierOption {
          courier_id: 3,
          courier_name: "Budget Post".into(),
          rate: d("60.00"),
          estimated_days: Some(6),
        },
      ]
    }))
  }

  async fn create_shipment(&self, token: &str, payload: &BookingPayload) -> Result<String> {
    let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = *self.create_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    self.check_token(token)?;
    if let Some(err) = self.create_script.lock().pop_front() {
      return Err(err);
    }
    self.bookings.lock().push(payload.clone());
    Ok(format!("ship-{n}"))
  }

  async fn assign_tracking(&self, token: &str, shipment_id: &str, courier_id: Option<u64>) -> Result<TrackingAssignment> {
    self.assign_calls.fetch_add(1, Ordering::SeqCst);
    self.check_token(token)?;
    if let Some(err) = self.assign_script.lock().pop_front() {
      return Err(err);
    }
    Ok(TrackingAssignment {
      tracking_code: format!("AWB-{shipment_id}"),
      courier_name: "Budget Post".into(),
      courier_id,
      freight_charge: d("60.00"),
      expected_delivery: Some((Utc::now() + ChronoDuration::days(6)).date_naive()),
    })
  }

  async fn cancel_shipment(&self, token: &str, _shipment_id: &str) -> Result<bool> {
    self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    self.check_token(token)?;
    Ok(self.cancel_accepted.lock().unwrap_or(true))
  }

  async fn track(&self, token: &str, _tracking_code: &str) -> Result<Vec<TrackingEvent>> {
    self.track_calls.fetch_add(1, Ordering::SeqCst);
    self.check_token(token)?;
    Ok(self.track_events.lock().clone())
  }
}

// --- Order store with scripted save failures ---

/// Delegates to an in-memory store. Each queued outcome decides one upcoming
/// `save`: `true` lets it through, `false` fails it without writing.
#[derive(Default)]
pub struct ScriptedOrders {
  pub inner: MemoryOrders,
  pub save_outcomes: Mutex<VecDeque<bool>>,
}

impl ScriptedOrders {
  pub fn script_saves(&self, outcomes: impl IntoIterator<Item = bool>) {
    self.save_outcomes.lock().extend(outcomes);
  }
}

#[async_trait]
impl OrderStore for ScriptedOrders {
  async fn insert(&self, order: &Order) -> Result<()> {
    self.inner.insert(order).await
  }

  async fn get(&self, order_id: Uuid) -> Result<Option<Order>> {
    self.inner.get(order_id).await
  }

  async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Order>> {
    self.inner.find_by_gateway_order(gateway_order_id).await
  }

  async fn save(&self, order: &Order) -> Result<()> {
    let allowed = self.save_outcomes.lock().pop_front().unwrap_or(true);
    if !allowed {
      return Err(OrderflowError::storage(anyhow::anyhow!("scripted save failure for order {}", order.id)));
    }
    self.inner.save(order).await
  }

  async fn list_paid_by_shipping_status(&self, statuses: &[ShippingStatus]) -> Result<Vec<Order>> {
    self.inner.list_paid_by_shipping_status(statuses).await
  }
}

// --- Test world ---

pub struct World {
  pub catalog: Arc<MemoryCatalog>,
  pub inventory: Arc<MemoryInventory>,
  pub orders: Arc<ScriptedOrders>,
  pub promos: Arc<MemoryPromos>,
  pub reversals: Arc<MemoryReversals>,
  pub gateway: Arc<FakeGateway>,
  pub carrier: Arc<FakeCarrier>,
  pub deps: Collaborators,
}

pub fn test_carrier_policy() -> CarrierPolicy {
  CarrierPolicy {
    call_timeout: Duration::from_secs(2),
    max_attempts: 3,
    backoff: Duration::from_millis(1),
    company_id: "ACME-42".into(),
    support_contact: "kyc@carrier.example".into(),
    ..CarrierPolicy::default()
  }
}

impl World {
  pub fn new() -> Self {
    Self::with_settings(Settings::default())
  }

  pub fn with_settings(settings: Settings) -> Self {
    let catalog = Arc::new(MemoryCatalog::new());
    let inventory = Arc::new(MemoryInventory::new());
    let orders = Arc::new(ScriptedOrders::default());
    let promos = Arc::new(MemoryPromos::new());
    let reversals = Arc::new(MemoryReversals::new());
    let gateway = Arc::new(FakeGateway::default());
    let carrier = Arc::new(FakeCarrier::default());

    let deps = Collaborators {
      catalog: catalog.clone(),
      inventory: inventory.clone(),
      orders: orders.clone(),
      promos: promos.clone(),
      reversals: reversals.clone(),
      gateway: gateway.clone(),
      carrier: Arc::new(CarrierSession::new(carrier.clone(), test_carrier_policy())),
      locks: OrderLocks::new(),
      settings: Arc::new(settings),
    };

    let world = Self {
      catalog,
      inventory,
      orders,
      promos,
      reversals,
      gateway,
      carrier,
      deps,
    };
    world.seed_catalog();
    world
  }

  /// `tee`: S/M/L at 499 (sale 399 on M). `mug`: one size at 250. `hoodie`: draft.
  fn seed_catalog(&self) {
    let variant = |size: &str, sku: &str, regular: &str, sale: &str, stock: u32| SizeVariant {
      size: size.into(),
      sku: sku.into(),
      regular_price: d(regular),
      sale_price: d(sale),
      stock,
      weight_kg: Some(d("0.3")),
      dims: None,
    };
    self.catalog.put(CatalogItem {
      id: "tee".into(),
      name: "Logo Tee".into(),
      visibility: ItemVisibility::Published,
      sizes: vec![
        variant("S", "TEE-S", "499", "0", 10),
        variant("M", "TEE-M", "499", "399", 10),
        variant("L", "TEE-L", "499", "0", 10),
      ],
    });
    self.catalog.put(CatalogItem {
      id: "mug".into(),
      name: "Mug".into(),
      visibility: ItemVisibility::Published,
      sizes: vec![variant("OS", "MUG", "250", "0", 10)],
    });
    self.catalog.put(CatalogItem {
      id: "hoodie".into(),
      name: "Hoodie".into(),
      visibility: ItemVisibility::Draft,
      sizes: vec![variant("M", "HOOD-M", "1500", "0", 10)],
    });
    for sku in ["TEE-S", "TEE-M", "TEE-L", "MUG", "HOOD-M"] {
      self.inventory.set_stock(sku, 10);
    }
  }

  pub fn add_promo(&self, code: &str, kind: DiscountKind, min_order_value: &str, max_uses: u32) {
    let now = Utc::now();
    self.promos.put(PromoCode {
      code: code.into(),
      kind,
      active: true,
      starts_at: now - ChronoDuration::days(1),
      ends_at: now + ChronoDuration::days(30),
      max_uses,
      current_uses: 0,
      min_order_value: d(min_order_value),
    });
  }

  pub fn start(&self, workers: usize) -> Fulfilment {
    let (service, _handles) = Fulfilment::start(self.deps.clone(), workers);
    service
  }
}

pub fn address() -> Address {
  Address {
    name: "Asha Rao".into(),
    phone: "9800000000".into(),
    email: "asha@example.com".into(),
    line1: "12 Lake Road".into(),
    line2: String::new(),
    city: "Pune".into(),
    state: "MH".into(),
    pincode: "411001".into(),
    country: "India".into(),
  }
}

pub fn cart_line(item_id: &str, sku: &str, size: &str, quantity: u32) -> CartLine {
  CartLine {
    item_id: item_id.into(),
    sku: sku.into(),
    size: size.into(),
    quantity,
    client_price: None,
  }
}

pub fn intent_request(lines: Vec<CartLine>, promo: Option<&str>) -> OrderIntentRequest {
  OrderIntentRequest {
    customer_id: "cust-1".into(),
    lines,
    address: address(),
    promo_code: promo.map(str::to_string),
  }
}

pub fn signed_callback(intent: &OrderIntent, payment_id: &str) -> PaymentCallback {
  PaymentCallback {
    gateway_order_id: intent.gateway_order_id.clone(),
    payment_id: payment_id.into(),
    signature: sign_payment(GATEWAY_SECRET, &intent.gateway_order_id, payment_id),
  }
}

/// Creates an order for two L tees and one mug, pays it, and waits for shipment.
pub async fn shipped_order(service: &Fulfilment) -> OrderIntent {
  let intent = service
    .create_order_intent(intent_request(
      vec![cart_line("tee", "TEE-L", "L", 2), cart_line("mug", "MUG", "", 1)],
      None,
    ))
    .await
    .unwrap();
  service.verify_payment(signed_callback(&intent, "pay_1")).await.unwrap();
  service.queue().wait_idle().await;
  intent
}

// --- Tracing setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
