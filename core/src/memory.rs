// orderflow/src/memory.rs

//! In-process store implementations. Used by the test suite and by the server's
//! `memory` storage mode.

use crate::error::{OrderflowError, Result};
use crate::model::{CatalogItem, Order, PaymentStatus, PromoCode, ReversalRequest, ShippingStatus};
use crate::ports::{
  CatalogStore, CommitKey, CommitOutcome, InventoryStore, OrderStore, PromoStore, ReversalStore, StockLine,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryCatalog {
  items: Mutex<HashMap<String, CatalogItem>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn put(&self, item: CatalogItem) {
    self.items.lock().insert(item.id.clone(), item);
  }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
  async fn item(&self, item_id: &str) -> Result<Option<CatalogItem>> {
    Ok(self.items.lock().get(item_id).cloned())
  }
}

#[derive(Default)]
struct InventoryState {
  stock: HashMap<String, u32>,
  commits: HashMap<CommitKey, Vec<StockLine>>,
}

/// Stock counts plus the log of applied commits. One mutex covers both, so a
/// commit is checked and applied as a unit.
#[derive(Default)]
pub struct MemoryInventory {
  state: Mutex<InventoryState>,
}

impl MemoryInventory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_stock(&self, sku: &str, quantity: u32) {
    self.state.lock().stock.insert(sku.to_string(), quantity);
  }
}

/// Same SKU on several lines counts once with the summed quantity.
fn merge_lines(lines: &[StockLine]) -> BTreeMap<&str, u32> {
  let mut merged = BTreeMap::new();
  for line in lines {
    *merged.entry(line.sku.as_str()).or_insert(0u32) += line.quantity;
  }
  merged
}

#[async_trait]
impl InventoryStore for MemoryInventory {
  async fn stock(&self, sku: &str) -> Result<Option<u32>> {
    Ok(self.state.lock().stock.get(sku).copied())
  }

  async fn commit(&self, key: &CommitKey, lines: &[StockLine]) -> Result<CommitOutcome> {
    let mut state = self.state.lock();
    if state.commits.contains_key(key) {
      return Ok(CommitOutcome::AlreadyApplied);
    }

    let wanted = merge_lines(lines);
    // in line order, so the error names the first short SKU as the caller listed it
    for line in lines {
      let requested = wanted.get(line.sku.as_str()).copied().unwrap_or(line.quantity);
      let available = state.stock.get(&line.sku).copied().unwrap_or(0);
      if available < requested {
        return Err(OrderflowError::InsufficientStock {
          sku: line.sku.clone(),
          requested,
          available,
        });
      }
    }

    for (sku, quantity) in wanted {
      if let Some(stock) = state.stock.get_mut(sku) {
        *stock -= quantity;
      }
    }
    state.commits.insert(key.clone(), lines.to_vec());
    Ok(CommitOutcome::Applied)
  }

  async fn release(&self, key: &CommitKey) -> Result<bool> {
    let mut state = self.state.lock();
    let Some(lines) = state.commits.remove(key) else {
      return Ok(false);
    };
    for line in lines {
      *state.stock.entry(line.sku).or_insert(0) += line.quantity;
    }
    Ok(true)
  }
}

#[derive(Default)]
pub struct MemoryOrders {
  orders: Mutex<HashMap<Uuid, Order>>,
}

impl MemoryOrders {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl OrderStore for MemoryOrders {
  async fn insert(&self, order: &Order) -> Result<()> {
    let mut orders = self.orders.lock();
    if orders.contains_key(&order.id) {
      return Err(OrderflowError::storage(anyhow::anyhow!("order {} already exists", order.id)));
    }
    orders.insert(order.id, order.clone());
    Ok(())
  }

  async fn get(&self, order_id: Uuid) -> Result<Option<Order>> {
    Ok(self.orders.lock().get(&order_id).cloned())
  }

  async fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Order>> {
    Ok(
      self
        .orders
        .lock()
        .values()
        .find(|o| o.gateway_order_id == gateway_order_id)
        .cloned(),
    )
  }

  async fn save(&self, order: &Order) -> Result<()> {
    match self.orders.lock().get_mut(&order.id) {
      Some(slot) => {
        *slot = order.clone();
        Ok(())
      }
      None => Err(OrderflowError::NotFound(format!("order {}", order.id))),
    }
  }

  async fn list_paid_by_shipping_status(&self, statuses: &[ShippingStatus]) -> Result<Vec<Order>> {
    let mut found: Vec<Order> = self
      .orders
      .lock()
      .values()
      .filter(|o| o.payment_status == PaymentStatus::Paid && statuses.contains(&o.shipping_status))
      .cloned()
      .collect();
    found.sort_by_key(|o| o.created_at);
    Ok(found)
  }
}

#[derive(Default)]
pub struct MemoryPromos {
  promos: Mutex<HashMap<String, PromoCode>>,
}

impl MemoryPromos {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn put(&self, mut promo: PromoCode) {
    promo.code = PromoCode::normalize(&promo.code);
    self.promos.lock().insert(promo.code.clone(), promo);
  }
}

#[async_trait]
impl PromoStore for MemoryPromos {
  async fn get(&self, code: &str) -> Result<Option<PromoCode>> {
    Ok(self.promos.lock().get(&PromoCode::normalize(code)).cloned())
  }

  async fn try_increment_usage(&self, code: &str) -> Result<bool> {
    let mut promos = self.promos.lock();
    let promo = promos
      .get_mut(&PromoCode::normalize(code))
      .ok_or_else(|| OrderflowError::NotFound(format!("promo {code}")))?;
    if promo.usage_exhausted() {
      return Ok(false);
    }
    promo.current_uses += 1;
    Ok(true)
  }

  async fn decrement_usage(&self, code: &str) -> Result<()> {
    if let Some(promo) = self.promos.lock().get_mut(&PromoCode::normalize(code)) {
      promo.current_uses = promo.current_uses.saturating_sub(1);
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct MemoryReversals {
  requests: Mutex<Vec<ReversalRequest>>,
}

impl MemoryReversals {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ReversalStore for MemoryReversals {
  async fn insert(&self, request: &ReversalRequest) -> Result<()> {
    let mut requests = self.requests.lock();
    if requests.iter().any(|r| r.rma == request.rma) {
      return Err(OrderflowError::storage(anyhow::anyhow!("rma {} already exists", request.rma)));
    }
    requests.push(request.clone());
    Ok(())
  }

  async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<ReversalRequest>> {
    Ok(
      self
        .requests
        .lock()
        .iter()
        .filter(|r| r.order_id == order_id)
        .cloned()
        .collect(),
    )
  }
}
