// orderflow/src/locks.rs
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per order id. Everything that mutates an order's payment or
/// shipping fields holds the order's guard for the whole read-modify-write, so a
/// cancellation arriving mid-booking waits for the carrier call to finish.
#[derive(Clone, Default)]
pub struct OrderLocks {
  inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl OrderLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn acquire(&self, order_id: Uuid) -> OrderGuard {
    let lock = {
      let mut map = self.inner.lock();
      // drop entries nobody holds or waits on, so the map tracks live orders only
      if map.len() > 1024 {
        map.retain(|_, l| Arc::strong_count(l) > 1);
      }
      map.entry(order_id).or_default().clone()
    };
    OrderGuard {
      order_id,
      _guard: lock.lock_owned().await,
    }
  }

  /// Number of orders currently tracked. Mostly useful in tests.
  pub fn tracked(&self) -> usize {
    self.inner.lock().len()
  }
}

pub struct OrderGuard {
  order_id: Uuid,
  _guard: OwnedMutexGuard<()>,
}

impl OrderGuard {
  pub fn order_id(&self) -> Uuid {
    self.order_id
  }
}
