// orderflow/src/context.rs

//! The handles every pipeline needs. Cloned into each pipeline's context data,
//! the way request state travels through the step handlers.

use crate::carrier::{CarrierSession, PickupOrigin};
use crate::locks::OrderLocks;
use crate::ports::{CatalogStore, InventoryStore, OrderStore, PaymentGateway, PromoStore, ReversalStore};
use crate::pricing::PricingPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalPolicy {
  pub return_window_days: i64,
  pub max_images: usize,
}

impl Default for ReversalPolicy {
  fn default() -> Self {
    Self {
      return_window_days: 7,
      max_images: 5,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub pricing: PricingPolicy,
  pub origin: PickupOrigin,
  pub reversal: ReversalPolicy,
  /// `{code}` is replaced with the tracking code.
  pub tracking_url_template: String,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      pricing: PricingPolicy::default(),
      origin: PickupOrigin::default(),
      reversal: ReversalPolicy::default(),
      tracking_url_template: "https://track.example/{code}".to_string(),
    }
  }
}

impl Settings {
  pub fn tracking_url(&self, tracking_code: &str) -> String {
    self.tracking_url_template.replace("{code}", tracking_code)
  }
}

#[derive(Clone)]
pub struct Collaborators {
  pub catalog: Arc<dyn CatalogStore>,
  pub inventory: Arc<dyn InventoryStore>,
  pub orders: Arc<dyn OrderStore>,
  pub promos: Arc<dyn PromoStore>,
  pub reversals: Arc<dyn ReversalStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub carrier: Arc<CarrierSession>,
  pub locks: OrderLocks,
  pub settings: Arc<Settings>,
}

impl std::fmt::Debug for Collaborators {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Collaborators")
      .field("settings", &self.settings)
      .finish_non_exhaustive()
  }
}
