// orderflow/src/service.rs

//! `Fulfilment`: one handle over the pipelines and the shipment queue, exposing
//! the externally callable operations.

use crate::checkout::{OrderIntent, OrderIntentCreator, OrderIntentRequest};
use crate::context::Collaborators;
use crate::error::Result;
use crate::model::{Order, ReversalRequest};
use crate::payment::{self, PaymentCallback, PaymentConfirmation, PaymentVerifier};
use crate::reversal::{ReversalHandler, ReversalInput};
use crate::shipment::{self, CancelOutcome, ShipmentOrchestrator, ShipmentQueue, ShippingStatusView};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct Fulfilment {
  deps: Collaborators,
  intents: Arc<OrderIntentCreator>,
  payments: Arc<PaymentVerifier>,
  reversals: Arc<ReversalHandler>,
  queue: ShipmentQueue,
}

impl Fulfilment {
  /// Builds the pipelines and starts `workers` shipment workers.
  pub fn start(deps: Collaborators, workers: usize) -> (Self, Vec<JoinHandle<()>>) {
    let orchestrator = Arc::new(ShipmentOrchestrator::new());
    let (queue, handles) = ShipmentQueue::start(deps.clone(), orchestrator, workers);
    let service = Self {
      deps,
      intents: Arc::new(OrderIntentCreator::new()),
      payments: Arc::new(PaymentVerifier::new()),
      reversals: Arc::new(ReversalHandler::new()),
      queue,
    };
    (service, handles)
  }

  pub fn deps(&self) -> &Collaborators {
    &self.deps
  }

  pub fn queue(&self) -> &ShipmentQueue {
    &self.queue
  }

  pub async fn recover(&self) -> Result<usize> {
    self.queue.recover(&self.deps).await
  }

  pub async fn create_order_intent(&self, request: OrderIntentRequest) -> Result<OrderIntent> {
    self.intents.create(&self.deps, request).await
  }

  /// Verifies the callback and, for a newly paid order, queues its shipment.
  /// Never waits on the carrier.
  pub async fn verify_payment(&self, callback: PaymentCallback) -> Result<PaymentConfirmation> {
    let confirmation = self.payments.verify(&self.deps, callback).await?;
    if confirmation.needs_shipment() {
      let queued = self.queue.enqueue(confirmation.order_id);
      info!(order_id = %confirmation.order_id, queued, "Shipment scheduled.");
    }
    Ok(confirmation)
  }

  pub async fn mark_payment_failed(&self, gateway_order_id: &str, reason: &str) -> Result<Order> {
    payment::mark_payment_failed(&self.deps, gateway_order_id, reason).await
  }

  pub async fn shipping_status(&self, order_id: Uuid) -> Result<ShippingStatusView> {
    shipment::shipping_status(&self.deps, order_id).await
  }

  pub async fn retry_shipping(&self, order_id: Uuid) -> Result<Order> {
    shipment::retry_shipping(&self.deps, &self.queue, order_id).await
  }

  pub async fn refresh_tracking(&self, order_id: Uuid) -> Result<Order> {
    shipment::refresh_tracking(&self.deps, order_id).await
  }

  pub async fn cancel_order(&self, order_id: Uuid, reason: &str) -> Result<CancelOutcome> {
    shipment::cancel_order(&self.deps, order_id, reason).await
  }

  pub async fn create_return(&self, order_id: Uuid, reason: String, images: Vec<String>) -> Result<ReversalRequest> {
    self.reversals.create_return(&self.deps, order_id, reason, images).await
  }

  pub async fn create_exchange(
    &self,
    order_id: Uuid,
    new_size: String,
    reason: String,
    images: Vec<String>,
  ) -> Result<ReversalRequest> {
    self
      .reversals
      .create_exchange(&self.deps, order_id, new_size, reason, images)
      .await
  }

  pub async fn create_reversal(&self, input: ReversalInput) -> Result<ReversalRequest> {
    self.reversals.create(&self.deps, input).await
  }
}
