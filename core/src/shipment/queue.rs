// orderflow/src/shipment/queue.rs
use super::orchestrator::ShipmentOrchestrator;
use crate::context::Collaborators;
use crate::error::Result;
use crate::model::ShippingStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

/// Shipping states a recovering process picks back up.
pub const RECOVERABLE: [ShippingStatus; 3] = [
  ShippingStatus::Pending,
  ShippingStatus::Processing,
  ShippingStatus::Retrying,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
  Queued,
  Running,
  /// Enqueued again while running; goes back on the queue when the run ends.
  RunningRequeued,
}

struct Jobs {
  states: Mutex<HashMap<Uuid, JobState>>,
  pending: watch::Sender<usize>,
}

impl Jobs {
  fn publish(&self, len: usize) {
    self.pending.send_replace(len);
  }
}

/// Shipment jobs keyed by order id, consumed by a fixed pool of workers.
///
/// An order is never queued twice. Enqueuing an order whose job is running
/// schedules exactly one more run after the current one finishes.
#[derive(Clone)]
pub struct ShipmentQueue {
  tx: mpsc::UnboundedSender<Uuid>,
  jobs: Arc<Jobs>,
}

impl ShipmentQueue {
  /// Spawns `workers` tasks on the current runtime. Workers exit once every
  /// queue handle has been dropped and the channel drained.
  pub fn start(
    deps: Collaborators,
    orchestrator: Arc<ShipmentOrchestrator>,
    workers: usize,
  ) -> (Self, Vec<JoinHandle<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (pending, _) = watch::channel(0usize);
    let jobs = Arc::new(Jobs {
      states: Mutex::new(HashMap::new()),
      pending,
    });
    let rx = Arc::new(AsyncMutex::new(rx));

    let handles = (0..workers.max(1))
      .map(|worker_id| {
        let worker = Worker {
          id: worker_id,
          rx: rx.clone(),
          requeue: tx.downgrade(),
          jobs: jobs.clone(),
          deps: deps.clone(),
          orchestrator: orchestrator.clone(),
        };
        tokio::spawn(worker.run())
      })
      .collect();

    info!(workers = workers.max(1), "Shipment workers started.");
    (Self { tx, jobs }, handles)
  }

  /// Returns false when the order already has a job waiting.
  pub fn enqueue(&self, order_id: Uuid) -> bool {
    let mut states = self.jobs.states.lock();
    let accepted = match states.get(&order_id).copied() {
      None => {
        if self.tx.send(order_id).is_err() {
          error!(order_id = %order_id, "Shipment queue is closed.");
          return false;
        }
        states.insert(order_id, JobState::Queued);
        true
      }
      Some(JobState::Running) => {
        states.insert(order_id, JobState::RunningRequeued);
        true
      }
      Some(JobState::Queued) | Some(JobState::RunningRequeued) => false,
    };
    self.jobs.publish(states.len());
    debug!(order_id = %order_id, accepted, "Shipment job enqueue.");
    accepted
  }

  /// Re-enqueues every paid order left mid-flight by a previous process.
  pub async fn recover(&self, deps: &Collaborators) -> Result<usize> {
    let orders = deps.orders.list_paid_by_shipping_status(&RECOVERABLE).await?;
    let mut queued = 0;
    for order in orders {
      if self.enqueue(order.id) {
        queued += 1;
      }
    }
    info!(queued, "Shipment recovery finished.");
    Ok(queued)
  }

  /// Jobs queued or running.
  pub fn in_flight(&self) -> usize {
    *self.jobs.pending.borrow()
  }

  /// Resolves once nothing is queued or running.
  pub async fn wait_idle(&self) {
    let mut rx = self.jobs.pending.subscribe();
    // the sender lives in `self.jobs`, so this cannot fail while we hold it
    let _ = rx.wait_for(|n| *n == 0).await;
  }
}

struct Worker {
  id: usize,
  rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Uuid>>>,
  requeue: mpsc::WeakUnboundedSender<Uuid>,
  jobs: Arc<Jobs>,
  deps: Collaborators,
  orchestrator: Arc<ShipmentOrchestrator>,
}

impl Worker {
  async fn run(self) {
    loop {
      let next = { self.rx.lock().await.recv().await };
      let Some(order_id) = next else {
        debug!(worker = self.id, "Shipment worker stopping.");
        return;
      };

      self.jobs.states.lock().insert(order_id, JobState::Running);
      let span = tracing::info_span!("shipment_job", worker = self.id, order_id = %order_id);
      match self.orchestrator.process(&self.deps, order_id).instrument(span).await {
        Ok(order) => debug!(order_id = %order_id, shipping_status = %order.shipping_status, "Shipment job done."),
        Err(e) => error!(order_id = %order_id, error = %e, "Shipment job failed."),
      }
      self.finish(order_id);
    }
  }

  fn finish(&self, order_id: Uuid) {
    let mut states = self.jobs.states.lock();
    if states.get(&order_id) == Some(&JobState::RunningRequeued) {
      let resent = self.requeue.upgrade().is_some_and(|tx| tx.send(order_id).is_ok());
      if resent {
        states.insert(order_id, JobState::Queued);
      } else {
        states.remove(&order_id);
      }
    } else {
      states.remove(&order_id);
    }
    self.jobs.publish(states.len());
  }
}
