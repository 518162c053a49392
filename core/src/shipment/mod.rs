// orderflow/src/shipment/mod.rs

//! Forward shipment lifecycle: the booking pipeline, the worker queue that runs
//! it, and the operator/customer controls (retry, cancel, tracking, status).

pub mod control;
pub mod orchestrator;
pub mod queue;
pub mod tracking;

pub use control::{cancel_order, retry_shipping, CancelOutcome};
pub use orchestrator::ShipmentOrchestrator;
pub use queue::ShipmentQueue;
pub use tracking::{refresh_tracking, shipping_status, ShippingStatusView};
