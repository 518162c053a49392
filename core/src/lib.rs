// orderflow/src/lib.rs

//! Orderflow: the order fulfilment pipeline of an e-commerce backend.
//!
//! The path from a priced cart to a delivered (and possibly returned) order:
//!  - pure pricing: effective unit price, cart totals, promo evaluation;
//!  - order intent creation against the live catalog and a payment gateway;
//!  - payment verification with an idempotent, all-or-nothing stock commit;
//!  - asynchronous carrier booking on a worker queue, with retry and recovery;
//!  - cancellation, tracking refresh, and return/exchange reversal.
//!
//! Every multi-step operation is a named-step [`flow::Pipeline`] over shared
//! [`flow::ContextData`]. External systems sit behind the traits in [`ports`].

pub mod carrier;
pub mod checkout;
pub mod context;
pub mod error;
pub mod flow;
pub mod locks;
pub mod memory;
pub mod model;
pub mod payment;
pub mod ports;
pub mod pricing;
pub mod reversal;
pub mod service;
pub mod shipment;
pub mod signature;

// --- Re-exports for the public API ---

pub use crate::carrier::{CarrierPolicy, CarrierSession, PickupOrigin, TokenProvider};
pub use crate::checkout::{CartLine, OrderIntent, OrderIntentCreator, OrderIntentRequest};
pub use crate::context::{Collaborators, ReversalPolicy, Settings};
pub use crate::error::{OrderflowError, Result};
pub use crate::flow::{ContextData, Pipeline, PipelineControl, PipelineResult};
pub use crate::locks::OrderLocks;
pub use crate::payment::{PaymentCallback, PaymentConfirmation, PaymentVerifier};
pub use crate::pricing::PricingPolicy;
pub use crate::reversal::{ReversalHandler, ReversalInput};
pub use crate::service::Fulfilment;
pub use crate::shipment::{CancelOutcome, ShipmentOrchestrator, ShipmentQueue, ShippingStatusView};
