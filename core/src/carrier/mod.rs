// orderflow/src/carrier/mod.rs

//! Everything between the shipment pipeline and the carrier aggregator:
//! request/response shapes, package sizing, the shared auth token, and the
//! timeout/retry policy wrapped around every call.

pub mod package;
pub mod session;
pub mod token;
pub mod types;

pub use package::{booking_payload, package_for};
pub use session::{CarrierPolicy, CarrierSession};
pub use token::TokenProvider;
pub use types::{
  BookingItem, BookingPayload, CarrierToken, CourierOption, Package, PickupOrigin, ServiceabilityQuery,
  ShipmentDirection, TrackingAssignment,
};
