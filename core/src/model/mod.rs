// orderflow/src/model/mod.rs

//! Persisted shapes: catalog snapshots, the order aggregate, promo codes and
//! reversal requests.

pub mod catalog;
pub mod money;
pub mod order;
pub mod promo;
pub mod reversal;

pub use catalog::{CatalogItem, ItemVisibility, PackageDims, SizeVariant};
pub use order::{
  Address, Order, OrderLine, OrderStatus, OrderTotals, PaymentStatus, PriceType, Refund, ShipmentRecord,
  ShippingStatus, TrackingEvent,
};
pub use promo::{DiscountKind, PromoCode};
pub use reversal::{ReversalKind, ReversalRequest, ShipmentRef};
