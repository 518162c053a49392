// orderflow/src/pricing/mod.rs

//! Pure pricing: per-variant effective price, cart totals and promo evaluation.
//! Nothing here performs I/O, so the same inputs always give the same totals.

pub mod price;
pub mod promo;
pub mod totals;

pub use price::{derive_effective_price, validate_client_price, ClientPriceCheck, EffectivePrice};
pub use promo::{evaluate_promo, PromoCart, PromoOutcome};
pub use totals::{calculate_totals, subtotal_of, totals_match, PricingPolicy};
