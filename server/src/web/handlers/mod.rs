// orderflow-server/src/web/handlers/mod.rs

pub mod order_handlers;
pub mod payment_handlers;
pub mod reversal_handlers;
pub mod shipping_handlers;
