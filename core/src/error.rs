// orderflow/src/error.rs
use crate::flow::FlowError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderflowError {
  #[error("Validation error: {0}")]
  Validation(String),

  #[error(
    "Line item unavailable: sku '{requested_sku}' size '{requested_size}' (available sizes: {available_sizes:?}, skus: {available_skus:?})"
  )]
  LineItemUnavailable {
    item_id: String,
    requested_sku: String,
    requested_size: String,
    available_sizes: Vec<String>,
    available_skus: Vec<String>,
  },

  #[error("No valid price for sku '{sku}'")]
  NoValidPrice { sku: String },

  #[error("Promo code '{code}' cannot be applied: {reason}")]
  PromoInvalid { code: String, reason: String },

  #[error("Payment signature mismatch for gateway order '{gateway_order_id}'")]
  SignatureMismatch { gateway_order_id: String },

  #[error("Insufficient stock for sku '{sku}': requested {requested}, available {available}")]
  InsufficientStock { sku: String, requested: u32, available: u32 },

  #[error("Carrier authentication failed: {0}")]
  CarrierAuth(String),

  /// Account-level rejection from the carrier. Retrying will not help until an
  /// operator fixes the account.
  #[error("Carrier permission denied: {message}. {remediation}")]
  CarrierPermission { message: String, remediation: String },

  #[error("No courier services pickup {pickup_pincode} -> delivery {delivery_pincode}")]
  CarrierServiceability {
    pickup_pincode: String,
    delivery_pincode: String,
  },

  #[error("Carrier request failed with status {status}: {message}")]
  CarrierRequest { status: u16, message: String },

  #[error("Carrier call '{operation}' timed out")]
  CarrierTimeout { operation: String },

  #[error("Carrier transport error: {0}")]
  CarrierTransport(String),

  #[error("Gateway error: {0}")]
  Gateway(String),

  #[error("Gateway refund of {amount} for payment '{payment_id}' failed: {message}")]
  GatewayRefund {
    payment_id: String,
    amount: Decimal,
    message: String,
  },

  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Precondition failed: {0}")]
  PreconditionFailed(String),

  #[error("Storage error: {source}")]
  Storage {
    #[source]
    source: anyhow::Error,
  },

  #[error("Pipeline error: {0}")]
  Flow(#[from] FlowError),
}

impl OrderflowError {
  pub fn storage(source: impl Into<anyhow::Error>) -> Self {
    OrderflowError::Storage { source: source.into() }
  }

  /// Whether a carrier failure is worth another attempt within the same call.
  /// Timeouts, transport errors, 429 and 5xx are; permission and other 4xx are not.
  pub fn is_retryable(&self) -> bool {
    match self {
      OrderflowError::CarrierTimeout { .. } | OrderflowError::CarrierTransport(_) => true,
      OrderflowError::CarrierRequest { status, .. } => *status == 429 || *status >= 500,
      _ => false,
    }
  }

  /// A 401 from the carrier: the cached token is stale.
  pub fn is_carrier_unauthorized(&self) -> bool {
    matches!(self, OrderflowError::CarrierRequest { status: 401, .. })
  }
}

pub type Result<T, E = OrderflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retryability_follows_status_class() {
    let req = |status| OrderflowError::CarrierRequest { status, message: String::new() };
    assert!(req(500).is_retryable());
    assert!(req(503).is_retryable());
    assert!(req(429).is_retryable());
    assert!(!req(400).is_retryable());
    assert!(!req(401).is_retryable());
    assert!(req(401).is_carrier_unauthorized());
    assert!(OrderflowError::CarrierTimeout { operation: "track".into() }.is_retryable());
    assert!(!OrderflowError::CarrierPermission {
      message: "blocked".into(),
      remediation: String::new()
    }
    .is_retryable());
  }
}
