// orderflow-server/src/services/payment_mock.rs

use async_trait::async_trait;
use orderflow::ports::{GatewayIntent, PaymentGateway};
use orderflow::signature::verify_payment_signature;
use orderflow::{OrderflowError, Result};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Stands in for the gateway when no credentials are configured. Callbacks are
/// verified against `secret`, so a client can sign them with the same value.
pub struct MockGateway {
  secret: String,
  latency: Duration,
}

impl MockGateway {
  pub const DEFAULT_SECRET: &'static str = "mock_gateway_secret";

  pub fn new(secret: impl Into<String>) -> Self {
    Self {
      secret: secret.into(),
      latency: Duration::from_millis(50),
    }
  }
}

impl Default for MockGateway {
  fn default() -> Self {
    Self::new(Self::DEFAULT_SECRET)
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  #[instrument(skip(self), fields(amount = %amount))]
  async fn create_intent(&self, amount: Decimal, currency: &str, receipt: &str) -> Result<GatewayIntent> {
    if amount <= Decimal::ZERO {
      return Err(OrderflowError::Gateway("Amount must be greater than zero".to_string()));
    }
    tokio::time::sleep(self.latency).await; // Simulate network latency

    let gateway_order_id = format!("mock_order_{}", Uuid::new_v4().simple());
    info!(gateway_order_id = %gateway_order_id, "Simulated gateway order.");
    Ok(GatewayIntent {
      gateway_order_id,
      amount,
      currency: currency.to_string(),
    })
  }

  fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
    verify_payment_signature(&self.secret, gateway_order_id, payment_id, signature)
  }

  #[instrument(skip(self), fields(amount = %amount))]
  async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<String> {
    tokio::time::sleep(self.latency).await;
    let refund_id = format!("mock_rfnd_{}", Uuid::new_v4().simple());
    info!(refund_id = %refund_id, "Simulated refund.");
    Ok(refund_id)
  }
}
