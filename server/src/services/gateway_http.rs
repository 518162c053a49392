// orderflow-server/src/services/gateway_http.rs

use crate::config::GatewayConfig;
use async_trait::async_trait;
use orderflow::ports::{GatewayIntent, PaymentGateway};
use orderflow::signature::verify_payment_signature;
use orderflow::{OrderflowError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Payment gateway REST client. Amounts travel in minor units (paise, cents).
pub struct HttpGateway {
  client: reqwest::Client,
  config: GatewayConfig,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
  amount: i64,
  currency: &'a str,
  receipt: &'a str,
}

#[derive(Serialize)]
struct RefundBody {
  amount: i64,
}

#[derive(Deserialize)]
struct IdResponse {
  id: String,
}

fn minor_units(amount: Decimal) -> Result<i64> {
  (amount * Decimal::ONE_HUNDRED)
    .round()
    .to_i64()
    .ok_or_else(|| OrderflowError::Gateway(format!("amount {amount} cannot be sent to the gateway")))
}

fn gateway_err(e: reqwest::Error) -> OrderflowError {
  OrderflowError::Gateway(e.to_string())
}

impl HttpGateway {
  pub fn new(client: reqwest::Client, config: GatewayConfig) -> Self {
    Self { client, config }
  }

  async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<IdResponse> {
    let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
    let resp = self
      .client
      .post(url)
      .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
      .json(body)
      .send()
      .await
      .map_err(gateway_err)?;
    let status = resp.status();
    if !status.is_success() {
      let text = resp.text().await.unwrap_or_default();
      return Err(OrderflowError::Gateway(format!("{path} returned {status}: {text}")));
    }
    resp.json::<IdResponse>().await.map_err(gateway_err)
  }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
  #[instrument(skip(self), fields(amount = %amount))]
  async fn create_intent(&self, amount: Decimal, currency: &str, receipt: &str) -> Result<GatewayIntent> {
    let body = CreateOrderBody {
      amount: minor_units(amount)?,
      currency,
      receipt,
    };
    let created = self.post("/orders", &body).await?;
    info!(gateway_order_id = %created.id, "Gateway order created.");
    Ok(GatewayIntent {
      gateway_order_id: created.id,
      amount,
      currency: currency.to_string(),
    })
  }

  fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
    verify_payment_signature(&self.config.key_secret, gateway_order_id, payment_id, signature)
  }

  #[instrument(skip(self), fields(amount = %amount))]
  async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<String> {
    let body = RefundBody {
      amount: minor_units(amount)?,
    };
    let refund = self.post(&format!("/payments/{payment_id}/refund"), &body).await?;
    info!(refund_id = %refund.id, "Gateway refund issued.");
    Ok(refund.id)
  }
}
