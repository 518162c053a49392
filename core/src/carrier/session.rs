// orderflow/src/carrier/session.rs
use super::token::TokenProvider;
use super::types::{BookingPayload, CourierOption, ServiceabilityQuery, TrackingAssignment};
use crate::error::{OrderflowError, Result};
use crate::model::TrackingEvent;
use crate::ports::CarrierClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierPolicy {
  pub call_timeout: Duration,
  /// Attempts per call for retryable failures, the first one included.
  pub max_attempts: u32,
  /// Attempt `n` waits `backoff × n` before the next one.
  pub backoff: Duration,
  pub token_ttl: Duration,
  pub token_safety_margin: Duration,
  pub company_id: String,
  pub support_contact: String,
}

impl Default for CarrierPolicy {
  fn default() -> Self {
    Self {
      call_timeout: Duration::from_secs(15),
      max_attempts: 3,
      backoff: Duration::from_millis(500),
      token_ttl: Duration::from_secs(10 * 24 * 3600),
      token_safety_margin: Duration::from_secs(3600),
      company_id: String::new(),
      support_contact: String::new(),
    }
  }
}

impl CarrierPolicy {
  pub fn remediation(&self) -> String {
    let company = if self.company_id.is_empty() {
      "the configured carrier account".to_string()
    } else {
      format!("carrier company id {}", self.company_id)
    };
    let contact = if self.support_contact.is_empty() {
      "carrier support".to_string()
    } else {
      self.support_contact.clone()
    };
    format!(
      "The carrier refused this API user for {company}. Check the account's API permissions and KYC status, \
       then retry shipping for the order. Contact {contact} if the account looks correct."
    )
  }
}

/// A carrier client plus the shared token and the call policy. Every pipeline
/// that talks to the carrier goes through here.
pub struct CarrierSession {
  client: Arc<dyn CarrierClient>,
  tokens: TokenProvider,
  policy: CarrierPolicy,
}

impl CarrierSession {
  pub fn new(client: Arc<dyn CarrierClient>, policy: CarrierPolicy) -> Self {
    let tokens = TokenProvider::new(client.clone(), policy.token_ttl, policy.token_safety_margin);
    Self { client, tokens, policy }
  }

  pub fn policy(&self) -> &CarrierPolicy {
    &self.policy
  }

  pub fn tokens(&self) -> &TokenProvider {
    &self.tokens
  }

  /// Runs one carrier operation under the call policy.
  ///
  /// - each attempt is bounded by `call_timeout`;
  /// - timeouts, transport errors, 429 and 5xx are retried with linear backoff;
  /// - a 401 invalidates the token, re-authenticates once and repeats the call once;
  /// - a 403 is surfaced immediately as `CarrierPermission`.
  pub async fn call<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T>
  where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let max_attempts = self.policy.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut reauthenticated = false;

    loop {
      attempt += 1;
      let outcome = match self.tokens.get().await {
        Ok(token) => {
          let result = match tokio::time::timeout(self.policy.call_timeout, op(token.clone())).await {
            Ok(result) => result,
            Err(_) => Err(OrderflowError::CarrierTimeout {
              operation: operation.to_string(),
            }),
          };
          (result, Some(token))
        }
        Err(e) => (Err(e), None),
      };

      match outcome {
        (Ok(value), _) => return Ok(value),
        (Err(e), Some(token)) if e.is_carrier_unauthorized() => {
          if reauthenticated {
            return Err(OrderflowError::CarrierAuth(format!(
              "'{operation}' still unauthorized after re-authentication"
            )));
          }
          warn!(operation, "Carrier returned 401; refreshing token and retrying once.");
          self.tokens.invalidate(&token).await;
          reauthenticated = true;
          // the repeat after a refresh does not spend a transient-retry attempt
          attempt -= 1;
        }
        (Err(OrderflowError::CarrierRequest { status: 403, message }), _) => {
          return Err(OrderflowError::CarrierPermission {
            message,
            remediation: self.policy.remediation(),
          });
        }
        (Err(e), _) if e.is_retryable() && attempt < max_attempts => {
          let wait = self.policy.backoff * attempt;
          warn!(operation, attempt, max_attempts, wait_ms = wait.as_millis() as u64, error = %e, "Carrier call failed; backing off.");
          tokio::time::sleep(wait).await;
        }
        (Err(e), _) => return Err(e),
      }
    }
  }

  #[instrument(name = "carrier::serviceability", skip(self, query), fields(delivery = %query.delivery_pincode))]
  pub async fn check_serviceability(&self, query: &ServiceabilityQuery) -> Result<Vec<CourierOption>> {
    self
      .call("check_serviceability", |token| async move {
        self.client.check_serviceability(&token, query).await
      })
      .await
  }

  #[instrument(name = "carrier::create_shipment", skip(self, payload), fields(reference = %payload.reference))]
  pub async fn create_shipment(&self, payload: &BookingPayload) -> Result<String> {
    self
      .call("create_shipment", |token| async move {
        self.client.create_shipment(&token, payload).await
      })
      .await
  }

  #[instrument(name = "carrier::assign_tracking", skip(self))]
  pub async fn assign_tracking(&self, shipment_id: &str, courier_id: Option<u64>) -> Result<TrackingAssignment> {
    self
      .call("assign_tracking", |token| async move {
        self.client.assign_tracking(&token, shipment_id, courier_id).await
      })
      .await
  }

  #[instrument(name = "carrier::cancel_shipment", skip(self))]
  pub async fn cancel_shipment(&self, shipment_id: &str) -> Result<bool> {
    self
      .call("cancel_shipment", |token| async move {
        self.client.cancel_shipment(&token, shipment_id).await
      })
      .await
  }

  #[instrument(name = "carrier::track", skip(self))]
  pub async fn track(&self, tracking_code: &str) -> Result<Vec<TrackingEvent>> {
    self
      .call("track", |token| async move { self.client.track(&token, tracking_code).await })
      .await
  }
}
