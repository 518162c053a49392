// orderflow-server/src/services/carrier_http.rs

use crate::config::CarrierConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use orderflow::carrier::{BookingPayload, CarrierToken, CourierOption, ServiceabilityQuery, TrackingAssignment};
use orderflow::model::TrackingEvent;
use orderflow::ports::CarrierClient;
use orderflow::{OrderflowError, Result};
use reqwest::RequestBuilder;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Carrier aggregator REST client. One request per call; tokens, retries and
/// timeouts are handled by the engine's carrier session.
pub struct HttpCarrier {
  client: reqwest::Client,
  config: CarrierConfig,
}

#[derive(Serialize)]
struct LoginBody<'a> {
  email: &'a str,
  password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
  token: String,
  #[serde(default)]
  expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct ServiceabilityResponse {
  #[serde(default)]
  couriers: Vec<CourierOption>,
}

#[derive(Deserialize)]
struct ShipmentCreated {
  shipment_id: String,
}

#[derive(Serialize)]
struct AssignBody {
  courier_id: Option<u64>,
}

#[derive(Deserialize)]
struct AwbResponse {
  awb_code: String,
  courier_name: String,
  #[serde(default)]
  courier_id: Option<u64>,
  #[serde(default)]
  freight_charge: Decimal,
  #[serde(default)]
  expected_delivery: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct CancelResponse {
  cancelled: bool,
}

#[derive(Deserialize)]
struct TrackResponse {
  #[serde(default)]
  events: Vec<TrackEvent>,
}

#[derive(Deserialize)]
struct TrackEvent {
  status: String,
  #[serde(default)]
  location: Option<String>,
  at: DateTime<Utc>,
}

const MAX_ERROR_BODY: usize = 512;

fn transport(e: reqwest::Error) -> OrderflowError {
  OrderflowError::CarrierTransport(e.to_string())
}

/// Sends the request and decodes a 2xx body. Any other status becomes
/// `CarrierRequest` so the session can classify it.
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
  let resp = request.send().await.map_err(transport)?;
  let status = resp.status();
  if !status.is_success() {
    let mut message = resp.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
      let mut cut = MAX_ERROR_BODY;
      while !message.is_char_boundary(cut) {
        cut -= 1;
      }
      message.truncate(cut);
    }
    return Err(OrderflowError::CarrierRequest {
      status: status.as_u16(),
      message,
    });
  }
  resp
    .json::<T>()
    .await
    .map_err(|e| OrderflowError::CarrierTransport(format!("unexpected response body: {e}")))
}

impl HttpCarrier {
  pub fn new(client: reqwest::Client, config: CarrierConfig) -> Self {
    Self { client, config }
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }
}

#[async_trait]
impl CarrierClient for HttpCarrier {
  async fn authenticate(&self) -> Result<CarrierToken> {
    let body = LoginBody {
      email: &self.config.email,
      password: &self.config.password,
    };
    let login: LoginResponse = send(self.client.post(self.url("/auth/login")).json(&body)).await?;
    debug!(expires_in = ?login.expires_in, "Carrier login succeeded.");
    Ok(CarrierToken {
      token: login.token,
      expires_in: login.expires_in.map(Duration::from_secs),
    })
  }

  async fn check_serviceability(&self, token: &str, query: &ServiceabilityQuery) -> Result<Vec<CourierOption>> {
    let weight = query.weight_kg.to_string();
    let reverse = if query.reverse { "1" } else { "0" };
    let request = self
      .client
      .get(self.url("/courier/serviceability"))
      .bearer_auth(token)
      .query(&[
        ("pickup_postcode", query.pickup_pincode.as_str()),
        ("delivery_postcode", query.delivery_pincode.as_str()),
        ("weight", weight.as_str()),
        ("is_return", reverse),
      ]);
    let found: ServiceabilityResponse = send(request).await?;
    Ok(found.couriers)
  }

  async fn create_shipment(&self, token: &str, payload: &BookingPayload) -> Result<String> {
    let created: ShipmentCreated =
      send(self.client.post(self.url("/shipments")).bearer_auth(token).json(payload)).await?;
    Ok(created.shipment_id)
  }

  async fn assign_tracking(&self, token: &str, shipment_id: &str, courier_id: Option<u64>) -> Result<TrackingAssignment> {
    let request = self
      .client
      .post(self.url(&format!("/shipments/{shipment_id}/awb")))
      .bearer_auth(token)
      .json(&AssignBody { courier_id });
    let awb: AwbResponse = send(request).await?;
    Ok(TrackingAssignment {
      tracking_code: awb.awb_code,
      courier_name: awb.courier_name,
      courier_id: awb.courier_id.or(courier_id),
      freight_charge: awb.freight_charge,
      expected_delivery: awb.expected_delivery,
    })
  }

  async fn cancel_shipment(&self, token: &str, shipment_id: &str) -> Result<bool> {
    let request = self
      .client
      .post(self.url(&format!("/shipments/{shipment_id}/cancel")))
      .bearer_auth(token);
    let cancelled: CancelResponse = send(request).await?;
    Ok(cancelled.cancelled)
  }

  async fn track(&self, token: &str, tracking_code: &str) -> Result<Vec<TrackingEvent>> {
    let request = self
      .client
      .get(self.url(&format!("/track/awb/{tracking_code}")))
      .bearer_auth(token);
    let tracked: TrackResponse = send(request).await?;
    Ok(
      tracked
        .events
        .into_iter()
        .map(|e| TrackingEvent {
          status: e.status,
          location: e.location,
          at: e.at,
        })
        .collect(),
    )
  }
}
