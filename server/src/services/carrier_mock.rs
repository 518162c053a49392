// orderflow-server/src/services/carrier_mock.rs

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use orderflow::carrier::{BookingPayload, CarrierToken, CourierOption, ServiceabilityQuery, TrackingAssignment};
use orderflow::model::TrackingEvent;
use orderflow::ports::CarrierClient;
use orderflow::{OrderflowError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
struct MockShipment {
  tracking_code: Option<String>,
  cancelled: bool,
}

/// In-process carrier for local runs: every pincode is serviceable, bookings
/// always succeed, and a booked shipment tracks as picked up.
pub struct MockCarrier {
  next_id: AtomicU64,
  shipments: Mutex<HashMap<String, MockShipment>>,
  latency: Duration,
}

impl Default for MockCarrier {
  fn default() -> Self {
    Self {
      next_id: AtomicU64::new(1),
      shipments: Mutex::new(HashMap::new()),
      latency: Duration::from_millis(25),
    }
  }
}

impl MockCarrier {
  fn shipments(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MockShipment>>> {
    self
      .shipments
      .lock()
      .map_err(|_| OrderflowError::CarrierTransport("mock carrier state poisoned".to_string()))
  }
}

#[async_trait]
impl CarrierClient for MockCarrier {
  async fn authenticate(&self) -> Result<CarrierToken> {
    tokio::time::sleep(self.latency).await;
    Ok(CarrierToken {
      token: format!("mock-token-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
      expires_in: None,
    })
  }

  async fn check_serviceability(&self, _token: &str, query: &ServiceabilityQuery) -> Result<Vec<CourierOption>> {
    tokio::time::sleep(self.latency).await;
    let per_kg = Decimal::new(40, 0);
    Ok(vec![
      CourierOption {
        courier_id: 1,
        courier_name: "Mock Express".to_string(),
        rate: Decimal::new(90, 0) + per_kg * query.weight_kg,
        estimated_days: Some(2),
      },
      CourierOption {
        courier_id: 2,
        courier_name: "Mock Surface".to_string(),
        rate: Decimal::new(50, 0) + per_kg * query.weight_kg,
        estimated_days: Some(5),
      },
    ])
  }

  async fn create_shipment(&self, _token: &str, payload: &BookingPayload) -> Result<String> {
    tokio::time::sleep(self.latency).await;
    let shipment_id = format!("MOCK-SHIP-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
    self.shipments()?.insert(
      shipment_id.clone(),
      MockShipment {
        tracking_code: None,
        cancelled: false,
      },
    );
    info!(shipment_id = %shipment_id, reference = %payload.reference, direction = ?payload.direction, "Simulated booking.");
    Ok(shipment_id)
  }

  async fn assign_tracking(&self, _token: &str, shipment_id: &str, courier_id: Option<u64>) -> Result<TrackingAssignment> {
    tokio::time::sleep(self.latency).await;
    let mut shipments = self.shipments()?;
    let shipment = shipments.get_mut(shipment_id).ok_or_else(|| OrderflowError::CarrierRequest {
      status: 404,
      message: format!("unknown shipment {shipment_id}"),
    })?;
    let code = format!("MOCKAWB{}", self.next_id.fetch_add(1, Ordering::SeqCst));
    shipment.tracking_code = Some(code.clone());
    Ok(TrackingAssignment {
      tracking_code: code,
      courier_name: if courier_id == Some(1) { "Mock Express" } else { "Mock Surface" }.to_string(),
      courier_id,
      freight_charge: Decimal::new(50, 0),
      expected_delivery: Some((Utc::now() + ChronoDuration::days(5)).date_naive()),
    })
  }

  async fn cancel_shipment(&self, _token: &str, shipment_id: &str) -> Result<bool> {
    tokio::time::sleep(self.latency).await;
    match self.shipments()?.get_mut(shipment_id) {
      Some(shipment) => {
        shipment.cancelled = true;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn track(&self, _token: &str, tracking_code: &str) -> Result<Vec<TrackingEvent>> {
    tokio::time::sleep(self.latency).await;
    let shipments = self.shipments()?;
    let shipment = shipments
      .values()
      .find(|s| s.tracking_code.as_deref() == Some(tracking_code))
      .ok_or_else(|| OrderflowError::CarrierRequest {
        status: 404,
        message: format!("unknown tracking code {tracking_code}"),
      })?;
    let status = if shipment.cancelled { "Cancelled" } else { "Picked Up" };
    Ok(vec![TrackingEvent {
      status: status.to_string(),
      location: Some("Origin hub".to_string()),
      at: Utc::now(),
    }])
  }
}
