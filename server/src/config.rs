// orderflow-server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use orderflow::{CarrierPolicy, PickupOrigin, PricingPolicy, ReversalPolicy, Settings};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
  Postgres,
  Memory,
}

#[derive(Clone)]
pub struct GatewayConfig {
  pub base_url: String,
  pub key_id: String,
  pub key_secret: String,
}

#[derive(Clone)]
pub struct CarrierConfig {
  pub base_url: String,
  pub email: String,
  pub password: String,
}

impl std::fmt::Debug for GatewayConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GatewayConfig")
      .field("base_url", &self.base_url)
      .field("key_id", &self.key_id)
      .field("key_secret", &"[REDACTED]")
      .finish()
  }
}

impl std::fmt::Debug for CarrierConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CarrierConfig")
      .field("base_url", &self.base_url)
      .field("email", &self.email)
      .field("password", &"[REDACTED]")
      .finish()
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub storage: StorageMode,
  pub database_url: Option<String>,
  pub database_max_connections: u32,

  /// `None` runs the in-process mock gateway.
  pub gateway: Option<GatewayConfig>,
  /// `None` runs the in-process mock carrier.
  pub carrier: Option<CarrierConfig>,
  pub carrier_policy: CarrierPolicy,

  pub settings: Settings,
  pub shipment_workers: usize,

  /// JSON file with catalog items and promo codes loaded at startup.
  pub seed_file: Option<PathBuf>,
}

fn var(name: &str) -> Option<String> {
  env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match var(name) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
    None => Ok(default),
  }
}

fn required(name: &str) -> Result<String> {
  var(name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", name)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let server_host = var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parse_or("SERVER_PORT", 8080u16)?;

    let storage = match var("STORAGE").as_deref().unwrap_or("postgres") {
      "postgres" => StorageMode::Postgres,
      "memory" => StorageMode::Memory,
      other => return Err(AppError::Config(format!("Invalid STORAGE '{}': expected postgres or memory", other))),
    };
    let database_url = match storage {
      StorageMode::Postgres => Some(required("DATABASE_URL")?),
      StorageMode::Memory => var("DATABASE_URL"),
    };
    let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

    let gateway = match var("GATEWAY_KEY_ID") {
      Some(key_id) => Some(GatewayConfig {
        base_url: required("GATEWAY_BASE_URL")?,
        key_id,
        key_secret: required("GATEWAY_KEY_SECRET")?,
      }),
      None => None,
    };
    let carrier = match var("CARRIER_EMAIL") {
      Some(email) => Some(CarrierConfig {
        base_url: required("CARRIER_BASE_URL")?,
        email,
        password: required("CARRIER_PASSWORD")?,
      }),
      None => None,
    };

    let defaults = CarrierPolicy::default();
    let carrier_policy = CarrierPolicy {
      call_timeout: Duration::from_secs(parse_or("CARRIER_CALL_TIMEOUT_SECS", defaults.call_timeout.as_secs())?),
      max_attempts: parse_or("CARRIER_MAX_ATTEMPTS", defaults.max_attempts)?,
      backoff: Duration::from_millis(parse_or("CARRIER_BACKOFF_MS", defaults.backoff.as_millis() as u64)?),
      token_ttl: Duration::from_secs(parse_or("CARRIER_TOKEN_TTL_SECS", defaults.token_ttl.as_secs())?),
      token_safety_margin: Duration::from_secs(parse_or(
        "CARRIER_TOKEN_SAFETY_MARGIN_SECS",
        defaults.token_safety_margin.as_secs(),
      )?),
      company_id: var("CARRIER_COMPANY_ID").unwrap_or_default(),
      support_contact: var("CARRIER_SUPPORT_CONTACT").unwrap_or_default(),
    };
    if carrier_policy.max_attempts == 0 {
      return Err(AppError::Config("CARRIER_MAX_ATTEMPTS must be at least 1".to_string()));
    }

    let pricing = PricingPolicy {
      currency: var("CURRENCY").unwrap_or_else(|| "INR".to_string()),
      tax_rate_percent: parse_or("TAX_RATE_PERCENT", Decimal::ZERO)?,
      shipping_fee: parse_or("SHIPPING_FEE", Decimal::ZERO)?,
      free_shipping_threshold: parse_or("FREE_SHIPPING_THRESHOLD", Decimal::ZERO)?,
    };
    if pricing.tax_rate_percent < Decimal::ZERO || pricing.shipping_fee < Decimal::ZERO {
      return Err(AppError::Config("TAX_RATE_PERCENT and SHIPPING_FEE cannot be negative".to_string()));
    }

    let origin_defaults = PickupOrigin::default();
    let settings = Settings {
      pricing,
      origin: PickupOrigin {
        location_name: var("PICKUP_LOCATION").unwrap_or(origin_defaults.location_name),
        pincode: var("PICKUP_PINCODE").unwrap_or(origin_defaults.pincode),
      },
      reversal: ReversalPolicy {
        return_window_days: parse_or("RETURN_WINDOW_DAYS", ReversalPolicy::default().return_window_days)?,
        ..ReversalPolicy::default()
      },
      tracking_url_template: var("TRACKING_URL_TEMPLATE").unwrap_or_else(|| Settings::default().tracking_url_template),
    };

    let shipment_workers = parse_or("SHIPMENT_WORKERS", 4usize)?.max(1);
    let seed_file = var("SEED_FILE").map(PathBuf::from);

    tracing::info!(
      storage = ?storage,
      mock_gateway = gateway.is_none(),
      mock_carrier = carrier.is_none(),
      shipment_workers,
      "Application configuration loaded."
    );

    Ok(Self {
      server_host,
      server_port,
      storage,
      database_url,
      database_max_connections,
      gateway,
      carrier,
      carrier_policy,
      settings,
      shipment_workers,
      seed_file,
    })
  }
}
