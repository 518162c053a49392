// orderflow/src/carrier/token.rs
use crate::error::{OrderflowError, Result};
use crate::ports::CarrierClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
struct CachedToken {
  value: String,
  refresh_after: Instant,
}

/// Process-wide carrier auth token.
///
/// `get()` holds one async mutex while checking and, when needed, refreshing the
/// token, so any number of shipment workers that find it expired at the same
/// moment produce exactly one `authenticate` call.
pub struct TokenProvider {
  client: Arc<dyn CarrierClient>,
  cache: Mutex<Option<CachedToken>>,
  default_ttl: Duration,
  safety_margin: Duration,
}

impl TokenProvider {
  pub fn new(client: Arc<dyn CarrierClient>, default_ttl: Duration, safety_margin: Duration) -> Self {
    Self {
      client,
      cache: Mutex::new(None),
      default_ttl,
      safety_margin,
    }
  }

  #[instrument(name = "carrier_token::get", skip(self))]
  pub async fn get(&self) -> Result<String> {
    let mut cache = self.cache.lock().await;
    if let Some(cached) = cache.as_ref() {
      if Instant::now() < cached.refresh_after {
        return Ok(cached.value.clone());
      }
      debug!("Cached carrier token past its refresh point.");
    }

    let fresh = self.client.authenticate().await.map_err(|e| match e {
      OrderflowError::CarrierRequest { status, message } if status == 401 || status == 403 => {
        OrderflowError::CarrierAuth(format!("credentials rejected ({status}): {message}"))
      }
      other => other,
    })?;

    let ttl = fresh.expires_in.unwrap_or(self.default_ttl);
    let usable_for = ttl.saturating_sub(self.safety_margin);
    info!(usable_for_secs = usable_for.as_secs(), "Carrier token refreshed.");
    *cache = Some(CachedToken {
      value: fresh.token.clone(),
      refresh_after: Instant::now() + usable_for,
    });
    Ok(fresh.token)
  }

  /// Drops the cached token if it is still `stale`. A token that another worker
  /// already replaced is left alone.
  pub async fn invalidate(&self, stale: &str) {
    let mut cache = self.cache.lock().await;
    if cache.as_ref().is_some_and(|c| c.value == stale) {
      warn!("Carrier token invalidated after 401.");
      *cache = None;
    }
  }
}
