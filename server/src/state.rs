// orderflow-server/src/state.rs
use crate::config::{AppConfig, StorageMode};
use crate::db::{self, PgCatalog, PgInventory, PgOrders, PgPromos, PgReversals};
use crate::errors::{AppError, Result as AppResult};
use crate::services::{HttpCarrier, HttpGateway, MockCarrier, MockGateway};
use orderflow::memory::{MemoryCatalog, MemoryInventory, MemoryOrders, MemoryPromos, MemoryReversals};
use orderflow::model::{CatalogItem, PromoCode};
use orderflow::ports::{CarrierClient, PaymentGateway};
use orderflow::{CarrierSession, Collaborators, Fulfilment, OrderLocks};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct AppState {
  pub fulfilment: Fulfilment,
  pub config: Arc<AppConfig>, // Share loaded config
}

/// Contents of `SEED_FILE`. Variant `stock` values become the inventory counts.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
  #[serde(default)]
  pub items: Vec<CatalogItem>,
  #[serde(default)]
  pub promos: Vec<PromoCode>,
}

enum Stores {
  Memory {
    catalog: Arc<MemoryCatalog>,
    inventory: Arc<MemoryInventory>,
    orders: Arc<MemoryOrders>,
    promos: Arc<MemoryPromos>,
    reversals: Arc<MemoryReversals>,
  },
  Postgres {
    catalog: Arc<PgCatalog>,
    inventory: Arc<PgInventory>,
    orders: Arc<PgOrders>,
    promos: Arc<PgPromos>,
    reversals: Arc<PgReversals>,
  },
}

impl Stores {
  async fn open(config: &AppConfig) -> AppResult<Self> {
    Ok(match config.storage {
      StorageMode::Memory => {
        tracing::warn!("Using in-memory storage; orders are lost on restart.");
        Stores::Memory {
          catalog: Arc::new(MemoryCatalog::new()),
          inventory: Arc::new(MemoryInventory::new()),
          orders: Arc::new(MemoryOrders::new()),
          promos: Arc::new(MemoryPromos::new()),
          reversals: Arc::new(MemoryReversals::new()),
        }
      }
      StorageMode::Postgres => {
        let pool = db::connect(config).await?;
        Stores::Postgres {
          catalog: Arc::new(PgCatalog::new(pool.clone())),
          inventory: Arc::new(PgInventory::new(pool.clone())),
          orders: Arc::new(PgOrders::new(pool.clone())),
          promos: Arc::new(PgPromos::new(pool.clone())),
          reversals: Arc::new(PgReversals::new(pool)),
        }
      }
    })
  }

  async fn seed(&self, seed: &Seed) -> AppResult<()> {
    match self {
      Stores::Memory {
        catalog,
        inventory,
        promos,
        ..
      } => {
        for item in &seed.items {
          for variant in &item.sizes {
            inventory.set_stock(&variant.sku, variant.stock);
          }
          catalog.put(item.clone());
        }
        for promo in &seed.promos {
          promos.put(promo.clone());
        }
      }
      Stores::Postgres {
        catalog,
        inventory,
        promos,
        ..
      } => {
        for item in &seed.items {
          for variant in &item.sizes {
            inventory.set_stock(&variant.sku, variant.stock).await?;
          }
          catalog.upsert(item).await?;
        }
        for promo in &seed.promos {
          promos.upsert(promo).await?;
        }
      }
    }
    tracing::info!(items = seed.items.len(), promos = seed.promos.len(), "Seed data loaded.");
    Ok(())
  }

  fn collaborators(
    &self,
    gateway: Arc<dyn PaymentGateway>,
    carrier: Arc<CarrierSession>,
    config: &AppConfig,
  ) -> Collaborators {
    let settings = Arc::new(config.settings.clone());
    match self {
      Stores::Memory {
        catalog,
        inventory,
        orders,
        promos,
        reversals,
      } => Collaborators {
        catalog: catalog.clone(),
        inventory: inventory.clone(),
        orders: orders.clone(),
        promos: promos.clone(),
        reversals: reversals.clone(),
        gateway,
        carrier,
        locks: OrderLocks::new(),
        settings,
      },
      Stores::Postgres {
        catalog,
        inventory,
        orders,
        promos,
        reversals,
      } => Collaborators {
        catalog: catalog.clone(),
        inventory: inventory.clone(),
        orders: orders.clone(),
        promos: promos.clone(),
        reversals: reversals.clone(),
        gateway,
        carrier,
        locks: OrderLocks::new(),
        settings,
      },
    }
  }
}

async fn load_seed(config: &AppConfig) -> AppResult<Option<Seed>> {
  let Some(path) = &config.seed_file else {
    return Ok(None);
  };
  let raw = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| AppError::Config(format!("Cannot read SEED_FILE {}: {}", path.display(), e)))?;
  let seed = serde_json::from_str(&raw)
    .map_err(|e| AppError::Config(format!("Invalid SEED_FILE {}: {}", path.display(), e)))?;
  Ok(Some(seed))
}

impl AppState {
  /// Opens storage, wires the gateway and carrier, starts the shipment workers
  /// and re-queues shipments interrupted by the last shutdown.
  pub async fn build(config: Arc<AppConfig>) -> AppResult<(Self, Vec<JoinHandle<()>>)> {
    let stores = Stores::open(&config).await?;
    if let Some(seed) = load_seed(&config).await? {
      stores.seed(&seed).await?;
    }

    let http = reqwest::Client::builder()
      .timeout(config.carrier_policy.call_timeout + Duration::from_secs(5))
      .build()
      .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
      Some(gateway) => Arc::new(HttpGateway::new(http.clone(), gateway.clone())),
      None => {
        tracing::warn!("GATEWAY_KEY_ID not set; using the mock payment gateway.");
        Arc::new(MockGateway::default())
      }
    };
    let carrier_client: Arc<dyn CarrierClient> = match &config.carrier {
      Some(carrier) => Arc::new(HttpCarrier::new(http, carrier.clone())),
      None => {
        tracing::warn!("CARRIER_EMAIL not set; using the mock carrier.");
        Arc::new(MockCarrier::default())
      }
    };
    let carrier = Arc::new(CarrierSession::new(carrier_client, config.carrier_policy.clone()));

    let deps = stores.collaborators(gateway, carrier, &config);
    let (fulfilment, workers) = Fulfilment::start(deps, config.shipment_workers);
    let recovered = fulfilment.recover().await?;
    tracing::info!(recovered, workers = workers.len(), "Shipment workers started.");

    Ok((Self { fulfilment, config }, workers))
  }
}
