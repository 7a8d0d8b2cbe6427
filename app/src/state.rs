use crate::config::AppConfig;
use bazaar::ports::{CatalogCache, MarketStore, PaymentGateway, StoreNotifier, TransferGateway};
use bazaar::{MarketDeps, Marketplace};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub market: Arc<Marketplace>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the marketplace over `store`; notifications are persisted through the same store.
  pub fn build(
    config: Arc<AppConfig>,
    store: Arc<dyn MarketStore>,
    payments: Arc<dyn PaymentGateway>,
    transfers: Arc<dyn TransferGateway>,
    cache: Arc<dyn CatalogCache>,
  ) -> Self {
    let deps = MarketDeps {
      notifier: Arc::new(StoreNotifier::new(store.clone())),
      store,
      payments,
      transfers,
      cache,
      settings: Arc::new(config.market_settings()),
    };
    Self {
      market: Arc::new(Marketplace::new(deps)),
      config,
    }
  }
}
