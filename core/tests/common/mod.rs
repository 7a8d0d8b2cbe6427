// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset.

use bazaar::mock::{MockPaymentGateway, MockTransferGateway, RecordingNotifier};
use bazaar::{
  Amount, LineRequest, MarketDeps, MarketSettings, Marketplace, MemoryCatalogCache, MemoryStore, Order, OrderRequest,
  PaymentInit, Product, Seller, ShippingAddress,
};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

// --- Tracing (once per test binary) ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Harness ---

/// A marketplace wired to in-memory collaborators the test can inspect.
pub struct Harness {
  pub market: Marketplace,
  pub store: Arc<MemoryStore>,
  pub payments: Arc<MockPaymentGateway>,
  pub transfers: Arc<MockTransferGateway>,
  pub notifier: Arc<RecordingNotifier>,
  pub cache: Arc<MemoryCatalogCache>,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_settings(MarketSettings::default())
  }

  pub fn with_settings(settings: MarketSettings) -> Self {
    setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let payments = Arc::new(MockPaymentGateway::default());
    let transfers = Arc::new(MockTransferGateway::default());
    let notifier = Arc::new(RecordingNotifier::new());
    let cache = Arc::new(MemoryCatalogCache::new());
    let deps = MarketDeps {
      store: store.clone(),
      payments: payments.clone(),
      transfers: transfers.clone(),
      notifier: notifier.clone(),
      cache: cache.clone(),
      settings: Arc::new(settings),
    };
    Self {
      market: Marketplace::new(deps),
      store,
      payments,
      transfers,
      notifier,
      cache,
    }
  }

  pub fn seed_seller(&self, store_name: &str) -> Seller {
    let seller = Seller::new(Uuid::new_v4(), store_name);
    self.store.insert_seller(seller.clone());
    seller
  }

  pub fn seed_product(&self, seller: &Seller, name: &str, price: Amount, stock: i32) -> Product {
    let product = Product::new(seller.id, name, price, stock);
    self.store.insert_product(product.clone());
    product
  }

  pub fn stock_of(&self, product: &Product) -> i32 {
    self.store.get_product(product.id).map(|p| p.stock).unwrap_or(i32::MIN)
  }

  pub fn seller_now(&self, seller: &Seller) -> Seller {
    self.store.get_seller(seller.id).expect("seller seeded")
  }

  pub fn order_now(&self, order: &Order) -> Order {
    self.store.get_order(order.id).expect("order persisted")
  }

  pub async fn place_order(&self, user_id: Uuid, lines: &[(&Product, i32)]) -> Order {
    self
      .market
      .create_order(buyer_request(user_id, lines))
      .await
      .expect("order should be created")
  }

  /// Initializes payment and returns the mock transaction id to settle with.
  pub async fn start_payment(&self, order: &Order, requester: Option<Uuid>) -> (PaymentInit, String) {
    let init = self
      .market
      .initialize_payment(order.id, requester, "https://shop.test/checkout/done", Some("buyer@example.com".into()))
      .await
      .expect("payment should initialize");
    let transaction_id = self
      .payments
      .transaction_for(&init.reference)
      .expect("mock gateway records a transaction");
    (init, transaction_id)
  }

  /// Places, pays and settles an order so its seller has revenue.
  pub async fn settled_order(&self, user_id: Uuid, lines: &[(&Product, i32)]) -> Order {
    let order = self.place_order(user_id, lines).await;
    let (_, transaction_id) = self.start_payment(&order, Some(user_id)).await;
    self
      .market
      .settle_payment(&transaction_id)
      .await
      .expect("settlement should succeed");
    self.order_now(&order)
  }
}

// --- Request builders ---

pub fn lines(items: &[(&Product, i32)]) -> Vec<LineRequest> {
  items
    .iter()
    .map(|(product, quantity)| LineRequest {
      product_id: product.id,
      variant_id: None,
      quantity: *quantity,
    })
    .collect()
}

pub fn buyer_request(user_id: Uuid, items: &[(&Product, i32)]) -> OrderRequest {
  OrderRequest {
    items: lines(items),
    user_id: Some(user_id),
    ..OrderRequest::default()
  }
}

pub fn guest_address() -> ShippingAddress {
  ShippingAddress {
    first_name: "Amaka".to_string(),
    last_name: "Obi".to_string(),
    email: "amaka@example.com".to_string(),
    phone: "+2348012345678".to_string(),
    address: "12 Admiralty Way".to_string(),
    city: "Lagos".to_string(),
    state: Some("Lagos".to_string()),
    country: Some("NG".to_string()),
  }
}

pub fn guest_request(items: &[(&Product, i32)]) -> OrderRequest {
  OrderRequest {
    items: lines(items),
    guest: Some(guest_address()),
    ..OrderRequest::default()
  }
}

// --- Webhook bodies ---

/// Charge event as the processor sends it; `amount` is in minor units and
/// goes on the wire in major units.
pub fn charge_event(reference: &str, transaction_id: &str, status: &str, amount: Amount) -> Vec<u8> {
  serde_json::json!({
    "event": "charge.completed",
    "data": {
      "id": transaction_id,
      "tx_ref": reference,
      "status": status,
      "amount": bazaar::ports::gateway::wire::to_major(amount, "NGN"),
      "currency": "NGN"
    }
  })
  .to_string()
  .into_bytes()
}

pub fn transfer_event(reference: &str, status: &str, message: &str) -> Vec<u8> {
  serde_json::json!({
    "event": "transfer.completed",
    "data": {
      "id": 48213,
      "reference": reference,
      "status": status,
      "complete_message": message
    }
  })
  .to_string()
  .into_bytes()
}
