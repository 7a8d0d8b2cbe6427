use crate::model::{NewNotification, NotificationKind, Order};
use crate::ports::store::MarketStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Fire-and-forget side effects. Callers log and swallow every error.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn create(&self, notification: NewNotification) -> anyhow::Result<()>;

  /// Hands a freshly placed order to the order-confirmation workflow.
  async fn order_placed(&self, order: &Order) -> anyhow::Result<()>;
}

/// Persists notifications through the market store.
pub struct StoreNotifier {
  store: Arc<dyn MarketStore>,
}

impl StoreNotifier {
  pub fn new(store: Arc<dyn MarketStore>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl Notifier for StoreNotifier {
  async fn create(&self, notification: NewNotification) -> anyhow::Result<()> {
    self.store.insert_notification(notification).await?;
    Ok(())
  }

  async fn order_placed(&self, order: &Order) -> anyhow::Result<()> {
    // Guests only get the confirmation e-mail, which the mailer service sends.
    info!(order_id = %order.id, total = order.total, guest = order.owner.is_guest(), "Order placed.");
    if let Some(user_id) = order.owner.user_id() {
      let notification = NewNotification::new(
        user_id,
        NotificationKind::OrderPlaced,
        "Order received",
        format!("Your order {} for {} {} has been placed.", order.id, order.total, order.currency),
      );
      self.store.insert_notification(notification).await?;
    }
    Ok(())
  }
}
