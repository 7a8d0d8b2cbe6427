//! Side effects shared by several pipelines. None of them can fail a run.

use crate::model::{NewNotification, Order};
use crate::ports::cache::{product_cache_key, CATALOG_LISTING_PREFIX};
use crate::ports::{CatalogCache, Notifier};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Delivers `notification`, logging and swallowing any failure.
#[instrument(name = "common_step::notify", skip_all, fields(user_id = %notification.user_id, kind = %notification.kind))]
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: NewNotification) {
  if let Err(e) = notifier.create(notification).await {
    warn!(error = %e, "Notification could not be delivered; continuing.");
  }
}

#[instrument(name = "common_step::order_placed", skip_all, fields(order_id = %order.id))]
pub async fn announce_order_best_effort(notifier: &dyn Notifier, order: &Order) {
  if let Err(e) = notifier.order_placed(order).await {
    warn!(error = %e, "Order-placed workflow failed; order stands.");
  }
}

/// Drops cached product entries and every catalog listing.
pub fn invalidate_products(cache: &dyn CatalogCache, product_ids: impl IntoIterator<Item = Uuid>) {
  let mut dropped = 0;
  for product_id in product_ids {
    dropped += cache.invalidate(&product_cache_key(product_id));
  }
  dropped += cache.invalidate(CATALOG_LISTING_PREFIX);
  debug!(dropped, "Catalog cache invalidated.");
}
