//! Collaborators the pipeline consumes but does not implement itself.

pub mod cache;
pub mod gateway;
pub mod notify;
pub mod store;

pub use cache::{product_cache_key, CatalogCache, CATALOG_LISTING_PREFIX};
pub use gateway::{
  GatewayError, GatewayPaymentStatus, GatewayTransferStatus, PaymentCustomer, PaymentEvent, PaymentGateway,
  PaymentInitiation, PaymentLink, PaymentVerification, TransferEvent, TransferGateway, TransferReceipt,
  TransferRequest,
};
pub use notify::{Notifier, StoreNotifier};
pub use store::{MarketStore, PayoutOutcome, PayoutReservation, PayoutTransition, SettlementCommit};
