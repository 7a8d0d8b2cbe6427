// src/lib.rs

//! Bazaar: order, payment and payout settlement for a multi-vendor store.
//!
//! The crate turns a cart into a priced order, settles its payment exactly
//! once no matter how many times the gateway reports it, accrues seller
//! revenue in the same atomic unit, and disburses payouts that can never
//! exceed what a seller has earned.
//!
//! Every multi-step operation is a named-step pipeline (`flow`) over a
//! context that carries its collaborators (`ports`). Storage, gateways,
//! notifications and the catalog cache are traits; `memory` and `mock`
//! provide in-process implementations.

pub mod error;
pub mod flow;
pub mod ledger;
pub mod market;
pub mod memory;
pub mod mock;
pub mod model;
pub mod pipelines;
pub mod ports;
pub mod pricing;
pub mod settings;

// --- Re-exports for the public API ---

pub use crate::error::{FlowError, MarketError, Result, StoreError, StoreResult};
pub use crate::flow::{ContextData, Pipeline, PipelineControl, PipelineResult, Registry, StepDef};
pub use crate::ledger::AccrualPlan;
pub use crate::market::Marketplace;
pub use crate::memory::{MemoryCatalogCache, MemoryStore};
pub use crate::model::{
  Amount, Notification, NotificationKind, Order, OrderItem, OrderOwner, OrderStatus, PaymentStatus, PayoutMethod,
  PayoutStatus, Product, Seller, SellerBalance, SellerPayout, ShippingAddress, Variant,
};
pub use crate::pipelines::contexts::{
  LineRequest, MarketDeps, OrderRequest, PaymentInit, PayoutRequest, SettlementOutcome, SettlementReport,
};
pub use crate::pricing::{resolve_price, resolve_unit_price, OrderTotals};
pub use crate::settings::MarketSettings;
