//! Context types carried through each settlement pipeline.
//!
//! Every context owns a `MarketDeps` handle so handlers reach their
//! collaborators without global state.

use crate::ledger::AccrualPlan;
use crate::model::{Amount, Order, OrderOwner, PayoutMethod, Product, Seller, SellerPayout, ShippingAddress};
use crate::ports::gateway::{GatewayPaymentStatus, GatewayTransferStatus, PaymentLink, TransferReceipt};
use crate::ports::store::PayoutTransition;
use crate::ports::{CatalogCache, MarketStore, Notifier, PaymentGateway, TransferGateway};
use crate::settings::MarketSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Collaborators shared by every pipeline run.
#[derive(Clone)]
pub struct MarketDeps {
  pub store: Arc<dyn MarketStore>,
  pub payments: Arc<dyn PaymentGateway>,
  pub transfers: Arc<dyn TransferGateway>,
  pub notifier: Arc<dyn Notifier>,
  pub cache: Arc<dyn CatalogCache>,
  pub settings: Arc<MarketSettings>,
}

// --- Order assembly ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
  pub product_id: Uuid,
  #[serde(default)]
  pub variant_id: Option<Uuid>,
  pub quantity: i32,
}

/// Checkout input. Exactly one of `user_id` and `guest` must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
  pub items: Vec<LineRequest>,
  #[serde(default)]
  pub user_id: Option<Uuid>,
  /// Guest identity and delivery snapshot.
  #[serde(default)]
  pub guest: Option<ShippingAddress>,
  /// Delivery address for authenticated buyers.
  #[serde(default)]
  pub shipping_address: Option<ShippingAddress>,
  #[serde(default)]
  pub discount: Amount,
  /// Overrides the flat shipping charge.
  #[serde(default)]
  pub shipping_cost: Option<Amount>,
}

pub struct PlaceOrderCtx {
  pub deps: MarketDeps,
  pub request: OrderRequest,
  pub owner: Option<OrderOwner>,
  pub products: HashMap<Uuid, Product>,
  pub order: Option<Order>,
}

impl PlaceOrderCtx {
  pub fn new(deps: MarketDeps, request: OrderRequest) -> Self {
    Self {
      deps,
      request,
      owner: None,
      products: HashMap::new(),
      order: None,
    }
  }
}

// --- Payment initialization ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInit {
  pub payment_url: String,
  pub reference: String,
}

pub struct InitializePaymentCtx {
  pub deps: MarketDeps,
  pub order_id: Uuid,
  pub requester: Option<Uuid>,
  pub redirect_url: String,
  /// Used when the order carries no address to take an e-mail from.
  pub customer_email: Option<String>,
  pub order: Option<Order>,
  pub reference: Option<String>,
  pub link: Option<PaymentLink>,
}

impl InitializePaymentCtx {
  pub fn new(
    deps: MarketDeps,
    order_id: Uuid,
    requester: Option<Uuid>,
    redirect_url: String,
    customer_email: Option<String>,
  ) -> Self {
    Self {
      deps,
      order_id,
      requester,
      redirect_url,
      customer_email,
      order: None,
      reference: None,
      link: None,
    }
  }
}

// --- Settlement ---

/// How a settlement attempt reached us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementTrigger {
  /// Client-side polling with the gateway's transaction id.
  Verify { transaction_id: String },
  /// Signed event pushed by the gateway.
  Webhook { signature: String, raw_payload: Vec<u8> },
}

impl SettlementTrigger {
  pub fn is_webhook(&self) -> bool {
    matches!(self, SettlementTrigger::Webhook { .. })
  }

  pub fn label(&self) -> &'static str {
    match self {
      SettlementTrigger::Verify { .. } => "verify",
      SettlementTrigger::Webhook { .. } => "webhook",
    }
  }
}

/// The gateway's view of a payment, from either entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReport {
  pub reference: String,
  pub transaction_id: Option<String>,
  pub status: GatewayPaymentStatus,
  pub amount: Option<Amount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
  /// This call flipped the order to COMPLETED and accrued the ledger.
  Settled,
  /// Someone else settled it first; nothing changed.
  AlreadySettled,
  Failed,
  /// The gateway has no final answer yet.
  Pending,
  /// Money was taken for an order that was cancelled first; nothing accrued.
  RefundDue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
  pub order_id: Uuid,
  pub reference: String,
  pub outcome: SettlementOutcome,
}

pub struct SettlementCtx {
  pub deps: MarketDeps,
  pub trigger: SettlementTrigger,
  pub report: Option<GatewayReport>,
  pub order: Option<Order>,
  pub plan: Option<AccrualPlan>,
  pub outcome: Option<SettlementOutcome>,
}

impl SettlementCtx {
  pub fn new(deps: MarketDeps, trigger: SettlementTrigger) -> Self {
    Self {
      deps,
      trigger,
      report: None,
      order: None,
      plan: None,
      outcome: None,
    }
  }
}

// --- Payouts ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
  pub seller_id: Uuid,
  pub amount: Amount,
  pub method: PayoutMethod,
  pub account_details: serde_json::Value,
}

pub struct PayoutCtx {
  pub deps: MarketDeps,
  pub request: PayoutRequest,
  pub seller: Option<Seller>,
  pub payout: Option<SellerPayout>,
  pub receipt: Option<TransferReceipt>,
}

impl PayoutCtx {
  pub fn new(deps: MarketDeps, request: PayoutRequest) -> Self {
    Self {
      deps,
      request,
      seller: None,
      payout: None,
      receipt: None,
    }
  }

  pub fn method(&self) -> PayoutMethod {
    self.request.method
  }
}

/// Where a transfer status update came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdateSource {
  Webhook { signature: String, raw_payload: Vec<u8> },
  Poll { payout_id: Uuid },
}

pub struct TransferUpdateCtx {
  pub deps: MarketDeps,
  pub source: TransferUpdateSource,
  pub reference: Option<String>,
  pub status: Option<GatewayTransferStatus>,
  pub transition: Option<PayoutTransition>,
}

impl TransferUpdateCtx {
  pub fn new(deps: MarketDeps, source: TransferUpdateSource) -> Self {
    Self {
      deps,
      source,
      reference: None,
      status: None,
      transition: None,
    }
  }

  pub fn is_webhook(&self) -> bool {
    matches!(self.source, TransferUpdateSource::Webhook { .. })
  }
}
