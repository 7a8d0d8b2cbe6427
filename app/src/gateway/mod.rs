pub mod flutterwave;

use crate::config::{AppConfig, GatewayKind};
use crate::errors::{AppError, Result};
use bazaar::mock::{MockPaymentGateway, MockTransferGateway};
use bazaar::ports::{PaymentGateway, TransferGateway};
use std::sync::Arc;

pub use flutterwave::FlutterwaveClient;

/// Payment and transfer gateways for the configured processor.
pub fn build_gateways(config: &AppConfig) -> Result<(Arc<dyn PaymentGateway>, Arc<dyn TransferGateway>)> {
  match config.payment_gateway {
    GatewayKind::Flutterwave => {
      let client = FlutterwaveClient::new(&config.gateway_base_url, &config.gateway_secret_key, &config.webhook_secret)
        .map_err(|e| AppError::Config(format!("Cannot build gateway client: {}", e)))?;
      let client = Arc::new(client);
      Ok((client.clone(), client))
    }
    GatewayKind::Mock => {
      tracing::warn!("Using mock payment and transfer gateways.");
      Ok((
        Arc::new(MockPaymentGateway::new(&config.webhook_secret)),
        Arc::new(MockTransferGateway::new(&config.webhook_secret)),
      ))
    }
  }
}
