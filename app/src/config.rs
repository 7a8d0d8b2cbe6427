use crate::errors::{AppError, Result};
use bazaar::MarketSettings;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use uuid::Uuid;

/// Which payment processor the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
  /// In-process gateways; payments auto-succeed, transfers stay pending.
  Mock,
  Flutterwave,
}

impl FromStr for GatewayKind {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "mock" => Ok(GatewayKind::Mock),
      "flutterwave" => Ok(GatewayKind::Flutterwave),
      other => Err(AppError::Config(format!("Unknown PAYMENT_GATEWAY '{}'", other))),
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,
  pub run_migrations: bool,

  pub payment_gateway: GatewayKind,
  pub gateway_base_url: String,
  pub gateway_secret_key: String,
  pub webhook_secret: String,

  pub currency: String,
  pub shipping_cost: i64,
  pub tax_amount: i64,
  pub min_payout: i64,

  /// Users allowed to change order status.
  pub admin_user_ids: Vec<Uuid>,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the config from any variable source; `from_env` passes the process environment.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let required = |name: &str| {
      get_env(name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", name)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parse_or("SERVER_PORT", get_env("SERVER_PORT"), 8080u16)?;
    let database_url = required("DATABASE_URL")?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));
    let run_migrations = parse_or("RUN_MIGRATIONS", get_env("RUN_MIGRATIONS"), false)?;

    let payment_gateway = match get_env("PAYMENT_GATEWAY") {
      Some(value) => value.parse::<GatewayKind>()?,
      None => GatewayKind::Mock,
    };
    let gateway_base_url = get_env("GATEWAY_BASE_URL").unwrap_or_else(|| "https://api.flutterwave.com/v3".to_string());
    let (gateway_secret_key, webhook_secret) = match payment_gateway {
      GatewayKind::Flutterwave => (required("GATEWAY_SECRET_KEY")?, required("WEBHOOK_SECRET")?),
      GatewayKind::Mock => (
        get_env("GATEWAY_SECRET_KEY").unwrap_or_default(),
        get_env("WEBHOOK_SECRET").unwrap_or_else(|| bazaar::mock::MOCK_WEBHOOK_SECRET.to_string()),
      ),
    };

    let defaults = MarketSettings::default();
    let currency = get_env("CURRENCY").unwrap_or(defaults.currency);
    let shipping_cost = parse_or("SHIPPING_COST", get_env("SHIPPING_COST"), defaults.shipping_cost)?;
    let tax_amount = parse_or("TAX_AMOUNT", get_env("TAX_AMOUNT"), defaults.tax)?;
    let min_payout = parse_or("MIN_PAYOUT", get_env("MIN_PAYOUT"), defaults.min_payout)?;
    for (name, value) in [("SHIPPING_COST", shipping_cost), ("TAX_AMOUNT", tax_amount), ("MIN_PAYOUT", min_payout)] {
      if value < 0 {
        return Err(AppError::Config(format!("{} must not be negative", name)));
      }
    }

    let admin_user_ids = match get_env("ADMIN_USER_IDS") {
      Some(raw) => raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
          Uuid::parse_str(id).map_err(|e| AppError::Config(format!("Invalid ADMIN_USER_IDS entry '{}': {}", id, e)))
        })
        .collect::<Result<Vec<_>>>()?,
      None => Vec::new(),
    };

    tracing::info!(gateway = ?payment_gateway, %currency, admins = admin_user_ids.len(), "Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      app_base_url,
      run_migrations,
      payment_gateway,
      gateway_base_url,
      gateway_secret_key,
      webhook_secret,
      currency,
      shipping_cost,
      tax_amount,
      min_payout,
      admin_user_ids,
    })
  }

  pub fn is_admin(&self, user_id: Uuid) -> bool {
    self.admin_user_ids.contains(&user_id)
  }

  pub fn market_settings(&self) -> MarketSettings {
    MarketSettings {
      shipping_cost: self.shipping_cost,
      tax: self.tax_amount,
      currency: self.currency.clone(),
      min_payout: self.min_payout,
      transfer_callback_url: Some(format!(
        "{}/api/v1/webhooks/transfers",
        self.app_base_url.trim_end_matches('/')
      )),
    }
  }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match raw {
    Some(value) => value
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
    None => Ok(default),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    AppConfig::from_lookup(|name| vars.get(name).cloned())
  }

  #[test]
  fn defaults_follow_market_settings() {
    let cfg = config(&[("DATABASE_URL", "postgres://localhost/bazaar")]).unwrap();
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.payment_gateway, GatewayKind::Mock);
    assert_eq!(cfg.webhook_secret, bazaar::mock::MOCK_WEBHOOK_SECRET);

    let settings = cfg.market_settings();
    assert_eq!(settings.shipping_cost, 1500);
    assert_eq!(settings.min_payout, 1000);
    assert_eq!(settings.currency, "NGN");
    assert_eq!(
      settings.transfer_callback_url.as_deref(),
      Some("http://127.0.0.1:8080/api/v1/webhooks/transfers")
    );
  }

  #[test]
  fn database_url_is_required() {
    assert!(matches!(config(&[]), Err(AppError::Config(_))));
  }

  #[test]
  fn flutterwave_needs_its_secrets() {
    let err = config(&[("DATABASE_URL", "postgres://x"), ("PAYMENT_GATEWAY", "flutterwave")]).unwrap_err();
    assert!(err.to_string().contains("GATEWAY_SECRET_KEY"));
  }

  #[test]
  fn invalid_numbers_are_config_errors() {
    let err = config(&[("DATABASE_URL", "postgres://x"), ("MIN_PAYOUT", "ten")]).unwrap_err();
    assert!(err.to_string().contains("MIN_PAYOUT"));
    let err = config(&[("DATABASE_URL", "postgres://x"), ("TAX_AMOUNT", "-5")]).unwrap_err();
    assert!(err.to_string().contains("TAX_AMOUNT"));
  }

  #[test]
  fn admin_ids_are_parsed_from_a_list() {
    let cfg = config(&[
      ("DATABASE_URL", "postgres://x"),
      (
        "ADMIN_USER_IDS",
        "6f1c2a9e-0000-4000-8000-000000000001, 6f1c2a9e-0000-4000-8000-000000000002",
      ),
    ])
    .unwrap();
    assert_eq!(cfg.admin_user_ids.len(), 2);
    assert!(cfg.is_admin(Uuid::parse_str("6f1c2a9e-0000-4000-8000-000000000002").unwrap()));
    assert!(!cfg.is_admin(Uuid::nil()));

    let err = config(&[("DATABASE_URL", "postgres://x"), ("ADMIN_USER_IDS", "root")]).unwrap_err();
    assert!(err.to_string().contains("ADMIN_USER_IDS"));
  }
}
