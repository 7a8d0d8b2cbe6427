mod config;
mod db;
mod errors;
mod gateway;
mod state;
mod web;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use bazaar::MemoryCatalogCache;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

async fn bootstrap() -> errors::Result<AppState> {
  let app_config = Arc::new(AppConfig::from_env()?);

  let db_pool = PgPoolOptions::new()
    .max_connections(10)
    .connect(&app_config.database_url)
    .await?;
  tracing::info!("Successfully connected to the database.");

  if app_config.run_migrations {
    db::run_migrations(&db_pool).await?;
  }

  let (payments, transfers) = gateway::build_gateways(&app_config)?;
  Ok(AppState::build(
    app_config,
    Arc::new(PgStore::new(db_pool)),
    payments,
    transfers,
    Arc::new(MemoryCatalogCache::new()),
  ))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting marketplace settlement server...");

  let app_state = match bootstrap().await {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to start the application.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };

  let server_address = format!("{}:{}", app_state.config.server_host, app_state.config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
