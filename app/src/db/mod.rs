mod pg_store;
mod rows;

pub use pg_store::PgStore;

use crate::errors::Result;
use sqlx::PgPool;

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
  sqlx::migrate!("./migrations").run(pool).await?;
  tracing::info!("Database migrations applied.");
  Ok(())
}
