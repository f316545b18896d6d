use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates the PostgreSQL pool. Sized so every batch worker can hold a
/// connection while handlers still get one.
pub async fn create_pool(database_url: &str, workers: usize) -> Result<PgPool> {
    let max_connections = u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(2);
    info!("Connecting to PostgreSQL (max {max_connections} connections)...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies `migrations/` (embedded at build time). Already-applied migrations
/// are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
