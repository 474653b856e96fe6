//! Drops every table and re-applies the migrations from scratch.

use anyhow::Context;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel_migrations::MigrationHarness;
use dotenvy::dotenv;

use clinic_records::config::AppConfig;
use clinic_records::{MIGRATIONS, build_pool};

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::from_env()?;
    let pool = build_pool(&config.database_url, 1)?;
    let mut conn = pool.get()?;

    tracing::info!("Resetting database by dropping public schema...");
    sql_query("DROP SCHEMA public CASCADE")
        .execute(&mut conn)
        .context("Failed to drop public schema")?;
    sql_query("CREATE SCHEMA public").execute(&mut conn)?;
    sql_query("GRANT ALL ON SCHEMA public TO public").execute(&mut conn)?;

    tracing::info!("Recreating all tables...");
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    tracing::info!("Database reset complete ({} migrations applied).", applied.len());
    Ok(())
}
