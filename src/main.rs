use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Duration;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_records::ai::AiClient;
use clinic_records::auth::TokenKeys;
use clinic_records::config::AppConfig;
use clinic_records::report::ReportAssets;
use clinic_records::{build_pool, handlers, run_migrations};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_records=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // create db connection pool
    let pool = build_pool(&config.database_url, config.db_pool_size)?;
    run_migrations(&pool)?;

    let keys = web::Data::new(TokenKeys::load_or_generate(
        config.jwt_private_key_path.as_deref(),
        Duration::minutes(config.token_ttl_minutes),
    )?);
    let ai = web::Data::new(AiClient::new(config.speech.clone(), config.chat.clone()));
    let assets = web::Data::new(ReportAssets::load(&config.secondary_font_path));
    let pool = web::Data::new(pool);

    tracing::info!("Starting clinic records API on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(pool.clone())
            .app_data(keys.clone())
            .app_data(ai.clone())
            .app_data(assets.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
