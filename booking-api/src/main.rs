use anyhow::Context;
use booking_api::{config::ApiConfig, create_router, AppState};
use booking_engine::{config::EngineConfig, engine::BookingEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_file = std::env::var("BOOKING_CONFIG").unwrap_or_else(|_| "booking".to_string());
    let api_config = ApiConfig::load(Some(&config_file)).context("loading server config")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&api_config.log_level)),
        )
        .init();

    let engine_config =
        EngineConfig::load(Some(&config_file)).context("loading engine config")?;
    let engine = BookingEngine::from_config(&engine_config).context("building booking engine")?;

    let app = create_router(AppState::new(engine));

    info!("Starting server on {}", api_config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&api_config.bind_addr)
        .await
        .with_context(|| format!("binding {}", api_config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
