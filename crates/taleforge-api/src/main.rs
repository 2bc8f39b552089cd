//! Taleforge API server entry point.

use std::sync::{Arc, Mutex};

use sqlx::postgres::PgPoolOptions;
use taleforge_api::config::AppConfig;
use taleforge_api::error::AppError;
use taleforge_api::state::AppState;
use taleforge_api::telemetry;
use taleforge_core::clock::{Clock, SystemClock};
use taleforge_core::memory_store::InMemoryGameStore;
use taleforge_core::rng::{DeterministicRng, SystemRng};
use taleforge_core::store::GameStore;
use taleforge_llm::config::LlmConfig;
use taleforge_store::pg_game_store::PgGameStore;
use taleforge_store::schema::MIGRATOR;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!("Starting Taleforge API server");

    let store = connect_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(SystemRng::from_os()));

    let llm = LlmConfig::from_env()?;
    let dispatcher = Arc::new(llm.build_dispatcher(Arc::clone(&clock))?);
    info!(
        default_provider = %llm.default_provider,
        offline_fallback = llm.offline_fallback,
        "Provider registry ready"
    );

    // TODO: Replace CorsLayer::permissive() with the browser client's origin once it is deployed.
    let app = taleforge_api::app(AppState::new(store, dispatcher, clock, rng))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address()?;
    info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    telemetry.shutdown();
    Ok(())
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn GameStore>, AppError> {
    let Some(url) = &config.database_url else {
        warn!("DATABASE_URL not set, game state lives in memory only");
        return Ok(Arc::new(InMemoryGameStore::new()));
    };
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Arc::new(PgGameStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
