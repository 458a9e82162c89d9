//! ParkGate Server
//!
//! Main entry point for the parking gate server.

use parkgate_server::{
    gate_relay::HttpGateController,
    image_store::ImageStore,
    parking_ledger::{InMemoryRecordStore, MySqlRecordStore, RecordStore},
    plate_recognizer::HttpPlateRecognizer,
    state::{AppConfig, AppState, Collaborators},
    vehicle_directory::{InMemoryVehicleDirectory, MySqlVehicleDirectory, VehicleDirectory},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Connect to MySQL when configured
async fn connect_database(config: &AppConfig) -> anyhow::Result<Option<MySqlPool>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores (data is lost on restart)");
        return Ok(None);
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await?;

    tracing::info!("Database connected");
    Ok(Some(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkgate_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ParkGate Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env();
    tracing::info!(
        recognizer_url = %config.recognizer_url,
        upload_dir = %config.upload_dir.display(),
        capacity = config.capacity,
        unit_rate = config.unit_rate,
        min_dwell_sec = config.min_dwell_sec,
        capture_wait_ms = config.capture_wait_ms,
        facility_tz = %config.facility_tz,
        "Configuration loaded"
    );

    let pool = connect_database(&config).await?;

    // Record store and vehicle directory
    let (records, directory): (Arc<dyn RecordStore>, Arc<dyn VehicleDirectory>) = match &pool {
        Some(pool) => (
            Arc::new(MySqlRecordStore::new(pool.clone())),
            Arc::new(MySqlVehicleDirectory::new(pool.clone())),
        ),
        None => (
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryVehicleDirectory::new()),
        ),
    };

    let images = Arc::new(ImageStore::new(config.upload_dir.clone()).await?);
    tracing::info!("ImageStore initialized");

    let recognizer = Arc::new(HttpPlateRecognizer::with_timeout(
        config.recognizer_url.clone(),
        images.clone(),
        config.recognizer_timeout(),
    )?);
    let gate = Arc::new(HttpGateController::new(config.gate_timeout())?);
    tracing::info!("Recognizer and gate clients initialized");

    let state = AppState::assemble(
        config.clone(),
        pool,
        images.clone(),
        Collaborators {
            records,
            directory,
            recognizer,
            gate,
        },
    );
    tracing::info!("ParkingService initialized");

    // Build router
    let mut app = web_api::create_router(state)
        .nest_service("/uploads", ServeDir::new(images.dir()));

    if let Some(static_dir) = &config.static_dir {
        tracing::info!(static_dir = %static_dir.display(), "Serving dashboard");
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
