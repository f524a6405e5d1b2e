use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seat_inventory::{
    config::Config,
    controllers,
    services::ExpirySweeper,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Seat Inventory API");

    // Create the shared application state (DB, Redis, store, services)
    let app_state = AppState::new(config.clone())
        .await
        .expect("Failed to initialize application state");
    info!("Database and Redis connected, migrations applied");

    // --- Start background tasks ---

    // Periodic sweep of expired holds. Lazy expiry on availability reads
    // bounds staleness between runs, so the default cadence is hourly.
    let sweeper = Arc::new(ExpirySweeper::new(
        app_state.store.clone(),
        Some(app_state.cache.clone()),
    ));
    let interval = Duration::from_secs(config.sweeper.interval_seconds);
    task::spawn(sweeper.clone().run(interval));

    // --- Start the web server ---

    let app = Router::new()
        .route("/", get(|| async { "Seat Inventory API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        // Mount the routes from the controllers module
        .nest("/api", controllers::routes(&app_state))
        // Pass the application state to the router
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server error");
}
