use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use chrono::Duration as ChronoDuration;
use mimalloc::MiMalloc;
use tokio::sync::watch;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kumari_booking::{
    config::Config,
    controllers,
    database::Database,
    services::booking::{BookingLimits, BookingService},
    services::sweeper::ExpirationSweeper,
    store::PgBookingStore,
    AppState,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kumari Cinemas booking service");

    let db = Database::new(&config.database).await?;
    info!("Database connected");

    db.run_migrations().await?;

    let store = PgBookingStore::new(db.pool.clone(), config.booking.lock_timeout_ms);
    let booking = BookingService::new(
        store.clone(),
        BookingLimits {
            max_tickets: config.booking.max_tickets_per_booking,
            cancel_window: ChronoDuration::hours(config.booking.cancel_window_hours),
        },
    );

    let app_state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        booking,
    });

    // Background sweeper freeing unpaid holds near showtime.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirationSweeper::new(
        store,
        Duration::from_secs(config.booking.sweep_interval_secs),
        ChronoDuration::minutes(config.booking.expiry_lead_minutes),
    );
    let sweeper_handle = task::spawn(sweeper.run(shutdown_rx));

    let app = Router::new()
        .route("/", get(|| async { "Kumari Cinemas API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from((config.app.host.parse::<std::net::IpAddr>()?, config.app.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the sweeper only after the server has drained.
    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
