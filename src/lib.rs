pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod services;
pub mod store;

use services::booking::BookingService;
use store::PgBookingStore;

/// Shared state for the whole application. The booking service owns the
/// Postgres store handle; nothing reads ambient globals.
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub booking: BookingService<PgBookingStore>,
}
