pub mod bookings;
pub mod payment;
pub mod shows;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(shows::routes())
        .merge(bookings::routes())
        .merge(payment::routes())
}
