use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(my_bookings))
        .route("/bookings", post(create_booking))
        .route("/bookings/cancel", patch(cancel_booking))
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    show_id: i64,
    quantity: i32,
    /// Optional comma-separated seat labels, e.g. "A1,A2". Absent means a
    /// quantity-only booking.
    seats: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateBookingResponse {
    booking_id: i64,
    total_price: f64,
}

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt = state
        .booking
        .create_booking(user.user_id, req.show_id, req.quantity, req.seats.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking_id: receipt.booking_id,
            total_price: receipt.total_price,
        }),
    ))
}

// GET /api/bookings
async fn my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let bookings = state.booking.my_bookings(user.user_id).await?;
    Ok(Json(bookings))
}

#[derive(Debug, Deserialize)]
struct CancelBookingRequest {
    booking_id: i64,
}

// PATCH /api/bookings/cancel
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CancelBookingRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .booking
        .cancel_booking(user.user_id, req.booking_id)
        .await?;

    Ok(Json(json!({ "message": "Booking cancelled" })))
}
