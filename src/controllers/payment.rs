use axum::{
    extract::State, response::IntoResponse, routing::post, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments/process", post(process_payment))
}

#[derive(Debug, Deserialize)]
struct ProcessPaymentRequest {
    booking_id: i64,
    card_number: String,
    #[allow(dead_code)]
    card_name: String,
    #[allow(dead_code)]
    expiry: String,
    cvv: String,
}

// POST /api/payments/process
//
// Mock gateway: validates card shape only, stores nothing from the card, then
// flips the booking to PAID. A real integration would live behind this route.
async fn process_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ProcessPaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let digits = req.card_number.chars().filter(char::is_ascii_digit).count();
    if digits < 13 || digits > 19 {
        return Err(AppError::InvalidArgument("invalid card number".to_string()));
    }
    if req.cvv.len() != 3 || !req.cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::InvalidArgument("invalid CVV".to_string()));
    }

    // Ownership check: only the booking's user may pay for it.
    if state
        .booking
        .find_booking(user.user_id, req.booking_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "booking {} not found",
            req.booking_id
        )));
    }

    let already_paid = state.booking.mark_paid(req.booking_id).await?;

    let message = if already_paid {
        "This booking is already paid"
    } else {
        "Payment successful, booking confirmed"
    };

    Ok(Json(json!({
        "booking_id": req.booking_id,
        "message": message,
    })))
}
