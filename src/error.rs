use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

/// Failure taxonomy shared by the booking core and the HTTP layer. Business
/// outcomes (capacity, seat conflicts, cancellation rules, payment state) are
/// ordinary variants; only `Persistence` represents an actual fault.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("only {remaining} seats remaining")]
    CapacityExceeded { remaining: i32 },

    #[error("seats already booked: {}", taken.join(", "))]
    SeatConflict { taken: Vec<String> },

    #[error("booking is already cancelled")]
    AlreadyCancelled,

    #[error("cannot cancel this close to showtime")]
    TooLate,

    #[error("{0}")]
    InvalidState(String),

    #[error("the show is busy with other bookings, retry shortly")]
    Busy,

    #[error("storage failure")]
    Persistence(#[source] StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => AppError::Busy,
            other => AppError::Persistence(other),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CapacityExceeded { .. }
            | AppError::SeatConflict { .. }
            | AppError::AlreadyCancelled
            | AppError::TooLate
            | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::CapacityExceeded { remaining } => json!({
                "error": "capacity_exceeded",
                "message": self.to_string(),
                "remaining": remaining,
            }),
            AppError::SeatConflict { taken } => json!({
                "error": "seat_conflict",
                "message": self.to_string(),
                "seats": taken,
            }),
            AppError::Persistence(source) => {
                // Storage detail stays in the logs, never in the response.
                tracing::error!(error = %source, "persistence failure");
                json!({
                    "error": "internal",
                    "message": "internal server error",
                })
            }
            other => json!({
                "error": error_code(other),
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

fn error_code(err: &AppError) -> &'static str {
    match err {
        AppError::InvalidArgument(_) => "invalid_argument",
        AppError::NotFound(_) => "not_found",
        AppError::CapacityExceeded { .. } => "capacity_exceeded",
        AppError::SeatConflict { .. } => "seat_conflict",
        AppError::AlreadyCancelled => "already_cancelled",
        AppError::TooLate => "too_late",
        AppError::InvalidState(_) => "invalid_state",
        AppError::Busy => "busy",
        AppError::Persistence(_) => "internal",
    }
}
