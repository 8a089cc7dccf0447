use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::store::ShowFilter;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows", get(list_shows))
        .route("/shows/{show_id}/seats", get(seat_availability))
}

#[derive(Debug, Deserialize)]
struct ShowsQuery {
    search: Option<String>,
    genre: Option<String>,
    date: Option<String>,
}

// GET /api/shows?search=&genre=&date=YYYY-MM-DD
async fn list_shows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShowsQuery>,
) -> AppResult<impl IntoResponse> {
    let date = match params.date.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            AppError::InvalidArgument("date must be formatted as YYYY-MM-DD".to_string())
        })?),
    };

    let shows = state
        .booking
        .list_shows(ShowFilter {
            search: params.search.filter(|s| !s.trim().is_empty()),
            genre: params.genre.filter(|g| !g.trim().is_empty()),
            date,
        })
        .await?;

    Ok(Json(shows))
}

#[derive(Debug, Serialize)]
struct SeatAvailabilityResponse {
    #[serde(rename = "bookedSeats")]
    booked_seats: Vec<String>,
    capacity: i32,
}

// GET /api/shows/{show_id}/seats
async fn seat_availability(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let availability = state.booking.seat_availability(show_id).await?;

    Ok(Json(SeatAvailabilityResponse {
        booked_seats: availability.booked_seats.into_iter().collect(),
        capacity: availability.capacity,
    }))
}
