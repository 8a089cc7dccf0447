use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of a booking. Transitions only move forward: BOOKED is the
/// pending state created by the reservation transaction, PAID and CANCELLED
/// are terminal. Rows are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Booked,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BOOKED" => Some(BookingStatus::Booked),
            "PAID" => Some(BookingStatus::Paid),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses that count against capacity and hold their seats.
    pub fn holds_seats(&self) -> bool {
        matches!(self, BookingStatus::Booked | BookingStatus::Paid)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub show_id: i64,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub final_price: f64,
    pub total_tickets: i32,
}

/// Booking row joined with its show and movie, as returned by the
/// "my bookings" listing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BookingSummary {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub final_price: f64,
    pub total_tickets: i32,
    pub start_time: DateTime<Utc>,
    pub movie_title: String,
}
