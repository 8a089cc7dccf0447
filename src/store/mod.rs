//! Storage contract for the booking core. Every adapter must provide the
//! transactional guarantees the reservation sequence relies on: an exclusive
//! read of the capacity-determining hall row for the duration of `reserve`,
//! and all-or-nothing persistence of a booking with its ticket rows.

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::BookingSummary;

pub use memory::MemoryStore;
pub use postgres::PgBookingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The capacity lock could not be acquired within the bounded timeout.
    /// Retryable by the caller.
    #[error("timed out waiting for the show's capacity lock")]
    LockTimeout,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Snapshot of a show's seat state. Not a reservation: the authoritative
/// check is repeated inside the reservation transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ShowAvailability {
    pub capacity: i32,
    pub booked_seats: BTreeSet<String>,
}

/// A validated reservation request. `seats` is empty for quantity-only
/// bookings, otherwise holds exactly `quantity` distinct labels.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub user_id: i64,
    pub show_id: i64,
    pub quantity: i32,
    pub seats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Booked { booking_id: i64, total_price: f64 },
    ShowNotFound,
    CapacityExceeded { remaining: i32 },
    SeatConflict { taken: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    AlreadyCancelled,
    /// PAID is terminal; refunds are out of scope, so user-facing
    /// cancellation never reaches a paid booking.
    AlreadyPaid,
    /// The show starts too soon for the cancellation window.
    TooLate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    /// Idempotent success: the booking was already paid.
    AlreadyPaid,
    CancelledBooking,
    NotFound,
}

/// Filters for the public show listing.
#[derive(Debug, Clone, Default)]
pub struct ShowFilter {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub date: Option<NaiveDate>,
}

/// A show joined with its movie, carrying the server-computed current
/// per-ticket price.
#[derive(Debug, Clone, Serialize)]
pub struct ShowListing {
    pub id: i64,
    pub movie_id: i64,
    pub hall_id: i64,
    pub title: String,
    pub genre: Option<String>,
    pub start_time: DateTime<Utc>,
    pub base_price: f64,
    pub current_price: f64,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Capacity and currently held seat labels for a show, or `None` if the
    /// show does not exist.
    async fn availability(&self, show_id: i64) -> Result<Option<ShowAvailability>, StoreError>;

    /// The atomic reservation sequence: re-fetch pricing inputs, lock the
    /// capacity row, re-check capacity and seat uniqueness, insert the
    /// booking and its ticket rows. Commits only a fully consistent booking;
    /// any business rejection or fault leaves nothing behind.
    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, StoreError>;

    /// Cancel one of `user_id`'s bookings unless the show starts within
    /// `cancel_window`. Ticket rows stay in place; the CANCELLED status
    /// removes them from every availability computation.
    async fn cancel(
        &self,
        user_id: i64,
        booking_id: i64,
        cancel_window: Duration,
    ) -> Result<CancelOutcome, StoreError>;

    /// BOOKED -> PAID transition for the payment collaborator.
    async fn mark_paid(&self, booking_id: i64) -> Result<PaymentOutcome, StoreError>;

    /// Bulk-cancel unpaid bookings whose show starts within `lead` from now.
    /// Returns the number of bookings cancelled.
    async fn expire_stale(&self, lead: Duration) -> Result<u64, StoreError>;

    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<BookingSummary>, StoreError>;

    /// One of `user_id`'s bookings by id. `None` covers both an unknown id
    /// and a booking that belongs to someone else.
    async fn find_booking_for_user(
        &self,
        user_id: i64,
        booking_id: i64,
    ) -> Result<Option<BookingSummary>, StoreError>;

    async fn list_shows(&self, filter: ShowFilter) -> Result<Vec<ShowListing>, StoreError>;
}

#[async_trait]
impl<S: BookingStore + ?Sized> BookingStore for Arc<S> {
    async fn availability(&self, show_id: i64) -> Result<Option<ShowAvailability>, StoreError> {
        (**self).availability(show_id).await
    }

    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, StoreError> {
        (**self).reserve(req).await
    }

    async fn cancel(
        &self,
        user_id: i64,
        booking_id: i64,
        cancel_window: Duration,
    ) -> Result<CancelOutcome, StoreError> {
        (**self).cancel(user_id, booking_id, cancel_window).await
    }

    async fn mark_paid(&self, booking_id: i64) -> Result<PaymentOutcome, StoreError> {
        (**self).mark_paid(booking_id).await
    }

    async fn expire_stale(&self, lead: Duration) -> Result<u64, StoreError> {
        (**self).expire_stale(lead).await
    }

    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<BookingSummary>, StoreError> {
        (**self).bookings_for_user(user_id).await
    }

    async fn find_booking_for_user(
        &self,
        user_id: i64,
        booking_id: i64,
    ) -> Result<Option<BookingSummary>, StoreError> {
        (**self).find_booking_for_user(user_id, booking_id).await
    }

    async fn list_shows(&self, filter: ShowFilter) -> Result<Vec<ShowListing>, StoreError> {
        (**self).list_shows(filter).await
    }
}
