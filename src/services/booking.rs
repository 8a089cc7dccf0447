use std::collections::HashSet;

use chrono::Duration;
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::BookingSummary;
use crate::store::{
    BookingStore, CancelOutcome, PaymentOutcome, ReserveOutcome, ReserveRequest, ShowAvailability,
    ShowFilter, ShowListing,
};

/// Business knobs for the booking core, derived from config.
#[derive(Debug, Clone, Copy)]
pub struct BookingLimits {
    /// Hard cap per booking, blocks bulk-grab abuse.
    pub max_tickets: i32,
    /// Minimum lead before showtime for a cancellation.
    pub cancel_window: Duration,
}

impl Default for BookingLimits {
    fn default() -> Self {
        Self {
            max_tickets: 10,
            cancel_window: Duration::hours(2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub booking_id: i64,
    pub total_price: f64,
}

/// Orchestrates the booking operations over an injected store. All capacity
/// and seat decisions happen inside the store's reservation transaction; this
/// layer owns input validation and outcome mapping.
pub struct BookingService<S> {
    store: S,
    limits: BookingLimits,
}

impl<S: BookingStore> BookingService<S> {
    pub fn new(store: S, limits: BookingLimits) -> Self {
        Self { store, limits }
    }

    pub async fn seat_availability(&self, show_id: i64) -> AppResult<ShowAvailability> {
        if show_id <= 0 {
            return Err(AppError::InvalidArgument(
                "show id must be positive".to_string(),
            ));
        }

        self.store
            .availability(show_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("show {show_id} not found")))
    }

    pub async fn create_booking(
        &self,
        user_id: i64,
        show_id: i64,
        quantity: i32,
        seats: Option<&str>,
    ) -> AppResult<BookingReceipt> {
        if show_id <= 0 {
            return Err(AppError::InvalidArgument(
                "show id must be positive".to_string(),
            ));
        }
        if quantity < 1 || quantity > self.limits.max_tickets {
            return Err(AppError::InvalidArgument(format!(
                "quantity must be between 1 and {}",
                self.limits.max_tickets
            )));
        }

        let seats = parse_seat_labels(seats);
        if !seats.is_empty() {
            if seats.len() != quantity as usize {
                return Err(AppError::InvalidArgument(
                    "number of selected seats does not match quantity".to_string(),
                ));
            }
            let distinct: HashSet<&str> = seats.iter().map(String::as_str).collect();
            if distinct.len() != seats.len() {
                return Err(AppError::InvalidArgument(
                    "duplicate seat labels in selection".to_string(),
                ));
            }
        }

        let outcome = self
            .store
            .reserve(ReserveRequest {
                user_id,
                show_id,
                quantity,
                seats,
            })
            .await?;

        match outcome {
            ReserveOutcome::Booked {
                booking_id,
                total_price,
            } => {
                info!(booking_id, show_id, user_id, quantity, "booking created");
                Ok(BookingReceipt {
                    booking_id,
                    total_price,
                })
            }
            ReserveOutcome::ShowNotFound => {
                Err(AppError::NotFound(format!("show {show_id} not found")))
            }
            ReserveOutcome::CapacityExceeded { remaining } => {
                Err(AppError::CapacityExceeded { remaining })
            }
            ReserveOutcome::SeatConflict { taken } => Err(AppError::SeatConflict { taken }),
        }
    }

    pub async fn cancel_booking(&self, user_id: i64, booking_id: i64) -> AppResult<()> {
        if booking_id <= 0 {
            return Err(AppError::InvalidArgument(
                "booking id must be positive".to_string(),
            ));
        }

        match self
            .store
            .cancel(user_id, booking_id, self.limits.cancel_window)
            .await?
        {
            CancelOutcome::Cancelled => {
                info!(booking_id, user_id, "booking cancelled");
                Ok(())
            }
            CancelOutcome::NotFound => {
                Err(AppError::NotFound(format!("booking {booking_id} not found")))
            }
            CancelOutcome::AlreadyCancelled => Err(AppError::AlreadyCancelled),
            CancelOutcome::AlreadyPaid => Err(AppError::InvalidState(
                "a paid booking cannot be cancelled".to_string(),
            )),
            CancelOutcome::TooLate => Err(AppError::TooLate),
        }
    }

    /// Payment-collaborator callback. Returns whether the booking had already
    /// been paid (idempotent success).
    pub async fn mark_paid(&self, booking_id: i64) -> AppResult<bool> {
        if booking_id <= 0 {
            return Err(AppError::InvalidArgument(
                "booking id must be positive".to_string(),
            ));
        }

        match self.store.mark_paid(booking_id).await? {
            PaymentOutcome::Paid => {
                info!(booking_id, "booking marked paid");
                Ok(false)
            }
            PaymentOutcome::AlreadyPaid => Ok(true),
            PaymentOutcome::CancelledBooking => Err(AppError::InvalidState(
                "booking has been cancelled".to_string(),
            )),
            PaymentOutcome::NotFound => {
                Err(AppError::NotFound(format!("booking {booking_id} not found")))
            }
        }
    }

    pub async fn my_bookings(&self, user_id: i64) -> AppResult<Vec<BookingSummary>> {
        Ok(self.store.bookings_for_user(user_id).await?)
    }

    /// A single booking, visible only to its owner. Someone else's booking
    /// answers the same as an unknown id.
    pub async fn find_booking(
        &self,
        user_id: i64,
        booking_id: i64,
    ) -> AppResult<Option<BookingSummary>> {
        Ok(self.store.find_booking_for_user(user_id, booking_id).await?)
    }

    pub async fn list_shows(&self, filter: ShowFilter) -> AppResult<Vec<ShowListing>> {
        Ok(self.store.list_shows(filter).await?)
    }
}

/// Comma-separated labels, trimmed, empties dropped. `None` or a blank string
/// means a quantity-only booking.
fn parse_seat_labels(seats: Option<&str>) -> Vec<String> {
    seats
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn service(store: Arc<MemoryStore>) -> BookingService<Arc<MemoryStore>> {
        BookingService::new(store, BookingLimits::default())
    }

    fn in_hours(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    fn old_release() -> chrono::NaiveDate {
        (Utc::now() - Duration::days(90)).date_naive()
    }

    #[test]
    fn seat_label_parsing() {
        assert!(parse_seat_labels(None).is_empty());
        assert!(parse_seat_labels(Some("  ")).is_empty());
        assert_eq!(
            parse_seat_labels(Some("A1, B2 ,,C3")),
            vec!["A1".to_string(), "B2".to_string(), "C3".to_string()]
        );
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let store = Arc::new(MemoryStore::new());
        let show_id = store.seed_show(10, in_hours(6), 100.0, old_release());
        let svc = service(store);

        assert!(matches!(
            svc.create_booking(1, 0, 1, None).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            svc.create_booking(1, show_id, 0, None).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            svc.create_booking(1, show_id, 11, None).await,
            Err(AppError::InvalidArgument(_))
        ));
        // Seat count must match quantity.
        assert!(matches!(
            svc.create_booking(1, show_id, 3, Some("A1,A2")).await,
            Err(AppError::InvalidArgument(_))
        ));
        // Duplicate labels would collide with themselves.
        assert!(matches!(
            svc.create_booking(1, show_id, 2, Some("A1,A1")).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn missing_show_is_not_found() {
        let svc = service(Arc::new(MemoryStore::new()));
        assert!(matches!(
            svc.create_booking(1, 42, 1, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.seat_availability(42).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn capacity_scenario_with_cancel_and_retry() {
        // Hall of 2: A takes both, B is refused with remaining=0, then A
        // cancels and B's retry succeeds.
        let store = Arc::new(MemoryStore::new());
        let show_id = store.seed_show(2, in_hours(6), 100.0, old_release());
        let svc = service(store);

        let a = svc.create_booking(1, show_id, 2, None).await.unwrap();

        let b = svc.create_booking(2, show_id, 1, None).await;
        assert!(matches!(b, Err(AppError::CapacityExceeded { remaining: 0 })));

        svc.cancel_booking(1, a.booking_id).await.unwrap();

        let retry = svc.create_booking(2, show_id, 1, None).await.unwrap();
        assert!(retry.booking_id > a.booking_id);
    }

    #[tokio::test]
    async fn cancellation_window() {
        let store = Arc::new(MemoryStore::new());
        let soon = store.seed_show(5, in_hours(1), 100.0, old_release());
        let later = store.seed_show(5, in_hours(3), 100.0, old_release());
        let svc = service(store);

        let ok = svc.create_booking(1, later, 1, None).await.unwrap();
        svc.cancel_booking(1, ok.booking_id).await.unwrap();
        assert!(matches!(
            svc.cancel_booking(1, ok.booking_id).await,
            Err(AppError::AlreadyCancelled)
        ));

        let late = svc.create_booking(1, soon, 1, None).await.unwrap();
        assert!(matches!(
            svc.cancel_booking(1, late.booking_id).await,
            Err(AppError::TooLate)
        ));

        // Another user's booking id looks like NotFound, not Forbidden.
        let other = svc.create_booking(1, later, 1, None).await.unwrap();
        assert!(matches!(
            svc.cancel_booking(2, other.booking_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn paid_bookings_are_not_cancellable() {
        let store = Arc::new(MemoryStore::new());
        let show_id = store.seed_show(5, in_hours(6), 100.0, old_release());
        let svc = service(store.clone());

        let receipt = svc.create_booking(1, show_id, 1, None).await.unwrap();
        svc.mark_paid(receipt.booking_id).await.unwrap();

        assert!(matches!(
            svc.cancel_booking(1, receipt.booking_id).await,
            Err(AppError::InvalidState(_))
        ));
        assert_eq!(
            store.booking_status(receipt.booking_id),
            Some(crate::models::BookingStatus::Paid)
        );
    }

    #[tokio::test]
    async fn server_side_price_is_returned() {
        let store = Arc::new(MemoryStore::new());
        // Released today: new-release premium applies.
        let movie = store.add_movie("Premiere", None, Utc::now().date_naive());
        let hall = store.add_hall("Main", 10);
        let start = in_hours(26);
        let show_id = store.add_show(movie, hall, start, 100.0);
        let svc = service(store);

        let receipt = svc.create_booking(1, show_id, 2, None).await.unwrap();
        let expected_per_ticket = crate::pricing::calculate_price(100.0, start, true);
        assert_eq!(receipt.total_price, expected_per_ticket * 2.0);
    }

    #[tokio::test]
    async fn concurrent_bookings_never_exceed_capacity() {
        let store = Arc::new(MemoryStore::new());
        let show_id = store.seed_show(10, in_hours(6), 100.0, old_release());
        let svc = Arc::new(service(store.clone()));

        let mut handles = Vec::new();
        for user in 0..25i64 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.create_booking(user, show_id, 1, None).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 10);
        let follow_up = svc.create_booking(99, show_id, 1, None).await;
        assert!(matches!(
            follow_up,
            Err(AppError::CapacityExceeded { remaining: 0 })
        ));
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_seat_yield_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let show_id = store.seed_show(50, in_hours(6), 100.0, old_release());
        let svc = Arc::new(service(store.clone()));

        let mut handles = Vec::new();
        for user in 0..20i64 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.create_booking(user, show_id, 1, Some("A1")).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        let availability = svc.seat_availability(show_id).await.unwrap();
        assert_eq!(availability.booked_seats.len(), 1);
        assert!(availability.booked_seats.contains("A1"));
    }
}
