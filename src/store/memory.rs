use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::{Booking, BookingStatus, BookingSummary, Hall, Movie, Show, Ticket};
use crate::pricing;

use super::{
    BookingStore, CancelOutcome, PaymentOutcome, ReserveOutcome, ReserveRequest, ShowAvailability,
    ShowFilter, ShowListing, StoreError,
};

#[derive(Default)]
struct Inner {
    movies: HashMap<i64, Movie>,
    halls: HashMap<i64, Hall>,
    shows: HashMap<i64, Show>,
    bookings: HashMap<i64, Booking>,
    tickets: Vec<Ticket>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn held_tickets_for_show(&self, show_id: i64) -> i64 {
        self.bookings
            .values()
            .filter(|b| b.show_id == show_id)
            .filter(|b| holds_seats(&b.status))
            .map(|b| i64::from(b.total_tickets))
            .sum()
    }

    fn held_seat_labels(&self, show_id: i64) -> BTreeSet<String> {
        self.tickets
            .iter()
            .filter(|t| {
                self.bookings
                    .get(&t.booking_id)
                    .map(|b| b.show_id == show_id && holds_seats(&b.status))
                    .unwrap_or(false)
            })
            .map(|t| t.seat_label.clone())
            .collect()
    }
}

fn holds_seats(status: &str) -> bool {
    BookingStatus::parse(status)
        .map(|s| s.holds_seats())
        .unwrap_or(false)
}

/// In-memory adapter for an engine without row-level locks: the whole store
/// sits behind one mutex, so every reservation observes a consistent snapshot
/// and commits before the next one starts. Used by tests and as a seedable
/// local fixture.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_movie(&self, title: &str, genre: Option<&str>, release_date: NaiveDate) -> i64 {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let id = inner.next_id();
        inner.movies.insert(
            id,
            Movie {
                id,
                title: title.to_string(),
                genre: genre.map(str::to_string),
                release_date,
                description: None,
            },
        );
        id
    }

    pub fn add_hall(&self, name: &str, capacity: i32) -> i64 {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let id = inner.next_id();
        inner.halls.insert(
            id,
            Hall {
                id,
                name: name.to_string(),
                capacity,
            },
        );
        id
    }

    pub fn add_show(
        &self,
        movie_id: i64,
        hall_id: i64,
        start_time: DateTime<Utc>,
        base_price: f64,
    ) -> i64 {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let id = inner.next_id();
        inner.shows.insert(
            id,
            Show {
                id,
                movie_id,
                hall_id,
                start_time,
                base_price,
            },
        );
        id
    }

    /// Shorthand: one movie, one hall, one show.
    pub fn seed_show(
        &self,
        capacity: i32,
        start_time: DateTime<Utc>,
        base_price: f64,
        release_date: NaiveDate,
    ) -> i64 {
        let movie_id = self.add_movie("Seeded Movie", Some("Drama"), release_date);
        let hall_id = self.add_hall("Hall 1", capacity);
        self.add_show(movie_id, hall_id, start_time, base_price)
    }

    pub fn booking_status(&self, booking_id: i64) -> Option<BookingStatus> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .bookings
            .get(&booking_id)
            .and_then(|b| BookingStatus::parse(&b.status))
    }

    pub fn ticket_count(&self, booking_id: i64) -> usize {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .tickets
            .iter()
            .filter(|t| t.booking_id == booking_id)
            .count()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn availability(&self, show_id: i64) -> Result<Option<ShowAvailability>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");

        let Some(show) = inner.shows.get(&show_id) else {
            return Ok(None);
        };
        let Some(hall) = inner.halls.get(&show.hall_id) else {
            return Ok(None);
        };

        Ok(Some(ShowAvailability {
            capacity: hall.capacity,
            booked_seats: inner.held_seat_labels(show_id),
        }))
    }

    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let Some(show) = inner.shows.get(&req.show_id).cloned() else {
            return Ok(ReserveOutcome::ShowNotFound);
        };
        let Some(hall) = inner.halls.get(&show.hall_id).cloned() else {
            return Ok(ReserveOutcome::ShowNotFound);
        };
        let Some(movie) = inner.movies.get(&show.movie_id).cloned() else {
            return Ok(ReserveOutcome::ShowNotFound);
        };

        let booked = inner.held_tickets_for_show(req.show_id);
        if booked + i64::from(req.quantity) > i64::from(hall.capacity) {
            let remaining = (i64::from(hall.capacity) - booked).max(0) as i32;
            return Ok(ReserveOutcome::CapacityExceeded { remaining });
        }

        if !req.seats.is_empty() {
            let held = inner.held_seat_labels(req.show_id);
            let taken: Vec<String> = req
                .seats
                .iter()
                .filter(|s| held.contains(*s))
                .cloned()
                .collect();
            if !taken.is_empty() {
                return Ok(ReserveOutcome::SeatConflict { taken });
            }
        }

        let now = Utc::now();
        let is_new = pricing::is_new_release(movie.release_date, now);
        let per_ticket = pricing::calculate_price(show.base_price, show.start_time, is_new);
        let total_price = per_ticket * f64::from(req.quantity);

        let booking_id = inner.next_id();
        inner.bookings.insert(
            booking_id,
            Booking {
                id: booking_id,
                user_id: req.user_id,
                show_id: req.show_id,
                created_at: now,
                status: BookingStatus::Booked.as_str().to_string(),
                final_price: total_price,
                total_tickets: req.quantity,
            },
        );
        for label in &req.seats {
            let ticket_id = inner.next_id();
            inner.tickets.push(Ticket {
                id: ticket_id,
                booking_id,
                seat_label: label.clone(),
            });
        }

        Ok(ReserveOutcome::Booked {
            booking_id,
            total_price,
        })
    }

    async fn cancel(
        &self,
        user_id: i64,
        booking_id: i64,
        cancel_window: Duration,
    ) -> Result<CancelOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let Some(show_id) = inner
            .bookings
            .get(&booking_id)
            .filter(|b| b.user_id == user_id)
            .map(|b| b.show_id)
        else {
            return Ok(CancelOutcome::NotFound);
        };

        let status = inner
            .bookings
            .get(&booking_id)
            .and_then(|b| BookingStatus::parse(&b.status));
        if status == Some(BookingStatus::Cancelled) {
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        // PAID is terminal: only BOOKED may move to CANCELLED here.
        if status == Some(BookingStatus::Paid) {
            return Ok(CancelOutcome::AlreadyPaid);
        }

        let Some(start_time) = inner.shows.get(&show_id).map(|s| s.start_time) else {
            return Ok(CancelOutcome::NotFound);
        };
        if start_time - Utc::now() < cancel_window {
            return Ok(CancelOutcome::TooLate);
        }

        if let Some(booking) = inner.bookings.get_mut(&booking_id) {
            booking.status = BookingStatus::Cancelled.as_str().to_string();
        }
        Ok(CancelOutcome::Cancelled)
    }

    async fn mark_paid(&self, booking_id: i64) -> Result<PaymentOutcome, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let Some(booking) = inner.bookings.get_mut(&booking_id) else {
            return Ok(PaymentOutcome::NotFound);
        };

        match BookingStatus::parse(&booking.status) {
            Some(BookingStatus::Paid) => Ok(PaymentOutcome::AlreadyPaid),
            Some(BookingStatus::Cancelled) => Ok(PaymentOutcome::CancelledBooking),
            Some(BookingStatus::Booked) => {
                booking.status = BookingStatus::Paid.as_str().to_string();
                Ok(PaymentOutcome::Paid)
            }
            None => Ok(PaymentOutcome::NotFound),
        }
    }

    async fn expire_stale(&self, lead: Duration) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let cutoff = Utc::now() + lead;

        let stale: Vec<i64> = inner
            .bookings
            .values()
            .filter(|b| BookingStatus::parse(&b.status) == Some(BookingStatus::Booked))
            .filter(|b| {
                inner
                    .shows
                    .get(&b.show_id)
                    .map(|s| s.start_time < cutoff)
                    .unwrap_or(false)
            })
            .map(|b| b.id)
            .collect();

        let cancelled = stale.len() as u64;
        for id in stale {
            if let Some(booking) = inner.bookings.get_mut(&id) {
                booking.status = BookingStatus::Cancelled.as_str().to_string();
            }
        }

        Ok(cancelled)
    }

    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<BookingSummary>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");

        let mut summaries: Vec<BookingSummary> = inner
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .filter_map(|b| {
                let show = inner.shows.get(&b.show_id)?;
                let movie = inner.movies.get(&show.movie_id)?;
                Some(BookingSummary {
                    id: b.id,
                    created_at: b.created_at,
                    status: b.status.clone(),
                    final_price: b.final_price,
                    total_tickets: b.total_tickets,
                    start_time: show.start_time,
                    movie_title: movie.title.clone(),
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn find_booking_for_user(
        &self,
        user_id: i64,
        booking_id: i64,
    ) -> Result<Option<BookingSummary>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");

        let summary = inner
            .bookings
            .get(&booking_id)
            .filter(|b| b.user_id == user_id)
            .and_then(|b| {
                let show = inner.shows.get(&b.show_id)?;
                let movie = inner.movies.get(&show.movie_id)?;
                Some(BookingSummary {
                    id: b.id,
                    created_at: b.created_at,
                    status: b.status.clone(),
                    final_price: b.final_price,
                    total_tickets: b.total_tickets,
                    start_time: show.start_time,
                    movie_title: movie.title.clone(),
                })
            });

        Ok(summary)
    }

    async fn list_shows(&self, filter: ShowFilter) -> Result<Vec<ShowListing>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let now = Utc::now();

        let mut listings: Vec<ShowListing> = inner
            .shows
            .values()
            .filter_map(|show| {
                let movie = inner.movies.get(&show.movie_id)?;

                if let Some(search) = &filter.search {
                    if !movie.title.to_lowercase().contains(&search.to_lowercase()) {
                        return None;
                    }
                }
                if let Some(genre) = &filter.genre {
                    if movie.genre.as_deref() != Some(genre.as_str()) {
                        return None;
                    }
                }
                if let Some(date) = filter.date {
                    if show.start_time.date_naive() != date {
                        return None;
                    }
                }

                let is_new = pricing::is_new_release(movie.release_date, now);
                Some(ShowListing {
                    id: show.id,
                    movie_id: show.movie_id,
                    hall_id: show.hall_id,
                    title: movie.title.clone(),
                    genre: movie.genre.clone(),
                    start_time: show.start_time,
                    base_price: show.base_price,
                    current_price: pricing::calculate_price(show.base_price, show.start_time, is_new),
                })
            })
            .collect();

        listings.sort_by_key(|l| l.start_time);
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_hours(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    fn old_release() -> NaiveDate {
        (Utc::now() - Duration::days(90)).date_naive()
    }

    fn request(show_id: i64, quantity: i32, seats: &[&str]) -> ReserveRequest {
        ReserveRequest {
            user_id: 1,
            show_id,
            quantity,
            seats: seats.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn reserve_rejects_over_capacity_with_remaining_count() {
        let store = MemoryStore::new();
        let show_id = store.seed_show(5, in_hours(6), 100.0, old_release());

        let first = store.reserve(request(show_id, 3, &[])).await.unwrap();
        assert!(matches!(first, ReserveOutcome::Booked { .. }));

        let second = store.reserve(request(show_id, 3, &[])).await.unwrap();
        assert_eq!(second, ReserveOutcome::CapacityExceeded { remaining: 2 });
    }

    #[tokio::test]
    async fn seat_conflict_leaves_no_partial_rows() {
        let store = MemoryStore::new();
        let show_id = store.seed_show(10, in_hours(6), 100.0, old_release());

        let first = store
            .reserve(request(show_id, 2, &["A1", "A2"]))
            .await
            .unwrap();
        let ReserveOutcome::Booked { booking_id, .. } = first else {
            panic!("first reservation should succeed");
        };
        assert_eq!(store.ticket_count(booking_id), 2);

        let second = store
            .reserve(request(show_id, 2, &["A2", "A3"]))
            .await
            .unwrap();
        assert_eq!(
            second,
            ReserveOutcome::SeatConflict {
                taken: vec!["A2".to_string()]
            }
        );

        // The rejected attempt must not have persisted anything.
        let availability = store.availability(show_id).await.unwrap().unwrap();
        assert_eq!(availability.booked_seats.len(), 2);
        assert!(!availability.booked_seats.contains("A3"));
    }

    #[tokio::test]
    async fn cancelled_bookings_release_their_seats() {
        let store = MemoryStore::new();
        let show_id = store.seed_show(4, in_hours(6), 100.0, old_release());

        let ReserveOutcome::Booked { booking_id, .. } = store
            .reserve(request(show_id, 2, &["B1", "B2"]))
            .await
            .unwrap()
        else {
            panic!("reservation should succeed");
        };

        let outcome = store.cancel(1, booking_id, Duration::hours(2)).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);

        // Ticket rows stay, but no longer count as held.
        assert_eq!(store.ticket_count(booking_id), 2);
        let availability = store.availability(show_id).await.unwrap().unwrap();
        assert!(availability.booked_seats.is_empty());

        let retry = store.reserve(request(show_id, 2, &["B1", "B2"])).await.unwrap();
        assert!(matches!(retry, ReserveOutcome::Booked { .. }));
    }

    #[tokio::test]
    async fn mark_paid_transitions() {
        let store = MemoryStore::new();
        let show_id = store.seed_show(4, in_hours(6), 100.0, old_release());

        let ReserveOutcome::Booked { booking_id, .. } =
            store.reserve(request(show_id, 1, &[])).await.unwrap()
        else {
            panic!("reservation should succeed");
        };

        assert_eq!(store.mark_paid(booking_id).await.unwrap(), PaymentOutcome::Paid);
        assert_eq!(
            store.mark_paid(booking_id).await.unwrap(),
            PaymentOutcome::AlreadyPaid
        );
        assert_eq!(store.mark_paid(9999).await.unwrap(), PaymentOutcome::NotFound);

        let ReserveOutcome::Booked { booking_id: other, .. } =
            store.reserve(request(show_id, 1, &[])).await.unwrap()
        else {
            panic!("reservation should succeed");
        };
        store.cancel(1, other, Duration::hours(2)).await.unwrap();
        assert_eq!(
            store.mark_paid(other).await.unwrap(),
            PaymentOutcome::CancelledBooking
        );
    }

    #[tokio::test]
    async fn paid_bookings_cannot_be_cancelled() {
        let store = MemoryStore::new();
        let show_id = store.seed_show(4, in_hours(6), 100.0, old_release());

        let ReserveOutcome::Booked { booking_id, .. } =
            store.reserve(request(show_id, 1, &[])).await.unwrap()
        else {
            panic!("reservation should succeed");
        };
        store.mark_paid(booking_id).await.unwrap();

        let outcome = store.cancel(1, booking_id, Duration::hours(2)).await.unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyPaid);
        // PAID is terminal; the row must not have moved backwards.
        assert_eq!(store.booking_status(booking_id), Some(BookingStatus::Paid));
    }

    #[tokio::test]
    async fn booking_lookup_is_scoped_to_its_owner() {
        let store = MemoryStore::new();
        let show_id = store.seed_show(4, in_hours(6), 100.0, old_release());

        let ReserveOutcome::Booked { booking_id, .. } =
            store.reserve(request(show_id, 2, &[])).await.unwrap()
        else {
            panic!("reservation should succeed");
        };

        let found = store.find_booking_for_user(1, booking_id).await.unwrap();
        let summary = found.expect("owner should see their booking");
        assert_eq!(summary.id, booking_id);
        assert_eq!(summary.total_tickets, 2);

        // Another user's lookup answers the same as an unknown id.
        assert!(store.find_booking_for_user(2, booking_id).await.unwrap().is_none());
        assert!(store.find_booking_for_user(1, 9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expire_stale_is_idempotent_and_spares_paid() {
        let store = MemoryStore::new();
        let imminent = store.seed_show(10, Utc::now() + Duration::minutes(30), 100.0, old_release());
        let distant = store.seed_show(10, in_hours(5), 100.0, old_release());

        let ReserveOutcome::Booked { booking_id: stale, .. } =
            store.reserve(request(imminent, 1, &[])).await.unwrap()
        else {
            panic!();
        };
        let ReserveOutcome::Booked { booking_id: paid, .. } =
            store.reserve(request(imminent, 1, &[])).await.unwrap()
        else {
            panic!();
        };
        store.mark_paid(paid).await.unwrap();
        let ReserveOutcome::Booked { booking_id: safe, .. } =
            store.reserve(request(distant, 1, &[])).await.unwrap()
        else {
            panic!();
        };

        assert_eq!(store.expire_stale(Duration::hours(1)).await.unwrap(), 1);
        assert_eq!(store.booking_status(stale), Some(BookingStatus::Cancelled));
        assert_eq!(store.booking_status(paid), Some(BookingStatus::Paid));
        assert_eq!(store.booking_status(safe), Some(BookingStatus::Booked));

        // Second pass with no new bookings finds nothing.
        assert_eq!(store.expire_stale(Duration::hours(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listing_filters_and_prices() {
        let store = MemoryStore::new();
        let new_movie = store.add_movie("Fresh Premiere", Some("Action"), Utc::now().date_naive());
        let old_movie = store.add_movie("Old Classic", Some("Drama"), old_release());
        let hall = store.add_hall("Main", 50);
        store.add_show(new_movie, hall, in_hours(26), 100.0);
        store.add_show(old_movie, hall, in_hours(30), 100.0);

        let all = store.list_shows(ShowFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store
            .list_shows(ShowFilter {
                search: Some("fresh".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        // New release carries the 20% premium unless it also lands on a holiday.
        let expected = pricing::calculate_price(100.0, filtered[0].start_time, true);
        assert_eq!(filtered[0].current_price, expected);
    }
}
