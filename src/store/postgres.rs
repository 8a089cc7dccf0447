use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgPool;

use crate::models::{BookingStatus, BookingSummary};
use crate::pricing;

use super::{
    BookingStore, CancelOutcome, PaymentOutcome, ReserveOutcome, ReserveRequest, ShowAvailability,
    ShowFilter, ShowListing, StoreError,
};

/// Postgres adapter. Serializes concurrent reservations on the same show by
/// locking the hall row (`SELECT ... FOR UPDATE`) for the duration of the
/// reservation transaction, with a bounded `lock_timeout`.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgBookingStore {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }
}

/// Postgres reports a `lock_timeout` expiry as SQLSTATE 55P03.
fn map_lock_error(err: sqlx::Error) -> StoreError {
    let timed_out = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "55P03")
        .unwrap_or(false);

    if timed_out {
        StoreError::LockTimeout
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn availability(&self, show_id: i64) -> Result<Option<ShowAvailability>, StoreError> {
        let capacity: Option<i32> = sqlx::query_scalar(
            "SELECT h.capacity
             FROM shows s
             JOIN halls h ON h.id = s.hall_id
             WHERE s.id = $1",
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(capacity) = capacity else {
            return Ok(None);
        };

        let seats: Vec<String> = sqlx::query_scalar(
            "SELECT t.seat_label
             FROM tickets t
             JOIN bookings b ON b.id = t.booking_id
             WHERE b.show_id = $1 AND b.status IN ('BOOKED', 'PAID')",
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ShowAvailability {
            capacity,
            booked_seats: seats.into_iter().collect::<BTreeSet<_>>(),
        }))
    }

    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Bound the wait on the hall lock so a pile-up surfaces as a
        // retryable failure instead of blocking the caller indefinitely.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        // Lock the capacity-determining hall row and re-fetch the pricing
        // inputs in one shot. Everything after this point is serialized per
        // hall until commit.
        let show: Option<(i32, f64, DateTime<Utc>, NaiveDate)> = sqlx::query_as(
            "SELECT h.capacity, s.base_price, s.start_time, m.release_date
             FROM shows s
             JOIN halls h ON h.id = s.hall_id
             JOIN movies m ON m.id = s.movie_id
             WHERE s.id = $1
             FOR UPDATE OF h",
        )
        .bind(req.show_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_lock_error)?;

        let Some((capacity, base_price, start_time, release_date)) = show else {
            tx.rollback().await?;
            return Ok(ReserveOutcome::ShowNotFound);
        };

        let booked: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_tickets), 0)
             FROM bookings
             WHERE show_id = $1 AND status IN ('BOOKED', 'PAID')",
        )
        .bind(req.show_id)
        .fetch_one(&mut *tx)
        .await?;

        if booked + i64::from(req.quantity) > i64::from(capacity) {
            tx.rollback().await?;
            let remaining = (i64::from(capacity) - booked).max(0) as i32;
            return Ok(ReserveOutcome::CapacityExceeded { remaining });
        }

        if !req.seats.is_empty() {
            let taken: Vec<String> = sqlx::query_scalar(
                "SELECT t.seat_label
                 FROM tickets t
                 JOIN bookings b ON b.id = t.booking_id
                 WHERE b.show_id = $1
                   AND b.status IN ('BOOKED', 'PAID')
                   AND t.seat_label = ANY($2)",
            )
            .bind(req.show_id)
            .bind(&req.seats)
            .fetch_all(&mut *tx)
            .await?;

            if !taken.is_empty() {
                tx.rollback().await?;
                return Ok(ReserveOutcome::SeatConflict { taken });
            }
        }

        let is_new = pricing::is_new_release(release_date, Utc::now());
        let per_ticket = pricing::calculate_price(base_price, start_time, is_new);
        let total_price = per_ticket * f64::from(req.quantity);

        let booking_id: i64 = sqlx::query_scalar(
            "INSERT INTO bookings (user_id, show_id, status, final_price, total_tickets)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(req.user_id)
        .bind(req.show_id)
        .bind(BookingStatus::Booked.as_str())
        .bind(total_price)
        .bind(req.quantity)
        .fetch_one(&mut *tx)
        .await?;

        if !req.seats.is_empty() {
            sqlx::query(
                "INSERT INTO tickets (booking_id, seat_label)
                 SELECT $1, unnest($2::text[])",
            )
            .bind(booking_id)
            .bind(&req.seats)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT b.status, s.start_time
             FROM bookings b
             JOIN shows s ON s.id = b.show_id
             WHERE b.id = $1 AND b.user_id = $2
             FOR UPDATE OF b",
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, start_time)) = row else {
            tx.rollback().await?;
            return Ok(CancelOutcome::NotFound);
        };

        if status == BookingStatus::Cancelled.as_str() {
            tx.rollback().await?;
            return Ok(CancelOutcome::AlreadyCancelled);
        }

        // PAID is terminal: only BOOKED may move to CANCELLED here.
        if status == BookingStatus::Paid.as_str() {
            tx.rollback().await?;
            return Ok(CancelOutcome::AlreadyPaid);
        }

        if start_time - Utc::now() < cancel_window {
            tx.rollback().await?;
            return Ok(CancelOutcome::TooLate);
        }

        sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(BookingStatus::Cancelled.as_str())
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled)
    }

    async fn mark_paid(&self, booking_id: i64) -> Result<PaymentOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match status.as_deref().and_then(BookingStatus::parse) {
            None => {
                tx.rollback().await?;
                PaymentOutcome::NotFound
            }
            Some(BookingStatus::Paid) => {
                tx.rollback().await?;
                PaymentOutcome::AlreadyPaid
            }
            Some(BookingStatus::Cancelled) => {
                tx.rollback().await?;
                PaymentOutcome::CancelledBooking
            }
            Some(BookingStatus::Booked) => {
                sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
                    .bind(BookingStatus::Paid.as_str())
                    .bind(booking_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                PaymentOutcome::Paid
            }
        };

        Ok(outcome)
    }

    async fn expire_stale(&self, lead: Duration) -> Result<u64, StoreError> {
        // One bulk conditional update joined to shows; PAID and CANCELLED
        // rows never match.
        let result = sqlx::query(
            "UPDATE bookings b
             SET status = $1
             FROM shows s
             WHERE s.id = b.show_id
               AND b.status = $2
               AND s.start_time < NOW() + $3 * interval '1 minute'",
        )
        .bind(BookingStatus::Cancelled.as_str())
        .bind(BookingStatus::Booked.as_str())
        .bind(lead.num_minutes() as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn bookings_for_user(&self, user_id: i64) -> Result<Vec<BookingSummary>, StoreError> {
        let rows = sqlx::query_as::<_, BookingSummary>(
            "SELECT b.id, b.created_at, b.status, b.final_price, b.total_tickets,
                    s.start_time, m.title AS movie_title
             FROM bookings b
             JOIN shows s ON s.id = b.show_id
             JOIN movies m ON m.id = s.movie_id
             WHERE b.user_id = $1
             ORDER BY b.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_booking_for_user(
        &self,
        user_id: i64,
        booking_id: i64,
    ) -> Result<Option<BookingSummary>, StoreError> {
        let row = sqlx::query_as::<_, BookingSummary>(
            "SELECT b.id, b.created_at, b.status, b.final_price, b.total_tickets,
                    s.start_time, m.title AS movie_title
             FROM bookings b
             JOIN shows s ON s.id = b.show_id
             JOIN movies m ON m.id = s.movie_id
             WHERE b.id = $1 AND b.user_id = $2",
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_shows(&self, filter: ShowFilter) -> Result<Vec<ShowListing>, StoreError> {
        let mut sql = String::from(
            "SELECT s.id, s.movie_id, s.hall_id, s.start_time, s.base_price,
                    m.title, m.genre, m.release_date
             FROM shows s
             JOIN movies m ON m.id = s.movie_id",
        );

        let mut clauses: Vec<String> = Vec::new();
        if filter.search.is_some() {
            clauses.push(format!("m.title ILIKE ${}", clauses.len() + 1));
        }
        if filter.genre.is_some() {
            clauses.push(format!("m.genre = ${}", clauses.len() + 1));
        }
        if filter.date.is_some() {
            clauses.push(format!("s.start_time::date = ${}", clauses.len() + 1));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY s.start_time");

        let mut query = sqlx::query_as::<
            _,
            (
                i64,
                i64,
                i64,
                DateTime<Utc>,
                f64,
                String,
                Option<String>,
                NaiveDate,
            ),
        >(&sql);

        if let Some(search) = &filter.search {
            query = query.bind(format!("%{search}%"));
        }
        if let Some(genre) = &filter.genre {
            query = query.bind(genre.clone());
        }
        if let Some(date) = filter.date {
            query = query.bind(date);
        }

        let now = Utc::now();
        let listings = query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(
                |(id, movie_id, hall_id, start_time, base_price, title, genre, release_date)| {
                    let is_new = pricing::is_new_release(release_date, now);
                    ShowListing {
                        id,
                        movie_id,
                        hall_id,
                        title,
                        genre,
                        start_time,
                        base_price,
                        current_price: pricing::calculate_price(base_price, start_time, is_new),
                    }
                },
            )
            .collect();

        Ok(listings)
    }
}
