use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::store::BookingStore;

/// Background task that frees capacity held by unpaid bookings: every tick it
/// bulk-cancels BOOKED bookings whose show starts within `lead`. A failing
/// pass is logged and retried on the next tick, never fatal.
pub struct ExpirationSweeper<S> {
    store: S,
    tick: StdDuration,
    lead: Duration,
}

impl<S: BookingStore> ExpirationSweeper<S> {
    pub fn new(store: S, tick: StdDuration, lead: Duration) -> Self {
        Self { store, tick, lead }
    }

    /// Runs until the shutdown flag flips. Exits between sweeps, never mid-sweep.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.tick.as_secs(),
            lead_minutes = self.lead.num_minutes(),
            "expiration sweeper started"
        );

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.changed() => {
                    info!("expiration sweeper shutting down");
                    break;
                }
            }
        }
    }

    pub async fn sweep_once(&self) {
        match self.store.expire_stale(self.lead).await {
            Ok(0) => debug!("no expired bookings found"),
            Ok(cancelled) => info!(cancelled, "unpaid bookings auto-cancelled"),
            Err(err) => error!(error = %err, "expiration sweep failed, will retry next tick"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use crate::store::{MemoryStore, ReserveOutcome, ReserveRequest};
    use chrono::Utc;
    use std::sync::Arc;

    async fn booked(store: &MemoryStore, show_id: i64) -> i64 {
        let outcome = store
            .reserve(ReserveRequest {
                user_id: 1,
                show_id,
                quantity: 1,
                seats: Vec::new(),
            })
            .await
            .unwrap();
        match outcome {
            ReserveOutcome::Booked { booking_id, .. } => booking_id,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweeps_only_imminent_unpaid_bookings() {
        let store = Arc::new(MemoryStore::new());
        let release = (Utc::now() - Duration::days(60)).date_naive();
        let imminent = store.seed_show(10, Utc::now() + Duration::minutes(20), 100.0, release);
        let distant = store.seed_show(10, Utc::now() + Duration::hours(6), 100.0, release);

        let stale = booked(&store, imminent).await;
        let paid = booked(&store, imminent).await;
        store.mark_paid(paid).await.unwrap();
        let keep = booked(&store, distant).await;

        let sweeper = ExpirationSweeper::new(
            store.clone(),
            StdDuration::from_secs(900),
            Duration::hours(1),
        );
        sweeper.sweep_once().await;

        assert_eq!(store.booking_status(stale), Some(BookingStatus::Cancelled));
        assert_eq!(store.booking_status(paid), Some(BookingStatus::Paid));
        assert_eq!(store.booking_status(keep), Some(BookingStatus::Booked));

        // Idempotent: a second pass changes nothing.
        sweeper.sweep_once().await;
        assert_eq!(store.booking_status(paid), Some(BookingStatus::Paid));
        assert_eq!(store.booking_status(keep), Some(BookingStatus::Booked));
    }

    #[tokio::test]
    async fn run_exits_on_shutdown_signal() {
        let store = Arc::new(MemoryStore::new());
        let sweeper = ExpirationSweeper::new(
            store,
            StdDuration::from_secs(3600),
            Duration::hours(1),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_secs(1), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
    }
}
