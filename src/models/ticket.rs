use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One named seat belonging to a booking. Quantity-only bookings carry no
/// ticket rows at all.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub booking_id: i64,
    pub seat_label: String,
}
