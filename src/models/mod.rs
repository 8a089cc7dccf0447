pub mod booking;
pub mod hall;
pub mod movie;
pub mod show;
pub mod ticket;
pub mod user;

pub use booking::{Booking, BookingStatus, BookingSummary};
pub use hall::Hall;
pub use movie::Movie;
pub use show::Show;
pub use ticket::Ticket;
pub use user::User;
