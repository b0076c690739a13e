pub mod booking;
pub mod room;
pub mod user;

pub use booking::{Booking, NewBooking};
pub use room::{Hotel, Room};
pub use user::{Role, User};
