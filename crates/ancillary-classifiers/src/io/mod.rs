pub mod artifacts;
pub mod bookings;
