pub mod availability;
pub mod reservations;
