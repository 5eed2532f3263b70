pub mod availability;
pub mod inventory;
pub mod item_locks;
pub mod reservations;
