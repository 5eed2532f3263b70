pub mod item;
pub mod reservation;
pub mod reservation_item;
