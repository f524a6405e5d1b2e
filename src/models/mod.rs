pub mod booking;
pub mod pricing;
pub mod seat;

pub use booking::{BookingRecord, BookingStatus, RefundInfo};
pub use pricing::{PricePoint, PricingAssignment};
pub use seat::Seat;
