pub mod availability;
pub mod holds;
pub mod lifecycle;
pub mod pricing;
pub mod sweeper;

pub use availability::AvailabilityResolver;
pub use holds::HoldManager;
pub use lifecycle::{LifecycleHandler, OrderLifecycle};
pub use pricing::PricingResolver;
pub use sweeper::ExpirySweeper;
