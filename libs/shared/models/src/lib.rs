pub mod auth;
pub mod calendar;
pub mod error;
pub mod reservation;
pub mod tenant;

pub use calendar::{ClinicClock, MonthKey};
pub use reservation::Reservation;
pub use tenant::TenantId;
