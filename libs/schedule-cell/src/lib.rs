pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::ScheduleError;
pub use models::*;
pub use router::{schedule_routes, ScheduleCellState};
pub use services::*;
