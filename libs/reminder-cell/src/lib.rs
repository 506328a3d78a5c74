pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::ReminderError;
pub use models::*;
pub use router::{reminder_routes, ReminderCellState};
pub use services::*;
