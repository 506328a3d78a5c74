pub mod dispatcher;
pub mod engine;
pub mod logs;
pub mod memory;
pub mod notifier;
pub mod store;
pub mod supabase_store;
pub mod template;

pub use dispatcher::{DispatchSummary, DispatcherConfig, ReminderDispatcher};
pub use engine::{FixedTimePassSummary, ReminderRuleEngine, ReservationHookSummary, ScheduleOutcome};
pub use logs::{summarize_logs, ReminderService};
pub use memory::InMemoryReminderStore;
pub use notifier::{LineNotifier, Notifier, OutboundMessage};
pub use store::{MessageStore, PatientDirectory, ReminderRuleStore, ReservationDirectory};
pub use supabase_store::SupabaseReminderStore;
