pub mod availability;
pub mod booking_window;
pub mod memory;
pub mod schedule;
pub mod store;
pub mod supabase_store;

pub use availability::{compute_slots, BookedCounts};
pub use booking_window::BookingWindowGate;
pub use memory::InMemoryScheduleStore;
pub use schedule::ScheduleService;
pub use store::{
    BookingCounter, BookingWindowStore, DateOverrideStore, DoctorDirectory, OverrideDraft,
    ScheduleStore, WeeklyRuleDraft, WeeklyRuleStore,
};
pub use supabase_store::SupabaseScheduleStore;
