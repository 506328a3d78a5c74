pub mod supabase;

pub use supabase::{encode_filter_value, SupabaseClient};
