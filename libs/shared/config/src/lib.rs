use std::env;
use std::str::FromStr;
use tracing::warn;

/// Accepted range for `REMINDER_STALE_SENDING_MINUTES` (up to one week).
pub const STALE_SENDING_MINUTES_RANGE: (i64, i64) = (1, 7 * 24 * 60);
/// Accepted range for `BOOKING_WINDOW_DAYS` (up to ten years).
pub const BOOKING_WINDOW_DAYS_RANGE: (i64, i64) = (0, 3650);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub line_channel_access_token: String,
    pub line_api_base_url: String,
    pub cron_secret: String,
    /// Offset of the clinic's wall clock from UTC, in minutes (540 = JST).
    pub clinic_utc_offset_minutes: i32,
    pub reminder_batch_size: usize,
    /// Embedded dispatcher cadence; 0 leaves dispatching to the cron endpoint.
    pub reminder_dispatch_interval_seconds: u64,
    pub reminder_stale_sending_minutes: i64,
    pub booking_window_days: i64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            line_channel_access_token: String::new(),
            line_api_base_url: "https://api.line.me".to_string(),
            cron_secret: String::new(),
            clinic_utc_offset_minutes: 540,
            reminder_batch_size: 50,
            reminder_dispatch_interval_seconds: 300,
            reminder_stale_sending_minutes: 30,
            booking_window_days: 60,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            line_channel_access_token: env::var("LINE_CHANNEL_ACCESS_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("LINE_CHANNEL_ACCESS_TOKEN not set, reminders cannot be delivered");
                    String::new()
                }),
            line_api_base_url: env::var("LINE_API_BASE_URL")
                .unwrap_or(defaults.line_api_base_url),
            cron_secret: env::var("CRON_SECRET")
                .unwrap_or_else(|_| {
                    warn!("CRON_SECRET not set, cron endpoints will reject every call");
                    String::new()
                }),
            clinic_utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", defaults.clinic_utc_offset_minutes),
            reminder_batch_size: parse_or("REMINDER_BATCH_SIZE", defaults.reminder_batch_size),
            reminder_dispatch_interval_seconds: parse_or(
                "REMINDER_DISPATCH_INTERVAL_SECONDS",
                defaults.reminder_dispatch_interval_seconds,
            ),
            reminder_stale_sending_minutes: parse_clamped(
                "REMINDER_STALE_SENDING_MINUTES",
                defaults.reminder_stale_sending_minutes,
                STALE_SENDING_MINUTES_RANGE,
            ),
            booking_window_days: parse_clamped(
                "BOOKING_WINDOW_DAYS",
                defaults.booking_window_days,
                BOOKING_WINDOW_DAYS_RANGE,
            ),
            port: parse_or("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_notifier_configured(&self) -> bool {
        !self.line_channel_access_token.is_empty() && !self.line_api_base_url.is_empty()
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_clamped(key: &str, default: i64, (min, max): (i64, i64)) -> i64 {
    let value = parse_or(key, default);
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{} value {} is outside {}..={}, using {}", key, value, min, max, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert!(!config.is_notifier_configured());
        assert_eq!(config.reminder_batch_size, 50);
        assert_eq!(config.clinic_utc_offset_minutes, 540);
    }

    #[test]
    fn test_parse_or_falls_back_on_garbage() {
        env::set_var("CLINIC_TEST_PARSE_OR", "not-a-number");
        assert_eq!(parse_or("CLINIC_TEST_PARSE_OR", 7u64), 7);
        env::set_var("CLINIC_TEST_PARSE_OR", " 12 ");
        assert_eq!(parse_or("CLINIC_TEST_PARSE_OR", 7u64), 12);
        env::remove_var("CLINIC_TEST_PARSE_OR");
    }

    #[test]
    fn test_parse_clamped_bounds_large_values() {
        env::set_var("CLINIC_TEST_PARSE_CLAMPED", "99999999999999");
        assert_eq!(
            parse_clamped("CLINIC_TEST_PARSE_CLAMPED", 30, STALE_SENDING_MINUTES_RANGE),
            STALE_SENDING_MINUTES_RANGE.1
        );
        env::set_var("CLINIC_TEST_PARSE_CLAMPED", "-5");
        assert_eq!(
            parse_clamped("CLINIC_TEST_PARSE_CLAMPED", 60, BOOKING_WINDOW_DAYS_RANGE),
            0
        );
        env::set_var("CLINIC_TEST_PARSE_CLAMPED", "90");
        assert_eq!(
            parse_clamped("CLINIC_TEST_PARSE_CLAMPED", 60, BOOKING_WINDOW_DAYS_RANGE),
            90
        );
        env::remove_var("CLINIC_TEST_PARSE_CLAMPED");
    }
}
