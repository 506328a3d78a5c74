use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info};

use shared_config::BOOKING_WINDOW_DAYS_RANGE;

use shared_models::calendar::MonthKey;
use shared_models::tenant::TenantId;

use crate::error::ScheduleError;
use crate::models::{BookingOpenSetting, BookingWindowStatus};
use crate::services::store::BookingWindowStore;

/// Per-month early opening on top of the rolling booking window.
pub struct BookingWindowGate {
    store: Arc<dyn BookingWindowStore>,
    window_days: i64,
}

impl BookingWindowGate {
    pub fn new(store: Arc<dyn BookingWindowStore>, window_days: i64) -> Self {
        Self {
            store,
            window_days: window_days.clamp(BOOKING_WINDOW_DAYS_RANGE.0, BOOKING_WINDOW_DAYS_RANGE.1),
        }
    }

    /// A month without a stored row is gated.
    pub async fn get_window(&self, tenant: &TenantId, month: MonthKey) -> Result<BookingWindowStatus, ScheduleError> {
        Ok(self
            .store
            .get_setting(tenant, month)
            .await?
            .map(BookingWindowStatus::from)
            .unwrap_or_else(|| BookingWindowStatus::gated(month)))
    }

    pub async fn open_early(
        &self,
        tenant: &TenantId,
        month: MonthKey,
        memo: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BookingWindowStatus, ScheduleError> {
        let setting = self
            .store
            .upsert_setting(
                tenant,
                BookingOpenSetting {
                    tenant_id: tenant.clone(),
                    target_month: month,
                    is_open: true,
                    opened_at: Some(now),
                    memo,
                },
            )
            .await?;

        info!("Booking window for {} opened early (tenant {})", month, tenant);
        Ok(setting.into())
    }

    /// Drops the month's row; reverting a month that was never opened is a no-op.
    pub async fn revert(&self, tenant: &TenantId, month: MonthKey) -> Result<BookingWindowStatus, ScheduleError> {
        self.store.delete_setting(tenant, month).await?;
        info!("Booking window for {} reverted to default (tenant {})", month, tenant);
        Ok(BookingWindowStatus::gated(month))
    }

    pub async fn list_open_months(&self, tenant: &TenantId) -> Result<Vec<BookingWindowStatus>, ScheduleError> {
        let settings = self.store.list_settings(tenant).await?;
        Ok(settings
            .into_iter()
            .filter(|s| s.is_open)
            .map(BookingWindowStatus::from)
            .collect())
    }

    /// True inside the rolling window or when the date's month was opened early.
    /// Past dates are never bookable.
    pub async fn is_date_bookable(
        &self,
        tenant: &TenantId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<bool, ScheduleError> {
        if date < today {
            return Ok(false);
        }
        let window_end = today.checked_add_signed(Duration::days(self.window_days));
        if window_end.map_or(true, |end| date <= end) {
            return Ok(true);
        }

        let status = self.get_window(tenant, MonthKey::of(date)).await?;
        debug!("Date {} beyond rolling window, month open: {}", date, status.is_open);
        Ok(status.is_open)
    }
}
