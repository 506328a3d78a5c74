use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use shared_models::calendar::MonthKey;
use shared_models::tenant::TenantId;

use crate::error::ScheduleError;
use crate::models::{
    BookingOpenSetting, DateOverride, Doctor, OverrideDeleteScope, OverrideType, WeeklyRule,
};
use crate::services::availability::BookedCounts;

/// Fields of a weekly rule write; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct WeeklyRuleDraft {
    pub doctor_id: Uuid,
    pub weekday: u8,
    pub enabled: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub capacity: Option<i32>,
}

/// Fields of an override write, already validated and normalized.
#[derive(Debug, Clone)]
pub struct OverrideDraft {
    pub doctor_id: Uuid,
    pub override_date: NaiveDate,
    pub override_type: OverrideType,
    pub slot_name: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub capacity: Option<i32>,
    pub memo: Option<String>,
}

#[async_trait]
pub trait WeeklyRuleStore: Send + Sync {
    async fn list_weekly_rules(
        &self,
        tenant: &TenantId,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<WeeklyRule>, ScheduleError>;

    /// Insert or replace the rule of (doctor, weekday).
    async fn upsert_weekly_rule(
        &self,
        tenant: &TenantId,
        draft: WeeklyRuleDraft,
    ) -> Result<WeeklyRule, ScheduleError>;

    /// Returns whether a rule was removed.
    async fn delete_weekly_rule(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        weekday: u8,
    ) -> Result<bool, ScheduleError>;
}

#[async_trait]
pub trait DateOverrideStore: Send + Sync {
    async fn list_overrides(
        &self,
        tenant: &TenantId,
        doctor_id: Option<Uuid>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DateOverride>, ScheduleError>;

    /// Replaces whatever row holds (doctor, date, slot_name) with `draft`.
    async fn replace_override(
        &self,
        tenant: &TenantId,
        draft: OverrideDraft,
    ) -> Result<DateOverride, ScheduleError>;

    /// Returns the number of rows removed.
    async fn delete_overrides(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        date: NaiveDate,
        scope: &OverrideDeleteScope,
    ) -> Result<usize, ScheduleError>;
}

#[async_trait]
pub trait BookingWindowStore: Send + Sync {
    async fn get_setting(
        &self,
        tenant: &TenantId,
        month: MonthKey,
    ) -> Result<Option<BookingOpenSetting>, ScheduleError>;

    async fn upsert_setting(
        &self,
        tenant: &TenantId,
        setting: BookingOpenSetting,
    ) -> Result<BookingOpenSetting, ScheduleError>;

    async fn delete_setting(&self, tenant: &TenantId, month: MonthKey) -> Result<(), ScheduleError>;

    async fn list_settings(&self, tenant: &TenantId) -> Result<Vec<BookingOpenSetting>, ScheduleError>;
}

#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn list_doctors(&self, tenant: &TenantId) -> Result<Vec<Doctor>, ScheduleError>;

    async fn get_doctor(&self, tenant: &TenantId, doctor_id: Uuid) -> Result<Option<Doctor>, ScheduleError>;
}

/// Read side of the reservation path: active bookings per slot.
#[async_trait]
pub trait BookingCounter: Send + Sync {
    async fn booked_counts(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BookedCounts, ScheduleError>;
}

/// Everything the schedule services read and write.
pub trait ScheduleStore:
    WeeklyRuleStore + DateOverrideStore + BookingWindowStore + DoctorDirectory + BookingCounter
{
}

impl<T> ScheduleStore for T where
    T: WeeklyRuleStore + DateOverrideStore + BookingWindowStore + DoctorDirectory + BookingCounter
{
}
