use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{encode_filter_value, SupabaseClient};
use shared_models::calendar::{clock_time, MonthKey};
use shared_models::tenant::TenantId;

use crate::error::ScheduleError;
use crate::models::{BookingOpenSetting, DateOverride, Doctor, OverrideDeleteScope, WeeklyRule};
use crate::services::availability::BookedCounts;
use crate::services::store::{
    BookingCounter, BookingWindowStore, DateOverrideStore, DoctorDirectory, OverrideDraft,
    WeeklyRuleDraft, WeeklyRuleStore,
};

const WEEKLY_RULES: &str = "weekly_rules";
const DATE_OVERRIDES: &str = "date_overrides";
const BOOKING_OPEN_SETTINGS: &str = "booking_open_settings";
const DOCTORS: &str = "doctors";
const RESERVATIONS: &str = "reservations";

const OVERRIDE_KEY: &str = "tenant_id,doctor_id,override_date,slot_name";

/// Schedule tables behind Supabase PostgREST.
pub struct SupabaseScheduleStore {
    supabase: SupabaseClient,
}

impl SupabaseScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub fn with_client(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }
}

fn tenant_filter(tenant: &TenantId) -> String {
    format!("tenant_id=eq.{}", encode_filter_value(tenant.as_str()))
}

fn time_value(time: Option<NaiveTime>) -> Value {
    match time {
        Some(t) => json!(t.format("%H:%M:%S").to_string()),
        None => Value::Null,
    }
}

fn first_row<T>(rows: Vec<T>, what: &str) -> Result<T, ScheduleError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| ScheduleError::Database(anyhow!("{} write returned no row", what)))
}

#[async_trait]
impl WeeklyRuleStore for SupabaseScheduleStore {
    async fn list_weekly_rules(
        &self,
        tenant: &TenantId,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<WeeklyRule>, ScheduleError> {
        let mut query = format!("{}&order=doctor_id.asc,weekday.asc", tenant_filter(tenant));
        if let Some(doctor_id) = doctor_id {
            query.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        Ok(self.supabase.select(WEEKLY_RULES, &query).await?)
    }

    async fn upsert_weekly_rule(
        &self,
        tenant: &TenantId,
        draft: WeeklyRuleDraft,
    ) -> Result<WeeklyRule, ScheduleError> {
        debug!("Upserting weekly rule for doctor {} weekday {}", draft.doctor_id, draft.weekday);

        let row = json!({
            "tenant_id": tenant,
            "doctor_id": draft.doctor_id,
            "weekday": draft.weekday,
            "enabled": draft.enabled,
            "start_time": time_value(draft.start_time),
            "end_time": time_value(draft.end_time),
            "slot_minutes": draft.slot_minutes,
            "capacity": draft.capacity,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<WeeklyRule> = self
            .supabase
            .upsert(WEEKLY_RULES, "tenant_id,doctor_id,weekday", row)
            .await?;
        first_row(rows, "weekly rule")
    }

    async fn delete_weekly_rule(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        weekday: u8,
    ) -> Result<bool, ScheduleError> {
        let query = format!(
            "{}&doctor_id=eq.{}&weekday=eq.{}",
            tenant_filter(tenant),
            doctor_id,
            weekday
        );
        let removed: Vec<Value> = self.supabase.delete(WEEKLY_RULES, &query).await?;
        Ok(!removed.is_empty())
    }
}

#[async_trait]
impl DateOverrideStore for SupabaseScheduleStore {
    async fn list_overrides(
        &self,
        tenant: &TenantId,
        doctor_id: Option<Uuid>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DateOverride>, ScheduleError> {
        let mut query = format!(
            "{}&order=override_date.asc,slot_name.asc.nullsfirst",
            tenant_filter(tenant)
        );
        if let Some(doctor_id) = doctor_id {
            query.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(start) = start {
            query.push_str(&format!("&override_date=gte.{}", start));
        }
        if let Some(end) = end {
            query.push_str(&format!("&override_date=lte.{}", end));
        }
        Ok(self.supabase.select(DATE_OVERRIDES, &query).await?)
    }

    async fn replace_override(
        &self,
        tenant: &TenantId,
        draft: OverrideDraft,
    ) -> Result<DateOverride, ScheduleError> {
        debug!(
            "Replacing override for doctor {} on {} (band {:?})",
            draft.doctor_id, draft.override_date, draft.slot_name
        );

        // Every column is written so the stored row never keeps fields of the
        // row it replaces.
        let row = json!({
            "tenant_id": tenant,
            "doctor_id": draft.doctor_id,
            "override_date": draft.override_date,
            "override_type": draft.override_type,
            "slot_name": draft.slot_name,
            "start_time": time_value(draft.start_time),
            "end_time": time_value(draft.end_time),
            "slot_minutes": draft.slot_minutes,
            "capacity": draft.capacity,
            "memo": draft.memo,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<DateOverride> = self.supabase.upsert(DATE_OVERRIDES, OVERRIDE_KEY, row).await?;
        first_row(rows, "date override")
    }

    async fn delete_overrides(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        date: NaiveDate,
        scope: &OverrideDeleteScope,
    ) -> Result<usize, ScheduleError> {
        let mut query = format!(
            "{}&doctor_id=eq.{}&override_date=eq.{}",
            tenant_filter(tenant),
            doctor_id,
            date
        );
        match scope {
            OverrideDeleteScope::All => {}
            OverrideDeleteScope::Base => query.push_str("&slot_name=is.null"),
            OverrideDeleteScope::Band(name) => {
                query.push_str(&format!("&slot_name=eq.{}", encode_filter_value(name)))
            }
        }

        let removed: Vec<Value> = self.supabase.delete(DATE_OVERRIDES, &query).await?;
        Ok(removed.len())
    }
}

#[async_trait]
impl BookingWindowStore for SupabaseScheduleStore {
    async fn get_setting(
        &self,
        tenant: &TenantId,
        month: MonthKey,
    ) -> Result<Option<BookingOpenSetting>, ScheduleError> {
        let query = format!("{}&target_month=eq.{}", tenant_filter(tenant), month);
        let rows: Vec<BookingOpenSetting> = self.supabase.select(BOOKING_OPEN_SETTINGS, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_setting(
        &self,
        tenant: &TenantId,
        setting: BookingOpenSetting,
    ) -> Result<BookingOpenSetting, ScheduleError> {
        let row = json!({
            "tenant_id": tenant,
            "target_month": setting.target_month,
            "is_open": setting.is_open,
            "opened_at": setting.opened_at.map(|t| t.to_rfc3339()),
            "memo": setting.memo,
        });
        let rows: Vec<BookingOpenSetting> = self
            .supabase
            .upsert(BOOKING_OPEN_SETTINGS, "tenant_id,target_month", row)
            .await?;
        first_row(rows, "booking window")
    }

    async fn delete_setting(&self, tenant: &TenantId, month: MonthKey) -> Result<(), ScheduleError> {
        let query = format!("{}&target_month=eq.{}", tenant_filter(tenant), month);
        let _: Vec<Value> = self.supabase.delete(BOOKING_OPEN_SETTINGS, &query).await?;
        Ok(())
    }

    async fn list_settings(&self, tenant: &TenantId) -> Result<Vec<BookingOpenSetting>, ScheduleError> {
        let query = format!("{}&order=target_month.asc", tenant_filter(tenant));
        Ok(self.supabase.select(BOOKING_OPEN_SETTINGS, &query).await?)
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseScheduleStore {
    async fn list_doctors(&self, tenant: &TenantId) -> Result<Vec<Doctor>, ScheduleError> {
        let query = format!(
            "select=id,tenant_id,name,is_active&{}&is_active=eq.true&order=name.asc",
            tenant_filter(tenant)
        );
        Ok(self.supabase.select(DOCTORS, &query).await?)
    }

    async fn get_doctor(&self, tenant: &TenantId, doctor_id: Uuid) -> Result<Option<Doctor>, ScheduleError> {
        let query = format!(
            "select=id,tenant_id,name,is_active&{}&id=eq.{}",
            tenant_filter(tenant),
            doctor_id
        );
        let rows: Vec<Doctor> = self.supabase.select(DOCTORS, &query).await?;
        Ok(rows.into_iter().next())
    }
}

#[derive(Deserialize)]
struct BookedRow {
    reservation_date: NaiveDate,
    #[serde(with = "clock_time")]
    reservation_time: NaiveTime,
}

#[async_trait]
impl BookingCounter for SupabaseScheduleStore {
    async fn booked_counts(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BookedCounts, ScheduleError> {
        let query = format!(
            "select=reservation_date,reservation_time&{}&doctor_id=eq.{}&reservation_date=gte.{}&reservation_date=lte.{}&status=neq.cancelled",
            tenant_filter(tenant),
            doctor_id,
            start,
            end
        );
        let rows: Vec<BookedRow> = self.supabase.select(RESERVATIONS, &query).await?;

        let mut counts = BookedCounts::new();
        for row in rows {
            *counts.entry((row.reservation_date, row.reservation_time)).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
