use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::calendar::MonthKey;
use shared_models::reservation::Reservation;
use shared_models::tenant::TenantId;

use crate::error::ScheduleError;
use crate::models::{BookingOpenSetting, DateOverride, Doctor, OverrideDeleteScope, WeeklyRule};
use crate::services::availability::BookedCounts;
use crate::services::store::{
    BookingCounter, BookingWindowStore, DateOverrideStore, DoctorDirectory, OverrideDraft,
    WeeklyRuleDraft, WeeklyRuleStore,
};

#[derive(Default)]
struct Tables {
    doctors: Vec<Doctor>,
    weekly_rules: Vec<WeeklyRule>,
    overrides: Vec<DateOverride>,
    settings: Vec<BookingOpenSetting>,
    reservations: Vec<Reservation>,
}

/// Process-local schedule store for tests and local runs without Supabase.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    tables: RwLock<Tables>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_doctor(&self, tenant: &TenantId, name: &str) -> Doctor {
        let doctor = Doctor {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: name.to_string(),
            is_active: true,
        };
        self.tables.write().await.doctors.push(doctor.clone());
        doctor
    }

    pub async fn add_reservation(&self, reservation: Reservation) {
        self.tables.write().await.reservations.push(reservation);
    }

    pub async fn override_count(&self, tenant: &TenantId) -> usize {
        self.tables
            .read()
            .await
            .overrides
            .iter()
            .filter(|o| &o.tenant_id == tenant)
            .count()
    }
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

#[async_trait]
impl WeeklyRuleStore for InMemoryScheduleStore {
    async fn list_weekly_rules(
        &self,
        tenant: &TenantId,
        doctor_id: Option<Uuid>,
    ) -> Result<Vec<WeeklyRule>, ScheduleError> {
        let tables = self.tables.read().await;
        let mut rules: Vec<WeeklyRule> = tables
            .weekly_rules
            .iter()
            .filter(|r| &r.tenant_id == tenant && doctor_id.map_or(true, |d| r.doctor_id == d))
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.doctor_id, r.weekday));
        Ok(rules)
    }

    async fn upsert_weekly_rule(
        &self,
        tenant: &TenantId,
        draft: WeeklyRuleDraft,
    ) -> Result<WeeklyRule, ScheduleError> {
        let mut tables = self.tables.write().await;
        let existing = tables.weekly_rules.iter().position(|r| {
            &r.tenant_id == tenant && r.doctor_id == draft.doctor_id && r.weekday == draft.weekday
        });

        let rule = WeeklyRule {
            id: existing
                .map(|i| tables.weekly_rules[i].id)
                .unwrap_or_else(Uuid::new_v4),
            tenant_id: tenant.clone(),
            doctor_id: draft.doctor_id,
            weekday: draft.weekday,
            enabled: draft.enabled,
            start_time: draft.start_time,
            end_time: draft.end_time,
            slot_minutes: draft.slot_minutes,
            capacity: draft.capacity,
            updated_at: Utc::now(),
        };

        match existing {
            Some(i) => tables.weekly_rules[i] = rule.clone(),
            None => tables.weekly_rules.push(rule.clone()),
        }
        Ok(rule)
    }

    async fn delete_weekly_rule(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        weekday: u8,
    ) -> Result<bool, ScheduleError> {
        let mut tables = self.tables.write().await;
        let before = tables.weekly_rules.len();
        tables
            .weekly_rules
            .retain(|r| !(&r.tenant_id == tenant && r.doctor_id == doctor_id && r.weekday == weekday));
        Ok(tables.weekly_rules.len() < before)
    }
}

#[async_trait]
impl DateOverrideStore for InMemoryScheduleStore {
    async fn list_overrides(
        &self,
        tenant: &TenantId,
        doctor_id: Option<Uuid>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DateOverride>, ScheduleError> {
        let tables = self.tables.read().await;
        let mut overrides: Vec<DateOverride> = tables
            .overrides
            .iter()
            .filter(|o| {
                &o.tenant_id == tenant
                    && doctor_id.map_or(true, |d| o.doctor_id == d)
                    && in_range(o.override_date, start, end)
            })
            .cloned()
            .collect();
        overrides.sort_by(|a, b| {
            (a.override_date, &a.slot_name).cmp(&(b.override_date, &b.slot_name))
        });
        Ok(overrides)
    }

    async fn replace_override(
        &self,
        tenant: &TenantId,
        draft: OverrideDraft,
    ) -> Result<DateOverride, ScheduleError> {
        let mut tables = self.tables.write().await;
        // Single critical section: no reader sees the key without a row.
        tables.overrides.retain(|o| {
            !(&o.tenant_id == tenant
                && o.same_key(draft.doctor_id, draft.override_date, draft.slot_name.as_deref()))
        });

        let row = DateOverride {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            doctor_id: draft.doctor_id,
            override_date: draft.override_date,
            override_type: draft.override_type,
            slot_name: draft.slot_name,
            start_time: draft.start_time,
            end_time: draft.end_time,
            slot_minutes: draft.slot_minutes,
            capacity: draft.capacity,
            memo: draft.memo,
            updated_at: Utc::now(),
        };
        tables.overrides.push(row.clone());
        Ok(row)
    }

    async fn delete_overrides(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        date: NaiveDate,
        scope: &OverrideDeleteScope,
    ) -> Result<usize, ScheduleError> {
        let mut tables = self.tables.write().await;
        let before = tables.overrides.len();
        tables.overrides.retain(|o| {
            let on_date = &o.tenant_id == tenant && o.doctor_id == doctor_id && o.override_date == date;
            let matches = match scope {
                OverrideDeleteScope::All => true,
                OverrideDeleteScope::Base => o.slot_name.is_none(),
                OverrideDeleteScope::Band(name) => o.slot_name.as_deref() == Some(name.as_str()),
            };
            !(on_date && matches)
        });
        Ok(before - tables.overrides.len())
    }
}

#[async_trait]
impl BookingWindowStore for InMemoryScheduleStore {
    async fn get_setting(
        &self,
        tenant: &TenantId,
        month: MonthKey,
    ) -> Result<Option<BookingOpenSetting>, ScheduleError> {
        let tables = self.tables.read().await;
        Ok(tables
            .settings
            .iter()
            .find(|s| &s.tenant_id == tenant && s.target_month == month)
            .cloned())
    }

    async fn upsert_setting(
        &self,
        tenant: &TenantId,
        setting: BookingOpenSetting,
    ) -> Result<BookingOpenSetting, ScheduleError> {
        let mut tables = self.tables.write().await;
        tables
            .settings
            .retain(|s| !(&s.tenant_id == tenant && s.target_month == setting.target_month));
        let setting = BookingOpenSetting {
            tenant_id: tenant.clone(),
            ..setting
        };
        tables.settings.push(setting.clone());
        Ok(setting)
    }

    async fn delete_setting(&self, tenant: &TenantId, month: MonthKey) -> Result<(), ScheduleError> {
        let mut tables = self.tables.write().await;
        tables
            .settings
            .retain(|s| !(&s.tenant_id == tenant && s.target_month == month));
        Ok(())
    }

    async fn list_settings(&self, tenant: &TenantId) -> Result<Vec<BookingOpenSetting>, ScheduleError> {
        let tables = self.tables.read().await;
        let mut settings: Vec<BookingOpenSetting> = tables
            .settings
            .iter()
            .filter(|s| &s.tenant_id == tenant)
            .cloned()
            .collect();
        settings.sort_by_key(|s| s.target_month);
        Ok(settings)
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryScheduleStore {
    async fn list_doctors(&self, tenant: &TenantId) -> Result<Vec<Doctor>, ScheduleError> {
        let tables = self.tables.read().await;
        Ok(tables
            .doctors
            .iter()
            .filter(|d| &d.tenant_id == tenant && d.is_active)
            .cloned()
            .collect())
    }

    async fn get_doctor(&self, tenant: &TenantId, doctor_id: Uuid) -> Result<Option<Doctor>, ScheduleError> {
        let tables = self.tables.read().await;
        Ok(tables
            .doctors
            .iter()
            .find(|d| &d.tenant_id == tenant && d.id == doctor_id)
            .cloned())
    }
}

#[async_trait]
impl BookingCounter for InMemoryScheduleStore {
    async fn booked_counts(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BookedCounts, ScheduleError> {
        let tables = self.tables.read().await;
        let mut counts = BookedCounts::new();
        for reservation in tables.reservations.iter().filter(|r| {
            &r.tenant_id == tenant
                && r.doctor_id == doctor_id
                && r.is_active()
                && in_range(r.reservation_date, Some(start), Some(end))
        }) {
            *counts
                .entry((reservation.reservation_date, reservation.reservation_time))
                .or_insert(0) += 1;
        }
        Ok(counts)
    }
}
