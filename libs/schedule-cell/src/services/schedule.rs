use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::tenant::TenantId;

use crate::error::ScheduleError;
use crate::models::{
    DateOverride, OverrideDeleteScope, PutOverrideRequest, PutWeeklyRuleRequest, ScheduleBundle,
    ScheduleQuery, Slot, SlotQuery, WeeklyRule,
};
use crate::services::availability::compute_slots;
use crate::services::store::{OverrideDraft, ScheduleStore, WeeklyRuleDraft};

/// Weekly rules, date overrides and the slot listing built from them.
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    /// Bookable slots of one doctor. Rules, overrides and booking counts are
    /// read fresh on every call.
    pub async fn list_slots(&self, tenant: &TenantId, query: &SlotQuery) -> Result<Vec<Slot>, ScheduleError> {
        debug!(
            "Listing slots for doctor {} from {} to {}",
            query.doctor_id, query.start, query.end
        );
        query.validate()?;
        self.ensure_doctor(tenant, query.doctor_id).await?;

        let rules = self.store.list_weekly_rules(tenant, Some(query.doctor_id)).await?;
        let overrides = self
            .store
            .list_overrides(tenant, Some(query.doctor_id), Some(query.start), Some(query.end))
            .await?;
        let booked = self
            .store
            .booked_counts(tenant, query.doctor_id, query.start, query.end)
            .await?;

        let slots = compute_slots(query.doctor_id, query.start, query.end, &rules, &overrides, &booked);
        debug!("Found {} slots", slots.len());
        Ok(slots)
    }

    /// Doctors, weekly rules and overrides for calendar rendering.
    pub async fn get_schedule(&self, tenant: &TenantId, query: &ScheduleQuery) -> Result<ScheduleBundle, ScheduleError> {
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if end < start {
                return Err(ScheduleError::validation("end date must not be before start date"));
            }
        }

        let mut doctors = self.store.list_doctors(tenant).await?;
        if let Some(doctor_id) = query.doctor_id {
            doctors.retain(|d| d.id == doctor_id);
        }
        let weekly_rules = self.store.list_weekly_rules(tenant, query.doctor_id).await?;
        let overrides = self
            .store
            .list_overrides(tenant, query.doctor_id, query.start, query.end)
            .await?;

        Ok(ScheduleBundle {
            doctors,
            weekly_rules,
            overrides,
        })
    }

    pub async fn put_weekly_rule(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        weekday: u8,
        request: PutWeeklyRuleRequest,
    ) -> Result<WeeklyRule, ScheduleError> {
        request.validate(weekday)?;
        self.ensure_doctor(tenant, doctor_id).await?;

        let rule = self
            .store
            .upsert_weekly_rule(
                tenant,
                WeeklyRuleDraft {
                    doctor_id,
                    weekday,
                    enabled: request.enabled,
                    start_time: request.start_time,
                    end_time: request.end_time,
                    slot_minutes: request.slot_minutes,
                    capacity: request.capacity,
                },
            )
            .await?;

        info!("Weekly rule saved for doctor {} weekday {}", doctor_id, weekday);
        Ok(rule)
    }

    pub async fn delete_weekly_rule(&self, tenant: &TenantId, doctor_id: Uuid, weekday: u8) -> Result<(), ScheduleError> {
        if !self.store.delete_weekly_rule(tenant, doctor_id, weekday).await? {
            return Err(ScheduleError::NotFound(format!(
                "No weekly rule for doctor {} on weekday {}",
                doctor_id, weekday
            )));
        }
        info!("Weekly rule removed for doctor {} weekday {}", doctor_id, weekday);
        Ok(())
    }

    /// Replaces the override of (doctor, date, slot_name); never merges with
    /// the row it replaces.
    pub async fn put_override(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        date: NaiveDate,
        request: PutOverrideRequest,
    ) -> Result<DateOverride, ScheduleError> {
        request.validate()?;
        let slot_name = request.normalized_slot_name()?;
        self.ensure_doctor(tenant, doctor_id).await?;

        let row = self
            .store
            .replace_override(
                tenant,
                OverrideDraft {
                    doctor_id,
                    override_date: date,
                    override_type: request.override_type,
                    slot_name,
                    start_time: request.start_time,
                    end_time: request.end_time,
                    slot_minutes: request.slot_minutes,
                    capacity: request.capacity,
                    memo: request.memo,
                },
            )
            .await?;

        info!(
            "Override {:?} saved for doctor {} on {} (band {:?})",
            row.override_type, doctor_id, date, row.slot_name
        );
        Ok(row)
    }

    pub async fn delete_override(
        &self,
        tenant: &TenantId,
        doctor_id: Uuid,
        date: NaiveDate,
        scope: OverrideDeleteScope,
    ) -> Result<usize, ScheduleError> {
        let removed = self.store.delete_overrides(tenant, doctor_id, date, &scope).await?;
        if removed == 0 {
            return Err(ScheduleError::NotFound(format!(
                "No override for doctor {} on {} matching {:?}",
                doctor_id, date, scope
            )));
        }
        info!("Removed {} override(s) for doctor {} on {}", removed, doctor_id, date);
        Ok(removed)
    }

    async fn ensure_doctor(&self, tenant: &TenantId, doctor_id: Uuid) -> Result<(), ScheduleError> {
        match self.store.get_doctor(tenant, doctor_id).await? {
            Some(_) => Ok(()),
            None => Err(ScheduleError::NotFound(format!("Doctor {} not found", doctor_id))),
        }
    }
}
