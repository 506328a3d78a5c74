use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use shared_models::reservation::Reservation;
use shared_models::tenant::TenantId;

use crate::error::ReminderError;
use crate::models::{
    LogEntry, MessageStatus, NewScheduledMessage, ReminderRule, ReminderRuleDraft, ReminderSentLog,
    ScheduledMessage, TimingType,
};
use crate::services::store::{MessageStore, PatientDirectory, ReminderRuleStore, ReservationDirectory};

#[derive(Default)]
struct State {
    rules: Vec<ReminderRule>,
    messages: Vec<ScheduledMessage>,
    sent_logs: Vec<ReminderSentLog>,
    reservations: Vec<Reservation>,
    patients: HashMap<(TenantId, Uuid), String>,
}

/// Process-local reminder store. One mutex guards every table, so the
/// log-then-message write and the claim transition are atomic.
#[derive(Default)]
pub struct InMemoryReminderStore {
    state: Mutex<State>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_reservation(&self, reservation: Reservation) {
        self.state.lock().await.reservations.push(reservation);
    }

    pub async fn set_patient_name(&self, tenant: &TenantId, patient_id: Uuid, name: &str) {
        self.state
            .lock()
            .await
            .patients
            .insert((tenant.clone(), patient_id), name.to_string());
    }

    pub async fn messages(&self, tenant: &TenantId) -> Vec<ScheduledMessage> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| &m.tenant_id == tenant)
            .cloned()
            .collect()
    }

    /// Moves a message's due time; used to simulate time passing.
    pub async fn reschedule(&self, message_id: Uuid, scheduled_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) {
            message.scheduled_at = scheduled_at;
        }
    }
}

fn rule_from_draft(id: Uuid, tenant: &TenantId, draft: ReminderRuleDraft, created_at: DateTime<Utc>) -> ReminderRule {
    ReminderRule {
        id,
        tenant_id: tenant.clone(),
        name: draft.name,
        timing_type: draft.timing_type,
        timing_value: draft.timing_value,
        send_hour: draft.send_hour,
        send_minute: draft.send_minute,
        target_day_offset: draft.target_day_offset,
        message_format: draft.message_format,
        message_template: draft.message_template,
        flex_template: draft.flex_template,
        is_enabled: draft.is_enabled,
        created_at,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl ReminderRuleStore for InMemoryReminderStore {
    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<ReminderRule>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state.rules.iter().filter(|r| &r.tenant_id == tenant).cloned().collect())
    }

    async fn get_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<Option<ReminderRule>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state
            .rules
            .iter()
            .find(|r| &r.tenant_id == tenant && r.id == rule_id)
            .cloned())
    }

    async fn create_rule(&self, tenant: &TenantId, draft: ReminderRuleDraft) -> Result<ReminderRule, ReminderError> {
        let rule = rule_from_draft(Uuid::new_v4(), tenant, draft, Utc::now());
        self.state.lock().await.rules.push(rule.clone());
        Ok(rule)
    }

    async fn update_rule(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        draft: ReminderRuleDraft,
    ) -> Result<Option<ReminderRule>, ReminderError> {
        let mut state = self.state.lock().await;
        let Some(existing) = state
            .rules
            .iter_mut()
            .find(|r| &r.tenant_id == tenant && r.id == rule_id)
        else {
            return Ok(None);
        };

        *existing = rule_from_draft(rule_id, tenant, draft, existing.created_at);
        Ok(Some(existing.clone()))
    }

    async fn delete_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<bool, ReminderError> {
        let mut state = self.state.lock().await;
        let before = state.rules.len();
        state.rules.retain(|r| !(&r.tenant_id == tenant && r.id == rule_id));
        let removed = state.rules.len() < before;
        if removed {
            state
                .sent_logs
                .retain(|l| !(&l.tenant_id == tenant && l.rule_id == rule_id));
        }
        Ok(removed)
    }

    async fn enabled_rules(&self, tenant: &TenantId, timing_type: TimingType) -> Result<Vec<ReminderRule>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state
            .rules
            .iter()
            .filter(|r| &r.tenant_id == tenant && r.is_enabled && r.timing_type == timing_type)
            .cloned()
            .collect())
    }

    async fn enabled_fixed_time_rules_all_tenants(&self) -> Result<Vec<ReminderRule>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state
            .rules
            .iter()
            .filter(|r| r.is_enabled && r.timing_type == TimingType::FixedTime)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageStore for InMemoryReminderStore {
    async fn schedule_once(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        reservation_id: Uuid,
        message: NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, ReminderError> {
        let mut state = self.state.lock().await;
        let exists = state.sent_logs.iter().any(|l| {
            &l.tenant_id == tenant && l.rule_id == rule_id && l.reservation_id == reservation_id
        });
        if exists {
            return Ok(None);
        }

        let now = Utc::now();
        let row = ScheduledMessage {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            patient_id: message.patient_id,
            destination_id: message.destination_id,
            content: message.content,
            flex_payload: message.flex_payload,
            scheduled_at: message.scheduled_at,
            status: MessageStatus::Scheduled,
            claimed_at: None,
            sent_at: None,
            error_message: None,
            created_at: now,
        };
        state.sent_logs.push(ReminderSentLog {
            tenant_id: tenant.clone(),
            rule_id,
            reservation_id,
            scheduled_message_id: Some(row.id),
            created_at: now,
        });
        state.messages.push(row.clone());
        Ok(Some(row))
    }

    async fn get_message(&self, tenant: &TenantId, message_id: Uuid) -> Result<Option<ScheduledMessage>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .find(|m| &m.tenant_id == tenant && m.id == message_id)
            .cloned())
    }

    async fn due_messages_all_tenants(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, ReminderError> {
        let state = self.state.lock().await;
        let mut due: Vec<ScheduledMessage> = state
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Scheduled && m.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|m| (m.scheduled_at, m.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_message(
        &self,
        tenant: &TenantId,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ReminderError> {
        let mut state = self.state.lock().await;
        match state.messages.iter_mut().find(|m| {
            &m.tenant_id == tenant && m.id == message_id && m.status == MessageStatus::Scheduled
        }) {
            Some(message) => {
                message.status = MessageStatus::Sending;
                message.claimed_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_sent(
        &self,
        tenant: &TenantId,
        message_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ReminderError> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| {
            &m.tenant_id == tenant && m.id == message_id && m.status == MessageStatus::Sending
        }) {
            message.status = MessageStatus::Sent;
            message.sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn mark_failed(&self, tenant: &TenantId, message_id: Uuid, error: &str) -> Result<(), ReminderError> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| {
            &m.tenant_id == tenant
                && m.id == message_id
                && matches!(m.status, MessageStatus::Scheduled | MessageStatus::Sending)
        }) {
            message.status = MessageStatus::Failed;
            message.error_message = Some(error.to_string());
        }
        Ok(())
    }

    async fn fail_stale_sending_all_tenants(&self, cutoff: DateTime<Utc>) -> Result<usize, ReminderError> {
        let mut state = self.state.lock().await;
        let mut failed = 0;
        for message in state.messages.iter_mut().filter(|m| {
            m.status == MessageStatus::Sending && m.claimed_at.map_or(true, |at| at < cutoff)
        }) {
            message.status = MessageStatus::Failed;
            message.error_message = Some(super::dispatcher::INTERRUPTED.to_string());
            failed += 1;
        }
        Ok(failed)
    }

    async fn log_entries(
        &self,
        tenant: &TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state
            .sent_logs
            .iter()
            .filter(|l| &l.tenant_id == tenant && since.map_or(true, |s| l.created_at >= s))
            .map(|l| LogEntry {
                rule_id: l.rule_id,
                created_at: l.created_at,
                status: l
                    .scheduled_message_id
                    .and_then(|id| state.messages.iter().find(|m| m.id == id))
                    .map(|m| m.status),
            })
            .collect())
    }
}

#[async_trait]
impl ReservationDirectory for InMemoryReminderStore {
    async fn reservations_on(&self, tenant: &TenantId, date: NaiveDate) -> Result<Vec<Reservation>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .iter()
            .filter(|r| &r.tenant_id == tenant && r.reservation_date == date && r.is_active())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PatientDirectory for InMemoryReminderStore {
    async fn get_name(&self, tenant: &TenantId, patient_id: Uuid) -> Result<Option<String>, ReminderError> {
        let state = self.state.lock().await;
        Ok(state.patients.get(&(tenant.clone(), patient_id)).cloned())
    }
}
