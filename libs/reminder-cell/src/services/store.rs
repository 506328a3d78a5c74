use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use shared_models::reservation::Reservation;
use shared_models::tenant::TenantId;

use crate::error::ReminderError;
use crate::models::{LogEntry, NewScheduledMessage, ReminderRule, ReminderRuleDraft, ScheduledMessage, TimingType};

#[async_trait]
pub trait ReminderRuleStore: Send + Sync {
    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<ReminderRule>, ReminderError>;

    async fn get_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<Option<ReminderRule>, ReminderError>;

    async fn create_rule(&self, tenant: &TenantId, draft: ReminderRuleDraft) -> Result<ReminderRule, ReminderError>;

    /// `None` when the rule does not exist.
    async fn update_rule(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        draft: ReminderRuleDraft,
    ) -> Result<Option<ReminderRule>, ReminderError>;

    /// Returns whether a rule was removed.
    async fn delete_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<bool, ReminderError>;

    async fn enabled_rules(&self, tenant: &TenantId, timing_type: TimingType) -> Result<Vec<ReminderRule>, ReminderError>;

    /// System scan for the daily pass; each rule carries its tenant.
    async fn enabled_fixed_time_rules_all_tenants(&self) -> Result<Vec<ReminderRule>, ReminderError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Records the (rule, reservation) sent-log and its message as one unit.
    /// Returns `None` when the pair was already scheduled.
    async fn schedule_once(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        reservation_id: Uuid,
        message: NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, ReminderError>;

    async fn get_message(&self, tenant: &TenantId, message_id: Uuid) -> Result<Option<ScheduledMessage>, ReminderError>;

    /// Oldest-first `scheduled` messages due at `now`, across tenants.
    async fn due_messages_all_tenants(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, ReminderError>;

    /// Conditional `scheduled -> sending`; true for exactly one caller.
    async fn claim_message(
        &self,
        tenant: &TenantId,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ReminderError>;

    async fn mark_sent(
        &self,
        tenant: &TenantId,
        message_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ReminderError>;

    async fn mark_failed(&self, tenant: &TenantId, message_id: Uuid, error: &str) -> Result<(), ReminderError>;

    /// Fails messages stuck in `sending` since before `cutoff`.
    async fn fail_stale_sending_all_tenants(&self, cutoff: DateTime<Utc>) -> Result<usize, ReminderError>;

    async fn log_entries(
        &self,
        tenant: &TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>, ReminderError>;
}

/// Read side of the reservation path.
#[async_trait]
pub trait ReservationDirectory: Send + Sync {
    /// Active reservations on one clinic-local date.
    async fn reservations_on(&self, tenant: &TenantId, date: NaiveDate) -> Result<Vec<Reservation>, ReminderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn get_name(&self, tenant: &TenantId, patient_id: Uuid) -> Result<Option<String>, ReminderError>;
}
