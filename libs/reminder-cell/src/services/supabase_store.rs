use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{encode_filter_value, SupabaseClient};
use shared_models::reservation::Reservation;
use shared_models::tenant::TenantId;

use crate::error::ReminderError;
use crate::models::{
    LogEntry, MessageStatus, NewScheduledMessage, ReminderRule, ReminderRuleDraft, ScheduledMessage,
    TimingType,
};
use crate::services::dispatcher::INTERRUPTED;
use crate::services::store::{MessageStore, PatientDirectory, ReminderRuleStore, ReservationDirectory};

const REMINDER_RULES: &str = "reminder_rules";
const SCHEDULED_MESSAGES: &str = "scheduled_messages";
const REMINDER_SENT_LOGS: &str = "reminder_sent_logs";
const RESERVATIONS: &str = "reservations";
const PATIENTS: &str = "patients";

const SENT_LOG_KEY: &str = "tenant_id,rule_id,reservation_id";
const RESERVATION_COLUMNS: &str =
    "id,tenant_id,patient_id,doctor_id,doctor_name,reservation_date,reservation_time,status,destination_id";

/// Reminder tables behind Supabase PostgREST.
pub struct SupabaseReminderStore {
    supabase: SupabaseClient,
}

impl SupabaseReminderStore {
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

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_filter(instant: DateTime<Utc>) -> String {
    encode_filter_value(&timestamp(instant))
}

fn draft_row(tenant: &TenantId, draft: &ReminderRuleDraft) -> Value {
    json!({
        "tenant_id": tenant,
        "name": draft.name,
        "timing_type": draft.timing_type,
        "timing_value": draft.timing_value,
        "send_hour": draft.send_hour,
        "send_minute": draft.send_minute,
        "target_day_offset": draft.target_day_offset,
        "message_format": draft.message_format,
        "message_template": draft.message_template,
        "flex_template": draft.flex_template,
        "is_enabled": draft.is_enabled,
        "updated_at": timestamp(Utc::now()),
    })
}

#[async_trait]
impl ReminderRuleStore for SupabaseReminderStore {
    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<ReminderRule>, ReminderError> {
        let query = format!("{}&order=created_at.asc", tenant_filter(tenant));
        Ok(self.supabase.select(REMINDER_RULES, &query).await?)
    }

    async fn get_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<Option<ReminderRule>, ReminderError> {
        let query = format!("{}&id=eq.{}", tenant_filter(tenant), rule_id);
        let rows: Vec<ReminderRule> = self.supabase.select(REMINDER_RULES, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn create_rule(&self, tenant: &TenantId, draft: ReminderRuleDraft) -> Result<ReminderRule, ReminderError> {
        debug!("Creating reminder rule '{}' for tenant {}", draft.name, tenant);

        let rows: Vec<ReminderRule> = self
            .supabase
            .insert(REMINDER_RULES, draft_row(tenant, &draft))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ReminderError::Database(anyhow!("reminder rule insert returned no row")))
    }

    async fn update_rule(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        draft: ReminderRuleDraft,
    ) -> Result<Option<ReminderRule>, ReminderError> {
        let query = format!("{}&id=eq.{}", tenant_filter(tenant), rule_id);
        let rows: Vec<ReminderRule> = self
            .supabase
            .update(REMINDER_RULES, &query, draft_row(tenant, &draft))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<bool, ReminderError> {
        let query = format!("{}&id=eq.{}", tenant_filter(tenant), rule_id);
        let removed: Vec<Value> = self.supabase.delete(REMINDER_RULES, &query).await?;
        Ok(!removed.is_empty())
    }

    async fn enabled_rules(&self, tenant: &TenantId, timing_type: TimingType) -> Result<Vec<ReminderRule>, ReminderError> {
        let timing = match timing_type {
            TimingType::BeforeHours => "before_hours",
            TimingType::FixedTime => "fixed_time",
        };
        let query = format!(
            "{}&is_enabled=eq.true&timing_type=eq.{}&order=created_at.asc",
            tenant_filter(tenant),
            timing
        );
        Ok(self.supabase.select(REMINDER_RULES, &query).await?)
    }

    async fn enabled_fixed_time_rules_all_tenants(&self) -> Result<Vec<ReminderRule>, ReminderError> {
        Ok(self
            .supabase
            .select(
                REMINDER_RULES,
                "is_enabled=eq.true&timing_type=eq.fixed_time&order=tenant_id.asc,created_at.asc",
            )
            .await?)
    }
}

#[async_trait]
impl MessageStore for SupabaseReminderStore {
    async fn schedule_once(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        reservation_id: Uuid,
        message: NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, ReminderError> {
        // The sent-log row is the idempotency key; it is written first so a
        // concurrent evaluation of the same pair loses before any message exists.
        let log_row = json!({
            "tenant_id": tenant,
            "rule_id": rule_id,
            "reservation_id": reservation_id,
        });
        let inserted: Vec<Value> = self
            .supabase
            .insert_ignoring_duplicates(REMINDER_SENT_LOGS, SENT_LOG_KEY, log_row)
            .await?;
        if inserted.is_empty() {
            debug!("Rule {} already scheduled for reservation {}", rule_id, reservation_id);
            return Ok(None);
        }

        let log_query = format!(
            "{}&rule_id=eq.{}&reservation_id=eq.{}",
            tenant_filter(tenant),
            rule_id,
            reservation_id
        );

        let message_row = json!({
            "tenant_id": tenant,
            "patient_id": message.patient_id,
            "destination_id": message.destination_id,
            "content": message.content,
            "flex_payload": message.flex_payload,
            "scheduled_at": timestamp(message.scheduled_at),
            "status": MessageStatus::Scheduled,
        });
        let created: Result<Vec<ScheduledMessage>, _> =
            self.supabase.insert(SCHEDULED_MESSAGES, message_row).await;

        let scheduled = match created.map(|rows| rows.into_iter().next()) {
            Ok(Some(row)) => row,
            failed => {
                // Release the key so a later evaluation can schedule the pair.
                if let Err(e) = self
                    .supabase
                    .delete::<Value>(REMINDER_SENT_LOGS, &log_query)
                    .await
                {
                    error!("Failed to release sent-log for rule {}: {}", rule_id, e);
                }
                return Err(match failed {
                    Err(e) => ReminderError::Database(e),
                    _ => ReminderError::Database(anyhow!("scheduled message insert returned no row")),
                });
            }
        };

        let _: Vec<Value> = self
            .supabase
            .update(
                REMINDER_SENT_LOGS,
                &log_query,
                json!({ "scheduled_message_id": scheduled.id }),
            )
            .await?;

        Ok(Some(scheduled))
    }

    async fn get_message(&self, tenant: &TenantId, message_id: Uuid) -> Result<Option<ScheduledMessage>, ReminderError> {
        let query = format!("{}&id=eq.{}", tenant_filter(tenant), message_id);
        let rows: Vec<ScheduledMessage> = self.supabase.select(SCHEDULED_MESSAGES, &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn due_messages_all_tenants(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, ReminderError> {
        let query = format!(
            "status=eq.scheduled&scheduled_at=lte.{}&order=scheduled_at.asc,created_at.asc&limit={}",
            timestamp_filter(now),
            limit
        );
        Ok(self.supabase.select(SCHEDULED_MESSAGES, &query).await?)
    }

    async fn claim_message(
        &self,
        tenant: &TenantId,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ReminderError> {
        let query = format!(
            "{}&id=eq.{}&status=eq.scheduled",
            tenant_filter(tenant),
            message_id
        );
        let claimed: Vec<Value> = self
            .supabase
            .update(
                SCHEDULED_MESSAGES,
                &query,
                json!({ "status": MessageStatus::Sending, "claimed_at": timestamp(now) }),
            )
            .await?;
        Ok(!claimed.is_empty())
    }

    async fn mark_sent(
        &self,
        tenant: &TenantId,
        message_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), ReminderError> {
        let query = format!(
            "{}&id=eq.{}&status=eq.sending",
            tenant_filter(tenant),
            message_id
        );
        let updated: Vec<Value> = self
            .supabase
            .update(
                SCHEDULED_MESSAGES,
                &query,
                json!({ "status": MessageStatus::Sent, "sent_at": timestamp(sent_at) }),
            )
            .await?;
        if updated.is_empty() {
            warn!("Message {} was no longer sending when marked sent", message_id);
        }
        Ok(())
    }

    async fn mark_failed(&self, tenant: &TenantId, message_id: Uuid, error: &str) -> Result<(), ReminderError> {
        let query = format!(
            "{}&id=eq.{}&status=in.(scheduled,sending)",
            tenant_filter(tenant),
            message_id
        );
        let _: Vec<Value> = self
            .supabase
            .update(
                SCHEDULED_MESSAGES,
                &query,
                json!({ "status": MessageStatus::Failed, "error_message": error }),
            )
            .await?;
        Ok(())
    }

    async fn fail_stale_sending_all_tenants(&self, cutoff: DateTime<Utc>) -> Result<usize, ReminderError> {
        let query = format!("status=eq.sending&claimed_at=lt.{}", timestamp_filter(cutoff));
        let failed: Vec<Value> = self
            .supabase
            .update(
                SCHEDULED_MESSAGES,
                &query,
                json!({ "status": MessageStatus::Failed, "error_message": INTERRUPTED }),
            )
            .await?;
        Ok(failed.len())
    }

    async fn log_entries(
        &self,
        tenant: &TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEntry>, ReminderError> {
        let mut query = format!(
            "select=rule_id,created_at,scheduled_messages(status)&{}&order=created_at.asc",
            tenant_filter(tenant)
        );
        if let Some(since) = since {
            query.push_str(&format!("&created_at=gte.{}", timestamp_filter(since)));
        }

        let rows: Vec<LogRow> = self.supabase.select(REMINDER_SENT_LOGS, &query).await?;
        Ok(rows
            .into_iter()
            .map(|row| LogEntry {
                rule_id: row.rule_id,
                created_at: row.created_at,
                status: row.scheduled_messages.map(|m| m.status),
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct LogRow {
    rule_id: Uuid,
    created_at: DateTime<Utc>,
    scheduled_messages: Option<StatusRow>,
}

#[derive(Deserialize)]
struct StatusRow {
    status: MessageStatus,
}

#[async_trait]
impl ReservationDirectory for SupabaseReminderStore {
    async fn reservations_on(&self, tenant: &TenantId, date: NaiveDate) -> Result<Vec<Reservation>, ReminderError> {
        let query = format!(
            "select={}&{}&reservation_date=eq.{}&status=neq.cancelled&order=reservation_time.asc",
            RESERVATION_COLUMNS,
            tenant_filter(tenant),
            date
        );
        Ok(self.supabase.select(RESERVATIONS, &query).await?)
    }
}

#[derive(Deserialize)]
struct NameRow {
    name: Option<String>,
}

#[async_trait]
impl PatientDirectory for SupabaseReminderStore {
    async fn get_name(&self, tenant: &TenantId, patient_id: Uuid) -> Result<Option<String>, ReminderError> {
        let query = format!("select=name&{}&id=eq.{}", tenant_filter(tenant), patient_id);
        let rows: Vec<NameRow> = self.supabase.select(PATIENTS, &query).await?;
        Ok(rows.into_iter().next().and_then(|row| row.name))
    }
}
