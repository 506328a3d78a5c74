use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::calendar::ClinicClock;
use shared_models::tenant::TenantId;

use crate::error::ReminderError;
use crate::models::{LogEntry, MessageStatus, ReminderLogSummary, ReminderRule, ReminderRuleRequest};
use crate::services::store::{MessageStore, ReminderRuleStore};

/// Groups sent-log entries by rule and clinic-local day. Messages still
/// `sending` count as scheduled until they reach a terminal state.
pub fn summarize_logs(
    entries: &[LogEntry],
    rule_names: &HashMap<Uuid, String>,
    clock: &ClinicClock,
) -> Vec<ReminderLogSummary> {
    let mut groups: BTreeMap<(Uuid, NaiveDate), ReminderLogSummary> = BTreeMap::new();

    for entry in entries {
        let day = clock.local_date(entry.created_at);
        let summary = groups
            .entry((entry.rule_id, day))
            .or_insert_with(|| ReminderLogSummary {
                rule_id: entry.rule_id,
                rule_name: rule_names.get(&entry.rule_id).cloned(),
                day,
                total: 0,
                sent: 0,
                failed: 0,
                scheduled: 0,
            });

        summary.total += 1;
        match entry.status {
            Some(MessageStatus::Sent) => summary.sent += 1,
            Some(MessageStatus::Failed) => summary.failed += 1,
            Some(MessageStatus::Scheduled) | Some(MessageStatus::Sending) => summary.scheduled += 1,
            None => {}
        }
    }

    let mut summaries: Vec<ReminderLogSummary> = groups.into_values().collect();
    summaries.sort_by(|a, b| b.day.cmp(&a.day).then(a.rule_id.cmp(&b.rule_id)));
    summaries
}

/// Reminder rule administration and delivery reporting.
pub struct ReminderService {
    rules: Arc<dyn ReminderRuleStore>,
    messages: Arc<dyn MessageStore>,
    clock: ClinicClock,
}

impl ReminderService {
    pub fn new(rules: Arc<dyn ReminderRuleStore>, messages: Arc<dyn MessageStore>, clock: ClinicClock) -> Self {
        Self { rules, messages, clock }
    }

    pub async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<ReminderRule>, ReminderError> {
        self.rules.list_rules(tenant).await
    }

    pub async fn get_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<ReminderRule, ReminderError> {
        self.rules
            .get_rule(tenant, rule_id)
            .await?
            .ok_or_else(|| ReminderError::NotFound(format!("reminder rule {} not found", rule_id)))
    }

    pub async fn create_rule(
        &self,
        tenant: &TenantId,
        request: ReminderRuleRequest,
    ) -> Result<ReminderRule, ReminderError> {
        let draft = request.into_draft()?;
        let rule = self.rules.create_rule(tenant, draft).await?;
        info!("Created reminder rule {} '{}' (tenant {})", rule.id, rule.name, tenant);
        Ok(rule)
    }

    /// Already scheduled messages keep their content; the edit applies to
    /// reservations evaluated afterwards.
    pub async fn update_rule(
        &self,
        tenant: &TenantId,
        rule_id: Uuid,
        request: ReminderRuleRequest,
    ) -> Result<ReminderRule, ReminderError> {
        let draft = request.into_draft()?;
        let rule = self
            .rules
            .update_rule(tenant, rule_id, draft)
            .await?
            .ok_or_else(|| ReminderError::NotFound(format!("reminder rule {} not found", rule_id)))?;
        info!("Updated reminder rule {} (tenant {})", rule_id, tenant);
        Ok(rule)
    }

    pub async fn delete_rule(&self, tenant: &TenantId, rule_id: Uuid) -> Result<(), ReminderError> {
        if !self.rules.delete_rule(tenant, rule_id).await? {
            return Err(ReminderError::NotFound(format!("reminder rule {} not found", rule_id)));
        }
        info!("Deleted reminder rule {} (tenant {})", rule_id, tenant);
        Ok(())
    }

    /// Per-rule, per-day delivery counts, newest day first. `since` is a
    /// clinic-local date.
    pub async fn logs(
        &self,
        tenant: &TenantId,
        since: Option<NaiveDate>,
    ) -> Result<Vec<ReminderLogSummary>, ReminderError> {
        debug!("Summarizing reminder logs for tenant {} since {:?}", tenant, since);

        let since = since.map(|day| self.clock.instant(day, NaiveTime::default()));
        let entries = self.messages.log_entries(tenant, since).await?;
        let names: HashMap<Uuid, String> = self
            .rules
            .list_rules(tenant)
            .await?
            .into_iter()
            .map(|rule| (rule.id, rule.name))
            .collect();

        Ok(summarize_logs(&entries, &names, &self.clock))
    }
}
