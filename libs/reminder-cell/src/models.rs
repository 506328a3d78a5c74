use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::tenant::TenantId;

use crate::error::ReminderError;

pub const DEFAULT_SEND_MINUTE: i32 = 0;
pub const DEFAULT_TARGET_DAY_OFFSET: i32 = 1;
/// Upper bound for `before_hours` lead time (30 days).
pub const MAX_LEAD_HOURS: i32 = 720;
/// Upper bound for `fixed_time` target day offset.
pub const MAX_TARGET_DAY_OFFSET: i32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingType {
    BeforeHours,
    FixedTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    Text,
    Flex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderRule {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub timing_type: TimingType,
    /// Hours before the appointment (`before_hours` only).
    pub timing_value: Option<i32>,
    pub send_hour: Option<i32>,
    #[serde(default)]
    pub send_minute: i32,
    #[serde(default = "default_target_day_offset")]
    pub target_day_offset: i32,
    #[serde(default)]
    pub message_format: MessageFormat,
    pub message_template: Option<String>,
    pub flex_template: Option<Value>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_target_day_offset() -> i32 {
    DEFAULT_TARGET_DAY_OFFSET
}

/// Validated rule fields with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderRuleDraft {
    pub name: String,
    pub timing_type: TimingType,
    pub timing_value: Option<i32>,
    pub send_hour: Option<i32>,
    pub send_minute: i32,
    pub target_day_offset: i32,
    pub message_format: MessageFormat,
    pub message_template: Option<String>,
    pub flex_template: Option<Value>,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRuleRequest {
    pub name: String,
    pub timing_type: TimingType,
    pub timing_value: Option<i32>,
    pub send_hour: Option<i32>,
    pub send_minute: Option<i32>,
    pub target_day_offset: Option<i32>,
    pub message_format: Option<MessageFormat>,
    pub message_template: Option<String>,
    pub flex_template: Option<Value>,
    pub is_enabled: Option<bool>,
}

impl ReminderRuleRequest {
    pub fn into_draft(self) -> Result<ReminderRuleDraft, ReminderError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ReminderError::validation("name is required"));
        }

        let message_format = self.message_format.unwrap_or_default();
        let message_template = self
            .message_template
            .filter(|template| !template.trim().is_empty());

        match message_format {
            MessageFormat::Text if message_template.is_none() => {
                return Err(ReminderError::validation(
                    "message_template is required for text reminders",
                ));
            }
            MessageFormat::Flex => match &self.flex_template {
                Some(Value::Object(_)) | Some(Value::Array(_)) => {}
                _ => {
                    return Err(ReminderError::validation(
                        "flex reminders require a flex_template object",
                    ))
                }
            },
            MessageFormat::Text => {}
        }

        let send_minute = self.send_minute.unwrap_or(DEFAULT_SEND_MINUTE);
        let target_day_offset = self.target_day_offset.unwrap_or(DEFAULT_TARGET_DAY_OFFSET);

        match self.timing_type {
            TimingType::BeforeHours => match self.timing_value {
                Some(hours) if (0..=MAX_LEAD_HOURS).contains(&hours) => {}
                Some(_) => {
                    return Err(ReminderError::validation(format!(
                        "timing_value must be between 0 and {} hours",
                        MAX_LEAD_HOURS
                    )))
                }
                None => {
                    return Err(ReminderError::validation(
                        "before_hours reminders require timing_value",
                    ))
                }
            },
            TimingType::FixedTime => {
                match self.send_hour {
                    Some(hour) if (0..24).contains(&hour) => {}
                    Some(_) => return Err(ReminderError::validation("send_hour must be between 0 and 23")),
                    None => return Err(ReminderError::validation("fixed_time reminders require send_hour")),
                }
                if !(0..60).contains(&send_minute) {
                    return Err(ReminderError::validation("send_minute must be between 0 and 59"));
                }
                if !(0..=MAX_TARGET_DAY_OFFSET).contains(&target_day_offset) {
                    return Err(ReminderError::validation(format!(
                        "target_day_offset must be between 0 and {}",
                        MAX_TARGET_DAY_OFFSET
                    )));
                }
            }
        }

        Ok(ReminderRuleDraft {
            name,
            timing_type: self.timing_type,
            timing_value: self.timing_value,
            send_hour: self.send_hour,
            send_minute,
            target_day_offset,
            message_format,
            message_template,
            flex_template: self.flex_template,
            is_enabled: self.is_enabled.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Scheduled,
    /// Claimed by one dispatcher run; delivery in progress.
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub patient_id: Uuid,
    pub destination_id: Option<String>,
    pub content: Option<String>,
    pub flex_payload: Option<Value>,
    pub scheduled_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub claimed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScheduledMessage {
    pub patient_id: Uuid,
    pub destination_id: Option<String>,
    pub content: Option<String>,
    pub flex_payload: Option<Value>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderSentLog {
    pub tenant_id: TenantId,
    pub rule_id: Uuid,
    pub reservation_id: Uuid,
    pub scheduled_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A sent-log row joined with the current status of its message.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub rule_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: Option<MessageStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderLogSummary {
    pub rule_id: Uuid,
    pub rule_name: Option<String>,
    pub day: NaiveDate,
    pub total: u32,
    pub sent: u32,
    pub failed: u32,
    pub scheduled: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub since: Option<NaiveDate>,
}
