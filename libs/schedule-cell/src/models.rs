use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::calendar::{clock_time, MonthKey};
use shared_models::tenant::TenantId;

use crate::error::ScheduleError;

pub const DEFAULT_SLOT_MINUTES: i32 = 15;
pub const DEFAULT_CAPACITY: i32 = 2;
/// Longest date range a single slot listing may cover.
pub const MAX_SLOT_RANGE_DAYS: i64 = 92;
const MAX_SLOT_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Recurring availability of one doctor on one weekday (0 = Sunday).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyRule {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub doctor_id: Uuid,
    pub weekday: u8,
    pub enabled: bool,
    #[serde(default, with = "clock_time::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock_time::option")]
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub capacity: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    Closed,
    Open,
    Modify,
}

/// Per-date exception for one doctor. `slot_name` = `None` is the unnamed
/// base band; every (doctor, date, slot_name) has at most one row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateOverride {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub doctor_id: Uuid,
    pub override_date: NaiveDate,
    pub override_type: OverrideType,
    pub slot_name: Option<String>,
    #[serde(default, with = "clock_time::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock_time::option")]
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub capacity: Option<i32>,
    pub memo: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DateOverride {
    pub fn same_key(&self, doctor_id: Uuid, date: NaiveDate, slot_name: Option<&str>) -> bool {
        self.doctor_id == doctor_id
            && self.override_date == date
            && self.slot_name.as_deref() == slot_name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingOpenSetting {
    pub tenant_id: TenantId,
    pub target_month: MonthKey,
    pub is_open: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingWindowStatus {
    pub month: MonthKey,
    pub is_open: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
}

impl BookingWindowStatus {
    pub fn gated(month: MonthKey) -> Self {
        Self {
            month,
            is_open: false,
            opened_at: None,
            memo: None,
        }
    }
}

impl From<BookingOpenSetting> for BookingWindowStatus {
    fn from(setting: BookingOpenSetting) -> Self {
        Self {
            month: setting.target_month,
            is_open: setting.is_open,
            opened_at: setting.opened_at,
            memo: setting.memo,
        }
    }
}

/// One bookable unit as shown to patients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    pub remaining_capacity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBundle {
    pub doctors: Vec<Doctor>,
    pub weekly_rules: Vec<WeeklyRule>,
    pub overrides: Vec<DateOverride>,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SlotQuery {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.end < self.start {
            return Err(ScheduleError::validation("end date must not be before start date"));
        }
        if (self.end - self.start).num_days() >= MAX_SLOT_RANGE_DAYS {
            return Err(ScheduleError::validation(format!(
                "date range must be shorter than {} days",
                MAX_SLOT_RANGE_DAYS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleQuery {
    pub doctor_id: Option<Uuid>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutWeeklyRuleRequest {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, with = "clock_time::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock_time::option")]
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub capacity: Option<i32>,
}

impl PutWeeklyRuleRequest {
    pub fn validate(&self, weekday: u8) -> Result<(), ScheduleError> {
        if weekday > 6 {
            return Err(ScheduleError::validation(
                "weekday must be between 0 (Sunday) and 6 (Saturday)",
            ));
        }
        validate_positive("slot_minutes", self.slot_minutes)?;
        validate_non_negative("capacity", self.capacity)?;

        if self.enabled {
            match (self.start_time, self.end_time) {
                (Some(start), Some(end)) if start < end => {}
                (Some(_), Some(_)) => {
                    return Err(ScheduleError::validation("start_time must be before end_time"))
                }
                _ => {
                    return Err(ScheduleError::validation(
                        "enabled weekly rules require start_time and end_time",
                    ))
                }
            }
        } else if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                return Err(ScheduleError::validation("start_time must be before end_time"));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutOverrideRequest {
    pub override_type: OverrideType,
    #[serde(default)]
    pub slot_name: Option<String>,
    #[serde(default, with = "clock_time::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock_time::option")]
    pub end_time: Option<NaiveTime>,
    pub slot_minutes: Option<i32>,
    pub capacity: Option<i32>,
    pub memo: Option<String>,
}

impl PutOverrideRequest {
    /// Trimmed band name; blank names address the unnamed base band.
    pub fn normalized_slot_name(&self) -> Result<Option<String>, ScheduleError> {
        normalize_slot_name(self.slot_name.as_deref())
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.normalized_slot_name()?;
        validate_positive("slot_minutes", self.slot_minutes)?;
        validate_non_negative("capacity", self.capacity)?;

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                return Err(ScheduleError::validation("start_time must be before end_time"));
            }
        }

        Ok(())
    }
}

/// Which override rows of one date a delete removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideDeleteScope {
    Band(String),
    Base,
    All,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteOverrideQuery {
    pub slot_name: Option<String>,
    pub delete_all: Option<bool>,
}

impl DeleteOverrideQuery {
    pub fn scope(&self) -> Result<OverrideDeleteScope, ScheduleError> {
        if self.delete_all.unwrap_or(false) {
            return Ok(OverrideDeleteScope::All);
        }
        Ok(match normalize_slot_name(self.slot_name.as_deref())? {
            Some(name) => OverrideDeleteScope::Band(name),
            None => OverrideDeleteScope::Base,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenWindowRequest {
    pub memo: Option<String>,
}

fn default_true() -> bool {
    true
}

pub fn normalize_slot_name(raw: Option<&str>) -> Result<Option<String>, ScheduleError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) if name.chars().count() > MAX_SLOT_NAME_LEN => Err(ScheduleError::validation(
            format!("slot_name must be at most {} characters", MAX_SLOT_NAME_LEN),
        )),
        Some(name) => Ok(Some(name.to_string())),
    }
}

fn validate_positive(field: &str, value: Option<i32>) -> Result<(), ScheduleError> {
    match value {
        Some(v) if v <= 0 => Err(ScheduleError::validation(format!("{} must be greater than 0", field))),
        _ => Ok(()),
    }
}

fn validate_non_negative(field: &str, value: Option<i32>) -> Result<(), ScheduleError> {
    match value {
        Some(v) if v < 0 => Err(ScheduleError::validation(format!("{} must not be negative", field))),
        _ => Ok(()),
    }
}
