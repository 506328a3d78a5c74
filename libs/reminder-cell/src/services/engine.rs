use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::future::try_join;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_models::calendar::ClinicClock;
use shared_models::reservation::Reservation;
use shared_models::tenant::TenantId;

use crate::error::ReminderError;
use crate::models::{MessageFormat, NewScheduledMessage, ReminderRule, TimingType};
use crate::services::store::{MessageStore, ReminderRuleStore, ReservationDirectory};
use crate::services::template::{render, render_json, reservation_vars};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(Uuid),
    AlreadyScheduled,
    Skipped(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixedTimePassSummary {
    pub rules: usize,
    pub reservations: usize,
    pub scheduled: usize,
    pub already_scheduled: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReservationHookSummary {
    pub scheduled: Vec<Uuid>,
    pub already_scheduled: usize,
    pub skipped: usize,
}

/// Turns reminder rules into scheduled messages, at most one per
/// (rule, reservation).
pub struct ReminderRuleEngine {
    rules: Arc<dyn ReminderRuleStore>,
    messages: Arc<dyn MessageStore>,
    reservations: Arc<dyn ReservationDirectory>,
    clock: ClinicClock,
}

impl ReminderRuleEngine {
    pub fn new(
        rules: Arc<dyn ReminderRuleStore>,
        messages: Arc<dyn MessageStore>,
        reservations: Arc<dyn ReservationDirectory>,
        clock: ClinicClock,
    ) -> Self {
        Self {
            rules,
            messages,
            reservations,
            clock,
        }
    }

    /// Send instant for `rule` against `reservation`, or why there is none.
    pub fn send_time(
        &self,
        rule: &ReminderRule,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, &'static str> {
        let appointment = self
            .clock
            .instant(reservation.reservation_date, reservation.reservation_time);
        if appointment <= now {
            return Err("appointment already started");
        }

        match rule.timing_type {
            TimingType::BeforeHours => {
                let hours = rule.timing_value.ok_or("rule has no timing_value")?;
                Ok((appointment - Duration::hours(i64::from(hours))).max(now))
            }
            TimingType::FixedTime => {
                let today = self.clock.today(now);
                let target = target_day(today, rule).ok_or("target day is out of range")?;
                if reservation.reservation_date != target {
                    return Err("reservation is not on the rule's target day");
                }

                let hour = rule.send_hour.ok_or("rule has no send_hour")?;
                let time = u32::try_from(hour)
                    .ok()
                    .zip(u32::try_from(rule.send_minute).ok())
                    .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
                    .ok_or("rule send time is out of range")?;
                let at = self.clock.instant(today, time);
                if at >= appointment {
                    return Err("send time is after the appointment");
                }
                Ok(at.max(now))
            }
        }
    }

    /// Idempotent entry point shared by the reservation hook and the daily pass.
    pub async fn schedule_for_reservation(
        &self,
        tenant: &TenantId,
        rule: &ReminderRule,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, ReminderError> {
        if &rule.tenant_id != tenant || &reservation.tenant_id != tenant {
            return Ok(ScheduleOutcome::Skipped("tenant mismatch"));
        }
        if !rule.is_enabled {
            return Ok(ScheduleOutcome::Skipped("rule disabled"));
        }
        if !reservation.is_active() {
            return Ok(ScheduleOutcome::Skipped("reservation cancelled"));
        }

        let scheduled_at = match self.send_time(rule, reservation, now) {
            Ok(at) => at,
            Err(reason) => return Ok(ScheduleOutcome::Skipped(reason)),
        };

        let vars = reservation_vars(reservation);
        let content = rule
            .message_template
            .as_deref()
            .map(|template| render(template, &vars));
        let flex_payload = match rule.message_format {
            MessageFormat::Flex => rule.flex_template.as_ref().map(|flex| render_json(flex, &vars)),
            MessageFormat::Text => None,
        };
        if content.is_none() && flex_payload.is_none() {
            return Ok(ScheduleOutcome::Skipped("rule has no message content"));
        }

        let message = NewScheduledMessage {
            patient_id: reservation.patient_id,
            destination_id: reservation.destination_id.clone(),
            content,
            flex_payload,
            scheduled_at,
        };

        match self
            .messages
            .schedule_once(tenant, rule.id, reservation.id, message)
            .await?
        {
            Some(scheduled) => {
                info!(
                    "Scheduled reminder {} (rule {}, reservation {}) at {}",
                    scheduled.id, rule.id, reservation.id, scheduled_at
                );
                Ok(ScheduleOutcome::Scheduled(scheduled.id))
            }
            None => Ok(ScheduleOutcome::AlreadyScheduled),
        }
    }

    /// Evaluates every enabled `before_hours` rule against a new reservation.
    /// `fixed_time` rules whose send time for this reservation is still ahead
    /// are evaluated too, so bookings made after the daily pass are covered.
    pub async fn on_reservation_created(
        &self,
        tenant: &TenantId,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<ReservationHookSummary, ReminderError> {
        debug!("Evaluating reminder rules for reservation {}", reservation.id);

        let (mut rules, fixed) = try_join(
            self.rules.enabled_rules(tenant, TimingType::BeforeHours),
            self.rules.enabled_rules(tenant, TimingType::FixedTime),
        )
        .await?;
        rules.extend(
            fixed
                .into_iter()
                .filter(|rule| matches!(self.send_time(rule, reservation, now), Ok(at) if at > now)),
        );

        let mut summary = ReservationHookSummary::default();
        for rule in &rules {
            match self.schedule_for_reservation(tenant, rule, reservation, now).await? {
                ScheduleOutcome::Scheduled(id) => summary.scheduled.push(id),
                ScheduleOutcome::AlreadyScheduled => summary.already_scheduled += 1,
                ScheduleOutcome::Skipped(reason) => {
                    debug!("Rule {} skipped for reservation {}: {}", rule.id, reservation.id, reason);
                    summary.skipped += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Daily pass: matches every tenant's `fixed_time` rules against the
    /// reservations on `today + target_day_offset`. Safe to re-run.
    #[instrument(skip(self))]
    pub async fn run_fixed_time_pass(&self, now: DateTime<Utc>) -> Result<FixedTimePassSummary, ReminderError> {
        let rules = self.rules.enabled_fixed_time_rules_all_tenants().await?;
        let today = self.clock.today(now);

        let mut summary = FixedTimePassSummary {
            rules: rules.len(),
            ..FixedTimePassSummary::default()
        };

        for rule in &rules {
            let tenant = &rule.tenant_id;
            let Some(target) = target_day(today, rule) else {
                warn!("Skipping rule {}: target day offset {} is out of range", rule.id, rule.target_day_offset);
                summary.errors += 1;
                continue;
            };

            let reservations = match self.reservations.reservations_on(tenant, target).await {
                Ok(reservations) => reservations,
                Err(e) => {
                    warn!("Skipping rule {}: failed to load reservations for {}: {}", rule.id, target, e);
                    summary.errors += 1;
                    continue;
                }
            };
            summary.reservations += reservations.len();

            for reservation in &reservations {
                match self.schedule_for_reservation(tenant, rule, reservation, now).await {
                    Ok(ScheduleOutcome::Scheduled(_)) => summary.scheduled += 1,
                    Ok(ScheduleOutcome::AlreadyScheduled) => summary.already_scheduled += 1,
                    Ok(ScheduleOutcome::Skipped(_)) => summary.skipped += 1,
                    Err(e) => {
                        warn!("Rule {} failed for reservation {}: {}", rule.id, reservation.id, e);
                        summary.errors += 1;
                    }
                }
            }
        }

        info!(
            "Fixed-time pass: {} rules, {} reservations, {} scheduled, {} already scheduled",
            summary.rules, summary.reservations, summary.scheduled, summary.already_scheduled
        );
        Ok(summary)
    }
}

fn target_day(today: NaiveDate, rule: &ReminderRule) -> Option<NaiveDate> {
    today.checked_add_signed(Duration::days(i64::from(rule.target_day_offset)))
}
