use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Visited,
    Cancelled,
}

/// A patient's booking as owned by the reservation path. This core only
/// reads reservations: to count bookings per slot and to attach reminders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    /// Clinic-local appointment date and start time.
    pub reservation_date: NaiveDate,
    #[serde(with = "crate::calendar::clock_time")]
    pub reservation_time: NaiveTime,
    pub status: ReservationStatus,
    /// Messaging destination of the patient (LINE user id), if linked.
    pub destination_id: Option<String>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }
}
