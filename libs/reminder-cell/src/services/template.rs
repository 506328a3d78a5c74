//! `{name}` placeholder rendering for reminder text and flex payloads.
//!
//! Reservation variables are filled in when a message is scheduled; patient
//! variables are left in place and filled in at send time, so the message
//! reflects the patient's current record.

use serde_json::Value;
use uuid::Uuid;

use shared_models::reservation::Reservation;

pub const VAR_DATE: &str = "date";
pub const VAR_TIME: &str = "time";
pub const VAR_DOCTOR_NAME: &str = "doctor_name";
pub const VAR_PATIENT_NAME: &str = "patient_name";
pub const VAR_NAME: &str = "name";
pub const VAR_PATIENT_ID: &str = "patient_id";

/// Replaces every `{key}` with its value. Unknown placeholders stay as written.
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// Renders every string leaf of a JSON document.
pub fn render_json(value: &Value, vars: &[(&str, String)]) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_json(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_json(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn reservation_vars(reservation: &Reservation) -> Vec<(&'static str, String)> {
    vec![
        (VAR_DATE, reservation.reservation_date.format("%Y/%m/%d").to_string()),
        (VAR_TIME, reservation.reservation_time.format("%H:%M").to_string()),
        (
            VAR_DOCTOR_NAME,
            reservation.doctor_name.clone().unwrap_or_default(),
        ),
    ]
}

pub fn patient_vars(patient_id: Uuid, name: Option<&str>) -> Vec<(&'static str, String)> {
    let name = name.unwrap_or_default().to_string();
    vec![
        (VAR_PATIENT_NAME, name.clone()),
        (VAR_NAME, name),
        (VAR_PATIENT_ID, patient_id.to_string()),
    ]
}
