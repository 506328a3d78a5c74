use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Calendar month key, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid month '{}', expected YYYY-MM", s);

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The clinic's wall clock. Slot times, reservation times and fixed-time
/// reminder sends are all expressed in clinic-local time.
#[derive(Debug, Clone, Copy)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn from_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!("Clinic UTC offset {} minutes out of range, using UTC", minutes);
            Utc.fix()
        });
        Self { offset }
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date(now)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Converts a clinic-local date and time into the UTC instant.
    pub fn instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        (date.and_time(time) - shift).and_utc()
    }
}

/// Serde for clinic wall-clock times: accepts `HH:MM` and `HH:MM:SS`,
/// writes `HH:MM`.
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(time) => super::serialize(time, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_key_parse_and_display() {
        let key: MonthKey = "2026-03".parse().unwrap();
        assert_eq!(key.year(), 2026);
        assert_eq!(key.month(), 3);
        assert_eq!(key.to_string(), "2026-03");
        assert!(key.contains(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()));
        assert!(!key.contains(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()));
    }

    #[test]
    fn test_month_key_rejects_malformed() {
        for raw in ["2026-13", "2026-3", "26-03", "2026/03", "", "abcd-ef"] {
            assert!(raw.parse::<MonthKey>().is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_month_key_serde_is_string() {
        let key: MonthKey = serde_json::from_str("\"2025-12\"").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2025-12\"");
        assert!(serde_json::from_str::<MonthKey>("\"2025-00\"").is_err());
    }

    #[test]
    fn test_clock_time_accepts_both_precisions() {
        #[derive(serde::Deserialize, serde::Serialize)]
        struct Row {
            #[serde(with = "clock_time")]
            start: NaiveTime,
            #[serde(default, with = "clock_time::option")]
            end: Option<NaiveTime>,
        }

        let row: Row = serde_json::from_str(r#"{"start":"09:30:00","end":"12:00"}"#).unwrap();
        assert_eq!(row.start, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(row.end, NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"start":"09:30","end":"12:00"}"#);

        let row: Row = serde_json::from_str(r#"{"start":"09:30"}"#).unwrap();
        assert!(row.end.is_none());
        assert!(serde_json::from_str::<Row>(r#"{"start":"25:00"}"#).is_err());
    }

    #[test]
    fn test_clinic_clock_jst_round_trip() {
        let clock = ClinicClock::from_offset_minutes(540);
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        let instant = clock.instant(date, time);
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap());

        // 23:30 UTC is already the next day in JST.
        let late = Utc.with_ymd_and_hms(2026, 1, 4, 23, 30, 0).unwrap();
        assert_eq!(clock.today(late), date);
    }
}
