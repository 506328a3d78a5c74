use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use uuid::Uuid;

use crate::models::{
    DateOverride, OverrideType, Slot, WeeklyRule, DEFAULT_CAPACITY, DEFAULT_SLOT_MINUTES,
};

/// Active bookings per (date, slot start).
pub type BookedCounts = HashMap<(NaiveDate, NaiveTime), u32>;

/// Effective hours of one band after merging an override over the weekly rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Band {
    start: NaiveTime,
    end: NaiveTime,
    slot_minutes: i32,
    capacity: i32,
}

/// Computes the bookable slots of one doctor between `start` and `end`
/// (inclusive), ordered by date then time.
///
/// Pure: rule rows that cannot produce a valid band are skipped, never
/// reported. Range validation happens before this is called.
pub fn compute_slots(
    doctor_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    weekly_rules: &[WeeklyRule],
    overrides: &[DateOverride],
    booked: &BookedCounts,
) -> Vec<Slot> {
    let mut slots = Vec::new();
    let mut date = start;

    while date <= end {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        let rule = weekly_rules
            .iter()
            .find(|r| r.doctor_id == doctor_id && r.weekday == weekday);
        let day_overrides: Vec<&DateOverride> = overrides
            .iter()
            .filter(|o| o.doctor_id == doctor_id && o.override_date == date)
            .collect();

        let mut by_time: BTreeMap<NaiveTime, i32> = BTreeMap::new();
        for band in bands_for_date(rule, &day_overrides) {
            for time in slot_times(&band) {
                let taken = booked.get(&(date, time)).copied().unwrap_or(0);
                let taken = i32::try_from(taken).unwrap_or(i32::MAX);
                let remaining = (band.capacity - taken).max(0);
                by_time
                    .entry(time)
                    .and_modify(|current| *current = (*current).max(remaining))
                    .or_insert(remaining);
            }
        }

        slots.extend(by_time.into_iter().map(|(time, remaining_capacity)| Slot {
            date,
            time,
            remaining_capacity,
        }));

        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    slots
}

fn bands_for_date(rule: Option<&WeeklyRule>, overrides: &[&DateOverride]) -> Vec<Band> {
    if overrides.iter().any(|o| o.override_type == OverrideType::Closed) {
        return Vec::new();
    }

    let base_override = overrides.iter().copied().find(|o| o.slot_name.is_none());
    let named: Vec<&DateOverride> = overrides.iter().copied().filter(|o| o.slot_name.is_some()).collect();

    let mut bands = Vec::new();
    match base_override {
        Some(o) => bands.extend(merge(Some(o), rule)),
        // Named bands stand in for the weekly hours of that date.
        None if named.is_empty() => {
            if rule.is_some_and(|r| r.enabled) {
                bands.extend(merge(None, rule));
            }
        }
        None => {}
    }
    bands.extend(named.into_iter().filter_map(|o| merge(Some(o), rule)));
    bands
}

/// Field-level merge: every field comes from the override when set, else
/// from the weekly rule, else the clinic default.
fn merge(over: Option<&DateOverride>, rule: Option<&WeeklyRule>) -> Option<Band> {
    let start = over
        .and_then(|o| o.start_time)
        .or_else(|| rule.and_then(|r| r.start_time))?;
    let end = over
        .and_then(|o| o.end_time)
        .or_else(|| rule.and_then(|r| r.end_time))?;
    let slot_minutes = over
        .and_then(|o| o.slot_minutes)
        .or_else(|| rule.and_then(|r| r.slot_minutes))
        .unwrap_or(DEFAULT_SLOT_MINUTES);
    let capacity = over
        .and_then(|o| o.capacity)
        .or_else(|| rule.and_then(|r| r.capacity))
        .unwrap_or(DEFAULT_CAPACITY);

    if start >= end || slot_minutes <= 0 {
        return None;
    }

    Some(Band {
        start,
        end,
        slot_minutes,
        capacity,
    })
}

fn slot_times(band: &Band) -> Vec<NaiveTime> {
    let end = minutes_of(band.end);
    let step = i64::from(band.slot_minutes);

    let mut times = Vec::new();
    let mut cursor = minutes_of(band.start);
    while cursor + step <= end {
        if let Some(time) = NaiveTime::from_num_seconds_from_midnight_opt((cursor * 60) as u32, 0) {
            times.push(time);
        }
        cursor += step;
    }
    times
}

fn minutes_of(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight() / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use shared_models::tenant::TenantId;

    fn tenant() -> TenantId {
        TenantId::parse("clinic-a").unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2026-01-05 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    fn monday_rule(doctor_id: Uuid, enabled: bool) -> WeeklyRule {
        WeeklyRule {
            id: Uuid::new_v4(),
            tenant_id: tenant(),
            doctor_id,
            weekday: 1,
            enabled,
            start_time: Some(t(10, 0)),
            end_time: Some(t(12, 0)),
            slot_minutes: Some(30),
            capacity: Some(2),
            updated_at: Utc::now(),
        }
    }

    fn override_row(doctor_id: Uuid, kind: OverrideType, slot_name: Option<&str>) -> DateOverride {
        DateOverride {
            id: Uuid::new_v4(),
            tenant_id: tenant(),
            doctor_id,
            override_date: monday(),
            override_type: kind,
            slot_name: slot_name.map(str::to_string),
            start_time: None,
            end_time: None,
            slot_minutes: None,
            capacity: None,
            memo: None,
            updated_at: Utc::now(),
        }
    }

    fn times(slots: &[Slot]) -> Vec<NaiveTime> {
        slots.iter().map(|s| s.time).collect()
    }

    #[test]
    fn test_weekly_rule_generates_slots() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true)];

        let slots = compute_slots(doctor, monday(), monday(), &rules, &[], &BookedCounts::new());

        assert_eq!(times(&slots), vec![t(10, 0), t(10, 30), t(11, 0), t(11, 30)]);
        assert!(slots.iter().all(|s| s.remaining_capacity == 2 && s.date == monday()));
    }

    #[test]
    fn test_bookings_reduce_remaining_capacity() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true)];
        let mut booked = BookedCounts::new();
        booked.insert((monday(), t(10, 0)), 1);
        booked.insert((monday(), t(11, 30)), 5);

        let slots = compute_slots(doctor, monday(), monday(), &rules, &[], &booked);

        let remaining: Vec<i32> = slots.iter().map(|s| s.remaining_capacity).collect();
        assert_eq!(remaining, vec![1, 2, 2, 0]);
    }

    #[test]
    fn test_disabled_rule_without_override_yields_nothing() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, false)];
        let week_end = monday() + Duration::days(6);

        assert!(compute_slots(doctor, monday(), week_end, &rules, &[], &BookedCounts::new()).is_empty());
    }

    #[test]
    fn test_closed_override_wins_over_everything() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true)];

        for slot_name in [None, Some("morning")] {
            let mut open = override_row(doctor, OverrideType::Open, Some("evening"));
            open.start_time = Some(t(17, 0));
            open.end_time = Some(t(18, 0));
            let overrides = vec![override_row(doctor, OverrideType::Closed, slot_name), open];

            let slots = compute_slots(doctor, monday(), monday(), &rules, &overrides, &BookedCounts::new());
            assert!(slots.is_empty());
        }
    }

    #[test]
    fn test_modify_capacity_only_inherits_hours() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true)];
        let mut modify = override_row(doctor, OverrideType::Modify, None);
        modify.capacity = Some(1);

        let slots = compute_slots(doctor, monday(), monday(), &rules, &[modify], &BookedCounts::new());

        assert_eq!(times(&slots), vec![t(10, 0), t(10, 30), t(11, 0), t(11, 30)]);
        assert!(slots.iter().all(|s| s.remaining_capacity == 1));
    }

    #[test]
    fn test_open_override_on_day_without_rule() {
        let doctor = Uuid::new_v4();
        let mut open = override_row(doctor, OverrideType::Open, None);
        open.start_time = Some(t(9, 0));
        open.end_time = Some(t(10, 0));

        let slots = compute_slots(doctor, monday(), monday(), &[], &[open], &BookedCounts::new());

        // Defaults: 15 minute slots, capacity 2.
        assert_eq!(times(&slots), vec![t(9, 0), t(9, 15), t(9, 30), t(9, 45)]);
        assert!(slots.iter().all(|s| s.remaining_capacity == 2));
    }

    #[test]
    fn test_open_override_without_hours_or_rule_is_skipped() {
        let doctor = Uuid::new_v4();
        let open = override_row(doctor, OverrideType::Open, None);

        assert!(compute_slots(doctor, monday(), monday(), &[], &[open], &BookedCounts::new()).is_empty());
    }

    #[test]
    fn test_inverted_or_zero_length_band_is_skipped() {
        let doctor = Uuid::new_v4();
        let mut rule = monday_rule(doctor, true);
        rule.start_time = Some(t(12, 0));
        rule.end_time = Some(t(10, 0));
        assert!(compute_slots(doctor, monday(), monday(), &[rule], &[], &BookedCounts::new()).is_empty());

        let mut rule = monday_rule(doctor, true);
        rule.slot_minutes = Some(0);
        assert!(compute_slots(doctor, monday(), monday(), &[rule], &[], &BookedCounts::new()).is_empty());
    }

    #[test]
    fn test_last_slot_must_fit_before_end() {
        let doctor = Uuid::new_v4();
        let mut rule = monday_rule(doctor, true);
        rule.end_time = Some(t(11, 45));

        let slots = compute_slots(doctor, monday(), monday(), &[rule], &[], &BookedCounts::new());
        assert_eq!(times(&slots), vec![t(10, 0), t(10, 30), t(11, 0)]);
    }

    #[test]
    fn test_named_bands_replace_weekly_hours_and_merge() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true)];

        let mut morning = override_row(doctor, OverrideType::Open, Some("morning"));
        morning.start_time = Some(t(9, 0));
        morning.end_time = Some(t(10, 0));
        let mut late = override_row(doctor, OverrideType::Modify, Some("late"));
        late.start_time = Some(t(9, 30));
        late.end_time = Some(t(10, 30));
        late.capacity = Some(5);

        let slots = compute_slots(doctor, monday(), monday(), &rules, &[morning, late], &BookedCounts::new());

        assert_eq!(times(&slots), vec![t(9, 0), t(9, 30), t(10, 0)]);
        // 09:30 exists in both bands; the larger remaining wins.
        assert_eq!(slots[1].remaining_capacity, 5);
        assert_eq!(slots[0].remaining_capacity, 2);
    }

    #[test]
    fn test_unnamed_override_keeps_base_band_next_to_named() {
        let doctor = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true)];

        let base = override_row(doctor, OverrideType::Modify, None);
        let mut evening = override_row(doctor, OverrideType::Open, Some("evening"));
        evening.start_time = Some(t(17, 0));
        evening.end_time = Some(t(17, 30));

        let slots = compute_slots(doctor, monday(), monday(), &rules, &[base, evening], &BookedCounts::new());
        assert_eq!(times(&slots), vec![t(10, 0), t(10, 30), t(11, 0), t(11, 30), t(17, 0)]);
    }

    #[test]
    fn test_output_is_ordered_across_dates_and_ignores_other_doctors() {
        let doctor = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rules = vec![monday_rule(doctor, true), monday_rule(other, true)];
        let mut closed_other = override_row(other, OverrideType::Closed, None);
        closed_other.override_date = monday() + Duration::days(7);

        let end = monday() + Duration::days(7);
        let slots = compute_slots(doctor, monday(), end, &rules, &[closed_other], &BookedCounts::new());

        assert_eq!(slots.len(), 8);
        assert!(slots.windows(2).all(|w| (w[0].date, w[0].time) < (w[1].date, w[1].time)));
        assert_eq!(slots[4].date, end);
    }
}
