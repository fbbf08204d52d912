//! Cycle clock: pure functions mapping an instant onto a cycle identifier.
//!
//! The day boundary is the configured `reset_hour:reset_minute`, not
//! midnight. An instant earlier than the boundary belongs to the previous
//! effective date; all cycle ids (daily, ISO-week, monthly) are derived from
//! that shifted date. These are total functions: no I/O, no clock reads.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::{CycleConfig, CycleType};

/// The effective date of `now` after applying the reset-time shift.
///
/// The boundary is compared as a fixed time-of-day instant: 00:05 with
/// `reset = 00:10` is still the previous day.
pub fn effective_date(now: NaiveDateTime, cfg: &CycleConfig) -> NaiveDate {
    let boundary = NaiveTime::from_hms_opt(cfg.reset_hour, cfg.reset_minute, 0)
        .unwrap_or(NaiveTime::MIN);
    if now.time() < boundary {
        now.date().pred_opt().unwrap_or(now.date())
    } else {
        now.date()
    }
}

/// Cycle identifier for a given effective date.
///
/// Daily ids are `YYYY-MM-DD`, weekly ids are `{isoYear}-W{week}` with
/// Monday-start ISO weeks, monthly ids are `YYYY-MM`. All three order
/// lexicographically within their own cycle type.
pub fn cycle_id_for(date: NaiveDate, cycle_type: CycleType) -> String {
    match cycle_type {
        CycleType::Daily => date.format("%Y-%m-%d").to_string(),
        CycleType::Weekly => {
            let iso = date.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        CycleType::Monthly => format!("{}-{:02}", date.year(), date.month()),
    }
}

/// Identifier of the cycle containing `now`.
pub fn current_cycle_id(now: NaiveDateTime, cfg: &CycleConfig) -> String {
    cycle_id_for(effective_date(now, cfg), cfg.cycle_type)
}

/// First effective date of the cycle containing `date`.
fn cycle_start(date: NaiveDate, cycle_type: CycleType) -> NaiveDate {
    match cycle_type {
        CycleType::Daily => date,
        CycleType::Weekly => {
            let back = date.weekday().num_days_from_monday() as u64;
            date.checked_sub_days(Days::new(back)).unwrap_or(date)
        }
        CycleType::Monthly => date.with_day(1).unwrap_or(date),
    }
}

/// Identifier of the cycle immediately before the one containing `now`.
///
/// Computed as the cycle id of the instant just before the current cycle's
/// start, so the reset-time shift is respected for daily cycles instead of
/// naive "yesterday's calendar date".
pub fn previous_cycle_id(now: NaiveDateTime, cfg: &CycleConfig) -> String {
    let eff = effective_date(now, cfg);
    let start = cycle_start(eff, cfg.cycle_type);
    let before = start.pred_opt().unwrap_or(start);
    cycle_id_for(before, cfg.cycle_type)
}

/// Whether cycle id `a` is the same as or later than `b`.
///
/// Both ids must come from the same cycle type; within a type the formats
/// above are chosen so lexicographic order matches chronological order.
pub fn is_same_or_later_cycle(a: &str, b: &str) -> bool {
    a >= b
}
