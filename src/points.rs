//! Check-in reward calculation.
//!
//! Pure apart from the RNG draw for the base award: the caller passes the
//! calendar date, so weekend and special-day bonuses are decided from the
//! arguments rather than a clock read, and the combined total is fully
//! reconstructible from the returned breakdown.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PointsConfig;

/// Per-component audit of one check-in award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub base_points: i64,
    pub consecutive_bonus: i64,
    pub weekend_bonus: i64,
    pub special_day_bonus: i64,
    /// Name of the matched special day, when one applied.
    pub special_day_name: Option<String>,
    pub total_points: i64,
}

/// Computes the reward for a check-in on `date` with the given streak.
///
/// `base_points` is uniform in `[min_points, max_points]`; pin the range to
/// a single value for deterministic callers. The consecutive bonus is
/// `(consecutive_days - 1) * per_day`, capped, and only applies from the
/// second consecutive cycle onward.
pub fn calculate(cfg: &PointsConfig, consecutive_days: u32, date: NaiveDate) -> PointsBreakdown {
    let (lo, hi) = if cfg.min_points <= cfg.max_points {
        (cfg.min_points, cfg.max_points)
    } else {
        (cfg.max_points, cfg.min_points)
    };
    let base_points = rand::rng().random_range(lo..=hi);

    let consecutive_bonus = if cfg.consecutive_bonus_enabled && consecutive_days > 1 {
        ((consecutive_days as i64 - 1) * cfg.consecutive_bonus_per_day)
            .min(cfg.max_consecutive_bonus)
    } else {
        0
    };

    let weekend_bonus = if cfg.weekend_bonus_enabled
        && matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    {
        cfg.weekend_bonus
    } else {
        0
    };

    let special = cfg
        .special_days
        .iter()
        .find(|s| s.month == date.month() && s.day == date.day());
    let special_day_bonus = special.map(|s| s.bonus).unwrap_or(0);
    let special_day_name = special.map(|s| s.name.clone());

    PointsBreakdown {
        base_points,
        consecutive_bonus,
        weekend_bonus,
        special_day_bonus,
        special_day_name,
        total_points: base_points + consecutive_bonus + weekend_bonus + special_day_bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecialDay;

    fn base_cfg() -> PointsConfig {
        PointsConfig {
            min_points: 10,
            max_points: 10,
            consecutive_bonus_enabled: true,
            consecutive_bonus_per_day: 2,
            max_consecutive_bonus: 20,
            weekend_bonus_enabled: false,
            weekend_bonus: 5,
            special_days: Vec::new(),
        }
    }

    // A Monday, to keep weekend bonus out of totals.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    #[test]
    fn base_points_stay_in_range() {
        let mut cfg = base_cfg();
        cfg.min_points = 3;
        cfg.max_points = 9;
        for _ in 0..200 {
            let b = calculate(&cfg, 1, monday());
            assert!((3..=9).contains(&b.base_points));
            assert_eq!(b.total_points, b.base_points);
        }
    }

    #[test]
    fn streak_of_three_earns_four_bonus() {
        // The spec's worked example: base 10, streak 3, 2/day capped at 20.
        let b = calculate(&base_cfg(), 3, monday());
        assert_eq!(b.base_points, 10);
        assert_eq!(b.consecutive_bonus, 4);
        assert_eq!(b.total_points, 14);
    }

    #[test]
    fn consecutive_bonus_is_capped() {
        let b = calculate(&base_cfg(), 500, monday());
        assert_eq!(b.consecutive_bonus, 20);
    }

    #[test]
    fn no_bonus_on_first_day_or_when_disabled() {
        assert_eq!(calculate(&base_cfg(), 1, monday()).consecutive_bonus, 0);
        let mut cfg = base_cfg();
        cfg.consecutive_bonus_enabled = false;
        assert_eq!(calculate(&cfg, 10, monday()).consecutive_bonus, 0);
    }

    #[test]
    fn weekend_bonus_applies_on_saturday() {
        let mut cfg = base_cfg();
        cfg.weekend_bonus_enabled = true;
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(calculate(&cfg, 1, saturday).weekend_bonus, 5);
        assert_eq!(calculate(&cfg, 1, monday()).weekend_bonus, 0);
    }

    #[test]
    fn special_day_bonus_matches_month_and_day() {
        let mut cfg = base_cfg();
        cfg.special_days.push(SpecialDay {
            month: 3,
            day: 11,
            bonus: 30,
            name: "anniversary".into(),
        });
        let b = calculate(&cfg, 1, monday());
        assert_eq!(b.special_day_bonus, 30);
        assert_eq!(b.special_day_name.as_deref(), Some("anniversary"));
        assert_eq!(b.total_points, 40);
    }
}
