use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use checkin_ledger::config::{AppConfig, CycleType};
use checkin_ledger::error::LedgerError;
use checkin_ledger::model::AppState;

/// Deterministic config: base points pinned to 10, no weekend or special
/// bonuses, 2/day consecutive bonus capped at 20, day resets at 04:00.
fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.cycle.reset_hour = 4;
    cfg.cycle.reset_minute = 0;
    cfg.cycle.cycle_type = CycleType::Daily;
    cfg.cycle.max_checkins_per_cycle = 1;
    cfg.points.min_points = 10;
    cfg.points.max_points = 10;
    cfg.points.weekend_bonus_enabled = false;
    cfg.points.special_days.clear();
    cfg
}

fn state(dir: &TempDir, cfg: AppConfig) -> std::sync::Arc<AppState> {
    AppState::new(cfg, dir.path())
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

#[tokio::test]
async fn second_checkin_same_day_is_rejected_without_new_entry() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());

    let first = app
        .checkin
        .perform_checkin_at("u1", "User One", Some("g1"), at(2024, 3, 11, 9, 0))
        .await
        .unwrap();
    assert!(!first.already_checked_in);
    assert_eq!(first.points, 10);

    let second = app
        .checkin
        .perform_checkin_at("u1", "User One", Some("g1"), at(2024, 3, 11, 15, 0))
        .await;
    match second {
        Err(LedgerError::CycleLimitExceeded { cycle_noun, .. }) => {
            assert_eq!(cycle_noun, "today");
        }
        other => panic!("expected CycleLimitExceeded, got {other:?}"),
    }

    let record = app
        .points
        .get_user_points("g1", "u1")
        .await
        .expect("record exists");
    assert_eq!(record.checkin_history.len(), 1);
}

#[tokio::test]
async fn reset_hour_assigns_early_morning_to_previous_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());

    // 03:30 on the 11th is still the 10th's cycle; 04:30 starts the 11th.
    let early = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 11, 3, 30))
        .await
        .unwrap();
    assert_eq!(early.cycle_id, "2024-03-10");

    let after = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 11, 4, 30))
        .await
        .unwrap();
    assert_eq!(after.cycle_id, "2024-03-11");
    // The 03:30 check-in was the previous cycle, so the streak continues.
    assert_eq!(after.consecutive_days, 2);
}

#[tokio::test]
async fn arrival_rank_follows_checkin_order_not_points() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());
    let now = at(2024, 3, 11, 9, 0);

    for (i, user) in ["a", "b", "c"].iter().enumerate() {
        let res = app
            .checkin
            .perform_checkin_at(user, user, Some("g1"), now)
            .await
            .unwrap();
        assert_eq!(res.rank, i as u32 + 1);
    }

    let stats = app
        .query
        .cycle_arrivals(&checkin_ledger::Scope::Group("g1".into()), "2024-03-11")
        .await
        .unwrap();
    assert_eq!(stats.total_checkins, 3);
    assert_eq!(stats.arrival_order, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn streak_builds_across_days_and_feeds_the_bonus() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());

    // Mon/Tue/Wed, well past the reset boundary.
    let day1 = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 11, 12, 0))
        .await
        .unwrap();
    assert_eq!(day1.consecutive_days, 1);
    assert_eq!(day1.points, 10);

    let day2 = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 12, 12, 0))
        .await
        .unwrap();
    assert_eq!(day2.consecutive_days, 2);
    assert_eq!(day2.points, 12); // 10 base + (2-1)*2 bonus

    let day3 = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 13, 12, 0))
        .await
        .unwrap();
    assert_eq!(day3.consecutive_days, 3);
    // The worked example: base 10, bonus min((3-1)*2, 20) = 4.
    assert_eq!(day3.points, 14);
    let breakdown = day3.breakdown.unwrap();
    assert_eq!(breakdown.base_points, 10);
    assert_eq!(breakdown.consecutive_bonus, 4);
}

#[tokio::test]
async fn streak_resets_after_a_missed_day() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());

    app.checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 11, 12, 0))
        .await
        .unwrap();
    // Skip the 12th entirely.
    let after_gap = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 13, 12, 0))
        .await
        .unwrap();
    assert_eq!(after_gap.consecutive_days, 1);
    assert_eq!(after_gap.best_streak, 1);
}

#[tokio::test]
async fn active_days_counts_once_per_day_across_groups() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());
    let now = at(2024, 3, 11, 9, 0);

    app.checkin
        .perform_checkin_at("u1", "n", Some("g1"), now)
        .await
        .unwrap();
    let second_group = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g2"), at(2024, 3, 11, 10, 0))
        .await
        .unwrap();

    let global = second_group.global;
    assert_eq!(global.active_days, 1);
    // Streak and cycle counters advance only on the first group of the day.
    assert_eq!(global.total_checkin_days, 1);
    assert_eq!(global.consecutive_days, 1);
    // Both groups still credited the global ledger.
    assert_eq!(global.total_exp, 20);
}

#[tokio::test]
async fn repeat_call_is_surfaced_when_limit_allows_more() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.cycle.max_checkins_per_cycle = 3;
    let app = state(&dir, cfg);
    let now = at(2024, 3, 11, 9, 0);

    let first = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), now)
        .await
        .unwrap();
    let again = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 11, 18, 0))
        .await
        .unwrap();

    assert!(again.already_checked_in);
    assert_eq!(again.points, first.points);
    assert_eq!(again.rank, first.rank);
    assert!(again.breakdown.is_none());
    // No double credit.
    let record = app.points.get_user_points("g1", "u1").await.unwrap();
    assert_eq!(record.checkin_history.len(), 1);
    assert_eq!(record.transactions.len(), 1);
}

#[tokio::test]
async fn weekly_cycle_limits_per_iso_week() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.cycle.cycle_type = CycleType::Weekly;
    let app = state(&dir, cfg);

    let monday = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 11, 9, 0))
        .await
        .unwrap();
    assert_eq!(monday.cycle_id, "2024-W11");

    let thursday = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 14, 9, 0))
        .await;
    match thursday {
        Err(LedgerError::CycleLimitExceeded { cycle_noun, .. }) => {
            assert_eq!(cycle_noun, "this week");
        }
        other => panic!("expected CycleLimitExceeded, got {other:?}"),
    }

    // Next ISO week opens a fresh cycle and continues the streak.
    let next_monday = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, 18, 9, 0))
        .await
        .unwrap();
    assert_eq!(next_monday.cycle_id, "2024-W12");
    assert_eq!(next_monday.consecutive_days, 2);
}

#[tokio::test]
async fn early_bird_title_lands_on_the_seventh_dawn_checkin() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());

    let mut earned = Vec::new();
    for day in 11..=17 {
        let res = app
            .checkin
            .perform_checkin_at("u1", "n", Some("g1"), at(2024, 3, day, 6, 0))
            .await
            .unwrap();
        earned = res.new_titles;
    }
    assert!(earned.contains(&"early_bird".to_string()));
    // Seven check-in days also unlock the week-one threshold title.
    assert!(earned.contains(&"week_one".to_string()));
}

#[tokio::test]
async fn groupless_checkin_uses_the_global_scope() {
    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());
    let now = at(2024, 3, 11, 9, 0);

    let res = app
        .checkin
        .perform_checkin_at("u1", "n", None, now)
        .await
        .unwrap();
    assert_eq!(res.rank, 1);
    assert!(res.group.is_none());
    assert!(res.group_awarded.is_none());

    // The global scope now enforces the cycle limit.
    let again = app.checkin.perform_checkin_at("u1", "n", None, now).await;
    assert!(matches!(
        again,
        Err(LedgerError::CycleLimitExceeded { .. })
    ));
}

#[tokio::test]
async fn retry_after_persisted_global_does_not_credit_global_twice() {
    use checkin_ledger::storage::{
        CheckinEntry, Scope, ScopedMutation, UserLedgerRecord,
    };

    let dir = tempfile::tempdir().unwrap();
    let app = state(&dir, test_config());
    let now = at(2024, 3, 11, 9, 0);

    // Seed the state a crash between the two commits leaves behind: the
    // global document already carries this cycle's entry, the group
    // document never got its credit.
    let mut global = UserLedgerRecord::new("u1", "n");
    global.total_exp = 10;
    global.balance = 10;
    global.consecutive_days = 1;
    global.best_streak = 1;
    global.total_checkin_days = 1;
    global.active_days = 1;
    global.last_active_date = Some("2024-03-11".into());
    global.last_checkin_date = Some("2024-03-11".into());
    global.checkin_history.push(CheckinEntry {
        date: "2024-03-11".into(),
        cycle_id: "2024-03-11".into(),
        points: 10,
        time: now,
        rank: 1,
        group_id: Some("g1".into()),
    });
    app.store
        .commit(
            &Scope::Global,
            ScopedMutation {
                users: vec![global],
                ..ScopedMutation::default()
            },
        )
        .await
        .unwrap();

    let res = app
        .checkin
        .perform_checkin_at("u1", "n", Some("g1"), now)
        .await
        .unwrap();
    assert!(!res.already_checked_in);
    assert_eq!(res.group_awarded, Some(10));

    // The retry completed the group side without re-crediting the global
    // aggregate.
    let global = app
        .store
        .get_user(&Scope::Global, "u1")
        .await
        .unwrap();
    assert_eq!(global.total_exp, 10);
    assert_eq!(global.balance, 10);
    assert_eq!(global.checkin_history.len(), 1);
    let group = app
        .store
        .get_user(&Scope::Group("g1".into()), "u1")
        .await
        .unwrap();
    assert_eq!(group.total_exp, 10);
    assert_eq!(group.checkin_history.len(), 1);
}
