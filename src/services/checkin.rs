//! Check-in orchestrator: the top-level use case tying the cycle clock,
//! points calculator, level table, and ledger store together.
//!
//! Scope decision (see DESIGN.md): the consecutive streak always comes
//! from the global record, while eligibility and the repeat check use the
//! group history when a group id is given. Rewards are credited to both
//! the global aggregate and, when present, the group-scoped record; only
//! the group credit goes through the idempotency-keyed award path.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Timelike, Utc};

use crate::config::AppConfig;
use crate::cycle;
use crate::error::LedgerError;
use crate::levels::{self, TitleCondition};
use crate::points::{self, PointsBreakdown};
use crate::services::points::{apply_award, AwardRequest};
use crate::storage::{
    CheckinEntry, DailyCycleStats, LedgerStore, Scope, ScopedMutation, TransactionKind,
    TransactionRecord, UserLedgerRecord,
};

/// Hour-of-day boundary for the early-bird title.
const EARLY_BIRD_HOUR: u32 = 8;
const EARLY_BIRD_STREAK: u32 = 7;

#[derive(Debug, Clone)]
pub struct CheckinResult {
    /// True when the user already had an entry this cycle; the stored
    /// result is surfaced instead of a fresh reward.
    pub already_checked_in: bool,
    pub cycle_id: String,
    /// Total points earned (or previously earned, on a repeat call).
    pub points: i64,
    /// Per-component breakdown; `None` on repeat calls, which only retain
    /// the stored total.
    pub breakdown: Option<PointsBreakdown>,
    pub consecutive_days: u32,
    pub best_streak: u32,
    /// Arrival-order rank within this cycle (1-based).
    pub rank: u32,
    pub leveled_up: bool,
    /// Amount credited to the group record after the level bonus, when a
    /// group was given.
    pub group_awarded: Option<i64>,
    /// Ids of titles newly earned by this check-in.
    pub new_titles: Vec<String>,
    pub global: UserLedgerRecord,
    pub group: Option<UserLedgerRecord>,
}

#[derive(Clone)]
pub struct CheckinService {
    store: Arc<LedgerStore>,
    config: Arc<AppConfig>,
}

impl CheckinService {
    pub fn new(store: Arc<LedgerStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// Performs a check-in at the current local wall-clock time.
    pub async fn perform_checkin(
        &self,
        user_id: &str,
        nickname: &str,
        group_id: Option<&str>,
    ) -> Result<CheckinResult, LedgerError> {
        self.perform_checkin_at(user_id, nickname, group_id, Local::now().naive_local())
            .await
    }

    /// Check-in against an explicit instant. Split out so tests (and
    /// backfill tooling) can drive the clock.
    pub async fn perform_checkin_at(
        &self,
        user_id: &str,
        nickname: &str,
        group_id: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<CheckinResult, LedgerError> {
        let ccfg = &self.config.cycle;
        let cycle_id = cycle::current_cycle_id(now, ccfg);
        let prev_cycle = cycle::previous_cycle_id(now, ccfg);
        let effective_date = cycle::effective_date(now, ccfg)
            .format("%Y-%m-%d")
            .to_string();

        // Lock ordering is always global first, then group, so concurrent
        // check-ins for the same user cannot deadlock.
        let global_lock = self.store.user_lock(&Scope::Global, user_id).await;
        let _global_guard = global_lock.lock().await;
        let group_scope = group_id.map(|g| Scope::Group(g.to_string()));
        let group_lock = match &group_scope {
            Some(scope) => Some(self.store.user_lock(scope, user_id).await),
            None => None,
        };
        let _group_guard = match &group_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut global = self
            .store
            .get_user(&Scope::Global, user_id)
            .await
            .unwrap_or_else(|| UserLedgerRecord::new(user_id, nickname));
        global.nickname = nickname.to_string();

        let mut group_record = match &group_scope {
            Some(scope) => {
                let mut record = self
                    .store
                    .get_user(scope, user_id)
                    .await
                    .unwrap_or_else(|| UserLedgerRecord::new(user_id, nickname));
                record.nickname = nickname.to_string();
                Some(record)
            }
            None => None,
        };

        // Eligibility is judged against the scope the check-in lands in.
        let (count, repeat) = {
            let scope_history = group_record
                .as_ref()
                .map(|r| &r.checkin_history)
                .unwrap_or(&global.checkin_history);
            let count = scope_history
                .iter()
                .filter(|e| e.cycle_id == cycle_id)
                .count() as u32;
            let repeat = scope_history
                .iter()
                .rev()
                .find(|e| e.cycle_id == cycle_id)
                .map(|e| (e.points, e.rank));
            (count, repeat)
        };
        if count >= ccfg.max_checkins_per_cycle {
            return Err(LedgerError::CycleLimitExceeded {
                cycle_noun: ccfg.cycle_type.noun(),
                count,
                limit: ccfg.max_checkins_per_cycle,
            });
        }
        if let Some((points, rank)) = repeat {
            // Same-cycle repeat: surface the stored result, no new credit.
            return Ok(CheckinResult {
                already_checked_in: true,
                cycle_id,
                points,
                breakdown: None,
                consecutive_days: global.consecutive_days,
                best_streak: global.best_streak,
                rank,
                leveled_up: false,
                group_awarded: None,
                new_titles: Vec::new(),
                global,
                group: group_record,
            });
        }

        // Streak is global: the first check-in of the cycle, in any group,
        // advances it; later groups the same cycle reuse it.
        let first_of_cycle = global.last_checkin_date.as_deref() != Some(cycle_id.as_str());
        if first_of_cycle {
            global.consecutive_days =
                if global.last_checkin_date.as_deref() == Some(prev_cycle.as_str()) {
                    global.consecutive_days + 1
                } else {
                    1
                };
            global.best_streak = global.best_streak.max(global.consecutive_days);
            global.total_checkin_days += 1;
        }
        let streak = global.consecutive_days;

        let breakdown = points::calculate(&self.config.points, streak, now.date());

        // Arrival rank comes from the scope's per-cycle stats. The stats
        // are scope-wide state, so the read-increment-commit below runs
        // under the scope lock, not just this user's lock.
        let rank_scope = group_scope.clone().unwrap_or(Scope::Global);
        let scope_lock = self.store.scope_lock(&rank_scope).await;
        let _scope_guard = scope_lock.lock().await;
        let mut stats = self
            .store
            .cycle_stats(&rank_scope, &cycle_id)
            .await
            .unwrap_or_else(|| DailyCycleStats {
                cycle_id: cycle_id.clone(),
                ..DailyCycleStats::default()
            });
        let rank = stats.total_checkins + 1;
        stats.total_checkins += 1;
        stats.arrival_order.push(user_id.to_string());

        let entry = CheckinEntry {
            date: effective_date.clone(),
            cycle_id: cycle_id.clone(),
            points: breakdown.total_points,
            time: now,
            rank,
            group_id: group_id.map(str::to_string),
        };

        // Global aggregate update. This path is not idempotency-keyed; the
        // repeat check above plus the history probe here guard it. A retry
        // after a failed group commit finds its cycle entry already in the
        // global history and must not credit the global record twice.
        let now_utc = Utc::now();
        let global_already = global
            .checkin_history
            .iter()
            .any(|e| e.cycle_id == cycle_id && e.group_id.as_deref() == group_id);
        let mut leveled_up = false;
        let mut new_titles = Vec::new();
        if !global_already {
            global.total_exp += breakdown.total_points;
            global.balance += breakdown.total_points;
            if global.last_active_date.as_deref() != Some(effective_date.as_str()) {
                global.active_days += 1;
                global.last_active_date = Some(effective_date.clone());
            }
            global.last_checkin_date = Some(cycle_id.clone());
            global.push_history(entry.clone());
            global.transactions.push(TransactionRecord {
                id: format!("signin-{}-{}", cycle_id, now_utc.timestamp_micros()),
                timestamp: now_utc,
                kind: TransactionKind::Award,
                amount: breakdown.total_points,
                resulting_balance: global.balance,
                resulting_exp: global.total_exp,
                description: format!("check-in {effective_date}"),
                idempotency_key: None,
                operator_id: None,
                source: Some("signin".to_string()),
            });
            leveled_up = global.refresh_level();
            new_titles = self.grant_titles(&mut global, now, now_utc);

            // Global first: if the group commit below fails, the retry can
            // see this entry and skip re-crediting, whereas a lost group
            // commit is recoverable through the idempotency key.
            let global_mutation = ScopedMutation {
                users: vec![global.clone()],
                daily_stats: if group_scope.is_none() {
                    vec![stats.clone()]
                } else {
                    Vec::new()
                },
                group_name: None,
            };
            self.store
                .commit(&Scope::Global, global_mutation)
                .await
                .map_err(|err| {
                    tracing::error!(target: "checkin", user = %user_id, operation = "checkin", %err, "global ledger persist failed");
                    err
                })?;
        }

        // Group credit rides the idempotency-keyed award path so a retried
        // request cannot double-award even across process restarts.
        let mut group_awarded = None;
        if let (Some(scope), Some(record)) = (&group_scope, group_record.as_mut()) {
            let mut replayed = false;
            // A zero-point cycle (all knobs at zero) still records history
            // and rank, it just has nothing to credit.
            if breakdown.total_points > 0 {
                let key = format!(
                    "signin:{}:{}:{}:{}",
                    group_id.unwrap_or(""),
                    user_id,
                    cycle_id,
                    count
                );
                let outcome = apply_award(
                    record,
                    &AwardRequest {
                        amount: breakdown.total_points,
                        source: Some("signin".to_string()),
                        description: format!("check-in {effective_date}"),
                        apply_level_bonus: true,
                        multiplier: None,
                        idempotency_key: Some(key),
                        operator_id: None,
                    },
                    now_utc,
                )?;
                replayed = outcome.replayed;
                group_awarded = Some(outcome.awarded_total);
            }
            if !replayed {
                record.consecutive_days = streak;
                record.best_streak = record.best_streak.max(streak);
                record.total_checkin_days += 1;
                record.last_checkin_date = Some(cycle_id.clone());
                record.push_history(entry.clone());
            }

            self.store
                .commit(
                    scope,
                    ScopedMutation {
                        users: vec![record.clone()],
                        daily_stats: vec![stats],
                        group_name: None,
                    },
                )
                .await
                .map_err(|err| {
                    tracing::error!(target: "checkin", group = ?group_id, user = %user_id, operation = "checkin", %err, "group ledger persist failed");
                    err
                })?;
        }

        Ok(CheckinResult {
            already_checked_in: false,
            cycle_id,
            points: breakdown.total_points,
            breakdown: Some(breakdown),
            consecutive_days: streak,
            best_streak: global.best_streak,
            rank,
            leveled_up,
            group_awarded,
            new_titles,
            global,
            group: group_record,
        })
    }

    /// Evaluates threshold titles and the orchestrator-owned special
    /// predicates against the just-mutated global record. Returns ids of
    /// titles newly granted.
    fn grant_titles(
        &self,
        global: &mut UserLedgerRecord,
        now: NaiveDateTime,
        now_utc: chrono::DateTime<Utc>,
    ) -> Vec<String> {
        let mut earned = Vec::new();
        for title in levels::eligible_titles(
            global.level,
            global.total_checkin_days,
            global.total_exp,
        ) {
            if global.grant_title(title.id, title.expire_days, now_utc) {
                earned.push(title.id.to_string());
            }
        }
        if self.early_bird_qualifies(global, now) {
            if let Some(def) = levels::title_by_id("early_bird") {
                if global.grant_title(def.id, def.expire_days, now_utc) {
                    earned.push(def.id.to_string());
                }
            }
        }
        earned
    }

    /// Early bird: this check-in landed before 08:00 and so did the last
    /// seven consecutive ones.
    fn early_bird_qualifies(&self, global: &UserLedgerRecord, now: NaiveDateTime) -> bool {
        debug_assert!(matches!(
            levels::title_by_id("early_bird").map(|t| t.condition),
            Some(TitleCondition::Special("early_bird"))
        ));
        if now.time().hour() >= EARLY_BIRD_HOUR {
            return false;
        }
        if global.consecutive_days < EARLY_BIRD_STREAK {
            return false;
        }
        global
            .checkin_history
            .iter()
            .rev()
            .take(EARLY_BIRD_STREAK as usize)
            .all(|e| e.time.time().hour() < EARLY_BIRD_HOUR)
    }
}
