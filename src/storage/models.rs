//! Persisted record schemas for the per-group and global ledger documents.
//!
//! Every struct deserializes with `#[serde(default)]` so documents written
//! by older versions (or hand-edited ones with missing keys) load instead
//! of failing; `LedgerDocument::migrate` then brings them up to the current
//! `data_version`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::levels;

/// Current schema version written to disk.
pub const DATA_VERSION: u32 = 2;

/// Hard cap on retained check-in history entries per user.
pub const HISTORY_CAP: usize = 365;

/// One check-in as recorded in a user's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinEntry {
    /// Effective date of the check-in (`YYYY-MM-DD`, reset-shift applied).
    pub date: String,
    /// Full cycle identifier the entry counted against.
    pub cycle_id: String,
    pub points: i64,
    /// Local wall-clock time of the call.
    pub time: NaiveDateTime,
    /// Arrival-order rank within the cycle (1-based).
    pub rank: u32,
    pub group_id: Option<String>,
}

impl Default for CheckinEntry {
    fn default() -> Self {
        Self {
            date: String::new(),
            cycle_id: String::new(),
            points: 0,
            time: DateTime::<Utc>::UNIX_EPOCH.naive_utc(),
            rank: 0,
            group_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[default]
    Award,
    Consume,
    Reset,
    Admin,
}

/// One ledger mutation. `amount` is signed: positive for awards, negative
/// for consumes and resets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TransactionKind,
    pub amount: i64,
    pub resulting_balance: i64,
    pub resulting_exp: i64,
    pub description: String,
    pub idempotency_key: Option<String>,
    pub operator_id: Option<String>,
    pub source: Option<String>,
}

impl Default for TransactionRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            kind: TransactionKind::Award,
            amount: 0,
            resulting_balance: 0,
            resulting_exp: 0,
            description: String::new(),
            idempotency_key: None,
            operator_id: None,
            source: None,
        }
    }
}

/// A title the user has earned. Expired titles stay in the list (history is
/// preserved) but report inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarnedTitle {
    pub id: String,
    pub earned_at: DateTime<Utc>,
    /// Days until expiry; 0 means permanent.
    pub expire_days: u32,
}

impl EarnedTitle {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.expire_days == 0 {
            return true;
        }
        now - self.earned_at <= chrono::Duration::days(self.expire_days as i64)
    }
}

/// Per-user ledger record. The same shape serves the group-scoped and the
/// global aggregate documents; group records simply never fill
/// `active_days`-style global stats beyond what their own scope sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLedgerRecord {
    pub user_id: String,
    pub nickname: String,
    /// Monotonic experience counter; never decreases.
    pub total_exp: i64,
    /// Spendable balance; never negative after a committed operation.
    pub balance: i64,
    pub level: u32,
    pub level_name: String,
    pub level_icon: String,
    pub consecutive_days: u32,
    pub best_streak: u32,
    pub total_checkin_days: u32,
    pub active_days: u32,
    /// Cycle id of the most recent check-in.
    pub last_checkin_date: Option<String>,
    /// Effective date (`YYYY-MM-DD`) the user last interacted, any group.
    pub last_active_date: Option<String>,
    pub checkin_history: Vec<CheckinEntry>,
    pub transactions: Vec<TransactionRecord>,
    pub titles: Vec<EarnedTitle>,
    pub data_version: u32,
}

impl Default for UserLedgerRecord {
    fn default() -> Self {
        let tier = levels::level_for(0);
        Self {
            user_id: String::new(),
            nickname: String::new(),
            total_exp: 0,
            balance: 0,
            level: tier.level,
            level_name: tier.name.to_string(),
            level_icon: tier.icon.to_string(),
            consecutive_days: 0,
            best_streak: 0,
            total_checkin_days: 0,
            active_days: 0,
            last_checkin_date: None,
            last_active_date: None,
            checkin_history: Vec::new(),
            transactions: Vec::new(),
            titles: Vec::new(),
            data_version: DATA_VERSION,
        }
    }
}

impl UserLedgerRecord {
    pub fn new(user_id: &str, nickname: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            nickname: nickname.to_string(),
            ..Self::default()
        }
    }

    /// Appends a history entry, dropping the oldest past the cap.
    pub fn push_history(&mut self, entry: CheckinEntry) {
        self.checkin_history.push(entry);
        if self.checkin_history.len() > HISTORY_CAP {
            let excess = self.checkin_history.len() - HISTORY_CAP;
            self.checkin_history.drain(..excess);
        }
    }

    pub fn find_transaction_by_key(&self, key: &str) -> Option<&TransactionRecord> {
        self.transactions
            .iter()
            .find(|t| t.idempotency_key.as_deref() == Some(key))
    }

    /// Recomputes the cached level fields from `total_exp`, moving only
    /// upward. Returns true when the level rose.
    pub fn refresh_level(&mut self) -> bool {
        let tier = levels::level_for(self.total_exp);
        if tier.level > self.level {
            self.level = tier.level;
            self.level_name = tier.name.to_string();
            self.level_icon = tier.icon.to_string();
            return true;
        }
        // Keep name/icon in sync for records migrated with a bare level.
        if tier.level == self.level && self.level_name.is_empty() {
            self.level_name = tier.name.to_string();
            self.level_icon = tier.icon.to_string();
        }
        false
    }

    pub fn has_title(&self, id: &str) -> bool {
        self.titles.iter().any(|t| t.id == id)
    }

    /// Grants a title unless already held. Returns true when newly added.
    pub fn grant_title(&mut self, id: &str, expire_days: u32, now: DateTime<Utc>) -> bool {
        if self.has_title(id) {
            return false;
        }
        self.titles.push(EarnedTitle {
            id: id.to_string(),
            earned_at: now,
            expire_days,
        });
        true
    }
}

/// Arrival bookkeeping for one cycle in one scope. Rank is position in
/// `arrival_order`, not a points-sorted rank.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DailyCycleStats {
    pub cycle_id: String,
    pub total_checkins: u32,
    pub arrival_order: Vec<String>,
}

/// On-disk document shape, shared by group files and the global aggregate
/// file (which has no `group_name`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LedgerDocument {
    pub group_name: Option<String>,
    pub users: BTreeMap<String, UserLedgerRecord>,
    pub daily_stats: BTreeMap<String, DailyCycleStats>,
    pub data_version: u32,
}

impl LedgerDocument {
    /// Upgrades a freshly loaded document to the current schema.
    ///
    /// v0/v1 records may carry a zeroed level cache or an over-long
    /// history; both are repaired here. Levels only ever move up.
    pub fn migrate(&mut self) {
        if self.data_version >= DATA_VERSION {
            return;
        }
        for record in self.users.values_mut() {
            if record.balance < 0 {
                tracing::warn!(target: "storage", user = %record.user_id, balance = record.balance, "negative balance on disk, clamping to zero");
                record.balance = 0;
            }
            record.refresh_level();
            if record.checkin_history.len() > HISTORY_CAP {
                let excess = record.checkin_history.len() - HISTORY_CAP;
                record.checkin_history.drain(..excess);
            }
            record.data_version = DATA_VERSION;
        }
        self.data_version = DATA_VERSION;
    }
}
