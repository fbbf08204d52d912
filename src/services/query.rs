//! Read-only ledger projections for display and admin tooling.
//!
//! These reads go straight to the store cache without taking per-user
//! locks; they tolerate eventual consistency with the last committed state.

use std::sync::Arc;

use crate::storage::{CheckinEntry, DailyCycleStats, LedgerStore, Scope, UserLedgerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardSort {
    TotalExp,
    Balance,
}

#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub nickname: String,
    pub total_exp: i64,
    pub balance: i64,
    pub level: u32,
    pub level_name: String,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<LedgerStore>,
}

impl QueryService {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Top users of a scope sorted by the requested counter, descending.
    /// `offset`/`limit` page through the sorted list.
    pub async fn leaderboard(
        &self,
        scope: &Scope,
        sort: LeaderboardSort,
        offset: usize,
        limit: usize,
    ) -> Vec<LeaderboardEntry> {
        let doc = self.store.document(scope).await;
        let mut users: Vec<&UserLedgerRecord> = doc.users.values().collect();
        users.sort_by(|a, b| match sort {
            LeaderboardSort::TotalExp => b.total_exp.cmp(&a.total_exp),
            LeaderboardSort::Balance => b.balance.cmp(&a.balance),
        });
        users
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(i, r)| LeaderboardEntry {
                rank: i as u32 + 1,
                user_id: r.user_id.clone(),
                nickname: r.nickname.clone(),
                total_exp: r.total_exp,
                balance: r.balance,
                level: r.level,
                level_name: r.level_name.clone(),
            })
            .collect()
    }

    /// A user's most recent check-ins, newest first.
    pub async fn checkin_history(
        &self,
        scope: &Scope,
        user_id: &str,
        limit: usize,
    ) -> Vec<CheckinEntry> {
        match self.store.get_user(scope, user_id).await {
            Some(r) => r.checkin_history.into_iter().rev().take(limit).collect(),
            None => Vec::new(),
        }
    }

    /// Arrival bookkeeping for one cycle, if anyone checked in.
    pub async fn cycle_arrivals(&self, scope: &Scope, cycle_id: &str) -> Option<DailyCycleStats> {
        self.store.cycle_stats(scope, cycle_id).await
    }

    /// Fresh snapshot of one user record in a scope.
    pub async fn user(&self, scope: &Scope, user_id: &str) -> Option<UserLedgerRecord> {
        self.store.get_user(scope, user_id).await
    }
}
