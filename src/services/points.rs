//! Points core service: award/consume against the dual ledger.
//!
//! Awards raise both `total_exp` and `balance`; consumes deduct from
//! `balance` only. Both paths are idempotency-key aware: a replayed key
//! returns the originally computed result without mutating anything.
//! Mutations follow write-after-mutate: the updated record is committed to
//! disk before success is reported, and a failed commit fails the call with
//! the cache restored from disk.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::LedgerError;
use crate::levels;
use crate::storage::{
    LedgerStore, Scope, ScopedMutation, TransactionKind, TransactionRecord, UserLedgerRecord,
};

#[derive(Debug, Clone, Default)]
pub struct AwardRequest {
    pub amount: i64,
    /// Originating feature, e.g. "signin" or another plugin's name.
    pub source: Option<String>,
    pub description: String,
    /// When set, the award is scaled by `1 + signin_bonus_for(level)`.
    pub apply_level_bonus: bool,
    pub multiplier: Option<f64>,
    pub idempotency_key: Option<String>,
    pub operator_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AwardOutcome {
    /// Actual credited amount after multiplier and level bonus.
    pub awarded_total: i64,
    pub new_exp: i64,
    pub new_balance: i64,
    pub new_level: u32,
    pub leveled_up: bool,
    pub transaction_id: String,
    /// True when an idempotency key matched and no new mutation happened.
    pub replayed: bool,
}

#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub amount: i64,
    pub description: String,
    pub idempotency_key: String,
    pub order_id: Option<String>,
    pub operator_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    pub new_balance: i64,
    pub transaction_id: String,
    pub replayed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BalanceCheck {
    pub balance: i64,
    pub sufficient: bool,
}

fn next_tx_id(now: DateTime<Utc>) -> String {
    format!(
        "tx-{}-{:04x}",
        now.timestamp_micros(),
        rand::rng().random_range(0u32..0x1_0000)
    )
}

/// Applies an award to a record in place. Shared by the public `award`
/// path and the check-in orchestrator, which batches the award into a
/// larger commit while holding the same per-user lock.
pub(crate) fn apply_award(
    record: &mut UserLedgerRecord,
    req: &AwardRequest,
    now: DateTime<Utc>,
) -> Result<AwardOutcome, LedgerError> {
    if req.amount <= 0 {
        return Err(LedgerError::InvalidAmount(req.amount));
    }
    if let Some(key) = req.idempotency_key.as_deref() {
        if let Some(tx) = record.find_transaction_by_key(key) {
            return Ok(AwardOutcome {
                awarded_total: tx.amount,
                new_exp: tx.resulting_exp,
                new_balance: tx.resulting_balance,
                new_level: record.level,
                leveled_up: false,
                transaction_id: tx.id.clone(),
                replayed: true,
            });
        }
    }

    let multiplier = req.multiplier.unwrap_or(1.0);
    let level_factor = if req.apply_level_bonus {
        1.0 + levels::signin_bonus_for(record.level)
    } else {
        1.0
    };
    let awarded_total = (req.amount as f64 * multiplier * level_factor).floor() as i64;

    record.total_exp += awarded_total;
    record.balance += awarded_total;
    let leveled_up = record.refresh_level();

    let tx_id = next_tx_id(now);
    record.transactions.push(TransactionRecord {
        id: tx_id.clone(),
        timestamp: now,
        kind: TransactionKind::Award,
        amount: awarded_total,
        resulting_balance: record.balance,
        resulting_exp: record.total_exp,
        description: req.description.clone(),
        idempotency_key: req.idempotency_key.clone(),
        operator_id: req.operator_id.clone(),
        source: req.source.clone(),
    });

    Ok(AwardOutcome {
        awarded_total,
        new_exp: record.total_exp,
        new_balance: record.balance,
        new_level: record.level,
        leveled_up,
        transaction_id: tx_id,
        replayed: false,
    })
}

fn apply_consume(
    record: &mut UserLedgerRecord,
    req: &ConsumeRequest,
    now: DateTime<Utc>,
) -> Result<ConsumeOutcome, LedgerError> {
    if req.amount <= 0 {
        return Err(LedgerError::InvalidAmount(req.amount));
    }
    if req.idempotency_key.is_empty() {
        return Err(LedgerError::MissingIdempotencyKey);
    }
    if let Some(tx) = record.find_transaction_by_key(&req.idempotency_key) {
        return Ok(ConsumeOutcome {
            new_balance: tx.resulting_balance,
            transaction_id: tx.id.clone(),
            replayed: true,
        });
    }
    if record.balance < req.amount {
        return Err(LedgerError::InsufficientBalance {
            balance: record.balance,
            required: req.amount,
        });
    }

    record.balance -= req.amount;
    let tx_id = next_tx_id(now);
    record.transactions.push(TransactionRecord {
        id: tx_id.clone(),
        timestamp: now,
        kind: TransactionKind::Consume,
        amount: -req.amount,
        resulting_balance: record.balance,
        resulting_exp: record.total_exp,
        description: req.description.clone(),
        idempotency_key: Some(req.idempotency_key.clone()),
        operator_id: req.operator_id.clone(),
        source: req.order_id.as_ref().map(|o| format!("order:{o}")),
    });

    Ok(ConsumeOutcome {
        new_balance: record.balance,
        transaction_id: tx_id,
        replayed: false,
    })
}

#[derive(Clone)]
pub struct PointsService {
    store: Arc<LedgerStore>,
}

impl PointsService {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    async fn load_or_create(
        &self,
        scope: &Scope,
        user_id: &str,
        nickname: Option<&str>,
    ) -> UserLedgerRecord {
        let mut record = self
            .store
            .get_user(scope, user_id)
            .await
            .unwrap_or_else(|| UserLedgerRecord::new(user_id, nickname.unwrap_or(user_id)));
        if let Some(nick) = nickname {
            if !nick.is_empty() {
                record.nickname = nick.to_string();
            }
        }
        record
    }

    /// Credits points to a group-scoped record. See [`AwardRequest`].
    pub async fn award(
        &self,
        group_id: &str,
        user_id: &str,
        nickname: Option<&str>,
        req: AwardRequest,
    ) -> Result<AwardOutcome, LedgerError> {
        if req.amount <= 0 {
            return Err(LedgerError::InvalidAmount(req.amount));
        }
        let scope = Scope::Group(group_id.to_string());
        let lock = self.store.user_lock(&scope, user_id).await;
        let _guard = lock.lock().await;

        let mut record = self.load_or_create(&scope, user_id, nickname).await;
        let outcome = apply_award(&mut record, &req, Utc::now())?;
        if !outcome.replayed {
            self.persist_user(&scope, record, user_id, "award").await?;
        }
        Ok(outcome)
    }

    /// Deducts from the spendable balance. The idempotency key is
    /// mandatory; a repeated key replays the original result.
    pub async fn consume(
        &self,
        group_id: &str,
        user_id: &str,
        req: ConsumeRequest,
    ) -> Result<ConsumeOutcome, LedgerError> {
        let scope = Scope::Group(group_id.to_string());
        let lock = self.store.user_lock(&scope, user_id).await;
        let _guard = lock.lock().await;

        let mut record = self.load_or_create(&scope, user_id, None).await;
        let outcome = apply_consume(&mut record, &req, Utc::now())?;
        if !outcome.replayed {
            self.persist_user(&scope, record, user_id, "consume").await?;
        }
        Ok(outcome)
    }

    async fn persist_user(
        &self,
        scope: &Scope,
        record: UserLedgerRecord,
        user_id: &str,
        operation: &'static str,
    ) -> Result<(), LedgerError> {
        self.store
            .commit(
                scope,
                ScopedMutation {
                    users: vec![record],
                    ..ScopedMutation::default()
                },
            )
            .await
            .map_err(|err| {
                tracing::error!(target: "points", ?scope, user = %user_id, operation, %err, "ledger persist failed");
                err
            })
    }

    /// Read-only balance probe.
    pub async fn check_balance(&self, group_id: &str, user_id: &str, required: i64) -> BalanceCheck {
        let scope = Scope::Group(group_id.to_string());
        let balance = self
            .store
            .get_user(&scope, user_id)
            .await
            .map(|r| r.balance)
            .unwrap_or(0);
        BalanceCheck {
            balance,
            sufficient: balance >= required,
        }
    }

    pub async fn get_user_points(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Option<UserLedgerRecord> {
        self.store
            .get_user(&Scope::Group(group_id.to_string()), user_id)
            .await
    }

    /// Most recent transactions first.
    pub async fn get_transactions(
        &self,
        group_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Vec<TransactionRecord> {
        let record = self
            .store
            .get_user(&Scope::Group(group_id.to_string()), user_id)
            .await;
        match record {
            Some(r) => r.transactions.into_iter().rev().take(limit).collect(),
            None => Vec::new(),
        }
    }

    /// Admin reset: zeroes the spendable balance, keeps history and
    /// experience intact, and logs the reset in the transaction log.
    pub async fn admin_reset(
        &self,
        group_id: &str,
        user_id: &str,
        operator_id: &str,
    ) -> Result<i64, LedgerError> {
        let scope = Scope::Group(group_id.to_string());
        let lock = self.store.user_lock(&scope, user_id).await;
        let _guard = lock.lock().await;

        let mut record = match self.store.get_user(&scope, user_id).await {
            Some(record) => record,
            None => return Ok(0),
        };
        let drained = record.balance;
        if drained == 0 {
            return Ok(0);
        }
        let now = Utc::now();
        record.balance = 0;
        record.transactions.push(TransactionRecord {
            id: next_tx_id(now),
            timestamp: now,
            kind: TransactionKind::Reset,
            amount: -drained,
            resulting_balance: 0,
            resulting_exp: record.total_exp,
            description: "balance reset".to_string(),
            idempotency_key: None,
            operator_id: Some(operator_id.to_string()),
            source: None,
        });
        self.persist_user(&scope, record, user_id, "reset").await?;
        Ok(drained)
    }
}
