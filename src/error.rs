//! Error taxonomy for ledger operations.
//!
//! Expected, user-facing rejections (`CycleLimitExceeded`,
//! `InsufficientBalance`, validation failures) are cheap values the caller
//! turns into a chat reply; they are not logged as errors. Persistence
//! failures are logged with full context at the site that hits them and
//! surfaced to the caller as a generic failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Award/consume amounts must be strictly positive.
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// `consume` requires an idempotency key so retries are replay-safe.
    #[error("an idempotency key is required for consume operations")]
    MissingIdempotencyKey,

    /// The user hit the per-cycle check-in cap. `cycle_noun` is the
    /// user-facing name of the window ("today" / "this week" / "this month").
    #[error("{cycle_noun} already checked in {count} times (limit {limit})")]
    CycleLimitExceeded {
        cycle_noun: &'static str,
        count: u32,
        limit: u32,
    },

    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("failed to persist ledger state: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("failed to encode ledger state: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LedgerError {
    /// True for rejections meant to be shown to the end user verbatim.
    /// Internal failures get a generic message instead.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount(_)
                | LedgerError::MissingIdempotencyKey
                | LedgerError::CycleLimitExceeded { .. }
                | LedgerError::InsufficientBalance { .. }
        )
    }
}
