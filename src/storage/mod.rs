//! Persistence layer: record schemas and the JSON-backed ledger store.
//!
//! One JSON document per group plus one global aggregate document. The
//! in-memory cache is the source of truth between flushes; all writes go
//! through the merge-and-save discipline in [`store::LedgerStore::commit`].

pub mod models;
pub mod store;

pub use models::{
    CheckinEntry, DailyCycleStats, EarnedTitle, LedgerDocument, TransactionKind,
    TransactionRecord, UserLedgerRecord,
};
pub use store::{LedgerStore, Scope, ScopedMutation};
