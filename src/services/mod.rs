//! Service layer: the orchestrators callers embed against.
//!
//! `points` owns ledger mutation semantics, `checkin` is the top-level
//! check-in use case, `query` serves read-only projections.

pub mod checkin;
pub mod points;
pub mod query;

pub use checkin::{CheckinResult, CheckinService};
pub use points::{
    AwardOutcome, AwardRequest, BalanceCheck, ConsumeOutcome, ConsumeRequest, PointsService,
};
pub use query::{LeaderboardEntry, LeaderboardSort, QueryService};
