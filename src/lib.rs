// Library entry so host adapters, integration tests, and admin tools can
// reference internal modules.

pub mod config;
pub mod cycle;
pub mod error;
pub mod levels;
pub mod model;
pub mod points;
pub mod services;
pub mod storage;

// Convenient re-exports for frequently used types.
pub use config::{AppConfig, CycleConfig, CycleType, PointsConfig};
pub use error::LedgerError;
pub use model::AppState;
pub use services::{CheckinResult, CheckinService, PointsService, QueryService};
pub use storage::{LedgerStore, Scope, UserLedgerRecord};
