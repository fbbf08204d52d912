//! Shared application state.
//!
//! An `Arc<AppState>` is the single handle a host process (chat-bot
//! adapter, REST layer, admin CLI) threads through its handlers; all
//! services share one store and one config.

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{CheckinService, PointsService, QueryService};
use crate::storage::LedgerStore;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<LedgerStore>,
    pub points: PointsService,
    pub checkin: CheckinService,
    pub query: QueryService,
}

impl AppState {
    pub fn new(config: AppConfig, data_dir: impl AsRef<Path>) -> Arc<Self> {
        let config = Arc::new(config);
        let store = Arc::new(LedgerStore::new(data_dir.as_ref()));
        Arc::new(Self {
            points: PointsService::new(store.clone()),
            checkin: CheckinService::new(store.clone(), config.clone()),
            query: QueryService::new(store.clone()),
            config,
            store,
        })
    }

    /// Runs one retention pass, dropping history and transaction entries
    /// older than the configured horizon.
    pub async fn run_retention(&self) -> Result<(), crate::error::LedgerError> {
        self.store
            .run_retention(self.config.retention.horizon_days)
            .await
    }
}
