//! Shared application state.

use std::sync::Arc;

use torque_db::Database;

use crate::config::ApiConfig;

/// Handed to every handler. Both fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig) -> Self {
        AppState {
            db,
            config: Arc::new(config),
        }
    }
}
