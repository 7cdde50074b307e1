use crate::config::Config;
use crate::pool::WorkerPool;
use std::sync::Arc;

/// Service state shared across connections
pub struct AppState {
    pub pool: WorkerPool,
    pub config: Arc<Config>,
}
