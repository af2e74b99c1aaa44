use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::notify::Notifier;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::storage::ObjectStore;

/// Clients the worker holds for its whole lifetime. Built once at startup.
#[derive(Clone)]
pub struct WorkerState {
    pub config: AppConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn JobQueue>,
    pub notifier: Arc<dyn Notifier>,
}

impl WorkerState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            storage,
            queue,
            notifier,
        }
    }
}
