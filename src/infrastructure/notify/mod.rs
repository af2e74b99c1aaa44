pub mod memory;
pub mod sns;

use async_trait::async_trait;
use thiserror::Error;

use crate::modules::jobs::CompletionEvent;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("notification backend error: {0}")]
    Backend(String),
}

/// Fan-out channel for completion and failure events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &CompletionEvent) -> Result<(), PublishError>;
}
