use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Notifier, PublishError};
use crate::modules::jobs::CompletionEvent;

/// Records published events and their wire bodies. Can be told to fail to exercise
/// best-effort publishing.
#[derive(Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<CompletionEvent>>,
    payloads: Mutex<Vec<Value>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<CompletionEvent> {
        self.events.lock().await.clone()
    }

    /// Published bodies as JSON, in publish order.
    pub async fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, event: &CompletionEvent) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Backend("notification channel unavailable".into()));
        }
        let payload = serde_json::to_value(event)?;
        self.payloads.lock().await.push(payload);
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
