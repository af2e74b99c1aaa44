use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{JobQueue, QueueError, ReceivedMessage};

#[derive(Clone, Debug)]
struct Entry {
    id: String,
    body: Vec<u8>,
    visible_at: Instant,
    receive_count: u32,
    lease: Option<String>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    dead_letters: Vec<Vec<u8>>,
    deleted: Vec<String>,
}

/// In-process queue with SQS-like visibility timeouts.
///
/// A received message is hidden for `visibility_timeout`, then becomes receivable
/// again with a fresh lease handle. With a max receive count set, a message that
/// is due for another delivery past that count moves to the dead-letter list instead.
/// Timing uses tokio's clock, so tests can drive lease expiry with a paused runtime.
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    arrivals: Notify,
    visibility_timeout: Duration,
    max_receive_count: Option<u32>,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            arrivals: Notify::new(),
            visibility_timeout,
            max_receive_count: None,
        }
    }

    pub fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = Some(max_receive_count);
        self
    }

    /// Messages receivable right now.
    pub async fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.visible_at <= now)
            .count()
    }

    /// Messages still in the queue, leased or not.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.inner.lock().await.dead_letters.clone()
    }

    /// Ids of acknowledged messages, in deletion order.
    pub async fn deleted(&self) -> Vec<String> {
        self.inner.lock().await.deleted.clone()
    }

    async fn take_visible(&self, max_messages: usize) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let Inner {
            entries,
            dead_letters,
            ..
        } = &mut *inner;

        if let Some(max) = self.max_receive_count {
            entries.retain(|e| {
                let exhausted = e.visible_at <= now && e.receive_count >= max;
                if exhausted {
                    dead_letters.push(e.body.clone());
                }
                !exhausted
            });
        }

        let mut received = Vec::new();
        for entry in entries.iter_mut().filter(|e| e.visible_at <= now) {
            if received.len() >= max_messages {
                break;
            }
            let lease = Uuid::new_v4().to_string();
            entry.receive_count += 1;
            entry.visible_at = now + self.visibility_timeout;
            entry.lease = Some(lease.clone());
            received.push(ReceivedMessage {
                message_id: entry.id.clone(),
                body: entry.body.clone(),
                lease_handle: lease,
                receive_count: entry.receive_count,
            });
        }
        received
    }

    async fn next_visible_at(&self) -> Option<Instant> {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.visible_at)
            .min()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.max(1) as usize;
        let deadline = Instant::now() + Duration::from_secs(wait_seconds.max(0) as u64);

        loop {
            let arrived = self.arrivals.notified();
            let received = self.take_visible(max_messages).await;
            if !received.is_empty() || Instant::now() >= deadline {
                return Ok(received);
            }

            // Wake on a new message, a lease expiring, or the poll deadline.
            let wake_at = match self.next_visible_at().await {
                Some(at) if at < deadline => at,
                _ => deadline,
            };
            tokio::select! {
                _ = arrived => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, lease_handle: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let position = inner
            .entries
            .iter()
            .position(|e| e.lease.as_deref() == Some(lease_handle));

        match position {
            Some(index) => {
                let entry = inner.entries.remove(index);
                inner.deleted.push(entry.id);
                Ok(())
            }
            None => Err(QueueError::UnknownLease(lease_handle.to_string())),
        }
    }

    async fn send(&self, body: &[u8]) -> Result<(), QueueError> {
        self.inner.lock().await.entries.push(Entry {
            id: Uuid::new_v4().to_string(),
            body: body.to_vec(),
            visible_at: Instant::now(),
            receive_count: 0,
            lease: None,
        });
        self.arrivals.notify_waiters();
        Ok(())
    }
}
