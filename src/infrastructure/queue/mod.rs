pub mod memory;
pub mod rabbitmq;
pub mod sqs;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("unknown lease handle: {0}")]
    UnknownLease(String),
}

/// A leased message. Invisible to other consumers until deleted or the lease expires.
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: Vec<u8>,
    pub lease_handle: String,
    /// How many times the queue has handed this message out, this delivery included.
    pub receive_count: u32,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Blocks up to `wait_seconds` for at least one message.
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledges a message. Not calling this is how a message gets redelivered.
    async fn delete(&self, lease_handle: &str) -> Result<(), QueueError>;

    async fn send(&self, body: &[u8]) -> Result<(), QueueError>;
}
