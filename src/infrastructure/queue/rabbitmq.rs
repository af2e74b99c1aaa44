use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{JobQueue, QueueError, ReceivedMessage};

/// Gap between `basic_get` attempts while emulating a long poll.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// RabbitMQ-backed job queue.
///
/// The lease is the unacknowledged delivery: it stays with this channel until
/// `basic_ack`, and goes back to the queue when the broker's delivery-ack
/// timeout closes the channel or the connection drops.
#[derive(Clone)]
pub struct RabbitMqQueue {
    url: String,
    queue: String,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqQueue {
    async fn connect(url: &str) -> Result<(Connection, Channel)> {
        info!("Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        info!("Connected to RabbitMQ");
        Ok((conn, channel))
    }

    pub async fn new(url: &str, queue: &str) -> Result<Self> {
        let (conn, channel) = Self::connect(url).await?;
        let service = Self {
            url: url.to_string(),
            queue: queue.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        };
        service.declare().await?;
        Ok(service)
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        self.declare().await
    }

    async fn declare(&self) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .queue_declare(
                self.queue.as_str(),
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;
        Ok(())
    }

    async fn publish_internal(&self, payload: &[u8]) -> Result<()> {
        let channel = self.channel.lock().await;

        channel
            .basic_publish(
                "",
                self.queue.as_str(),
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }

    async fn get_internal(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>> {
        let channel = self.channel.lock().await;
        let mut received = Vec::new();

        while received.len() < max_messages {
            let message = channel
                .basic_get(self.queue.as_str(), BasicGetOptions { no_ack: false })
                .await
                .map_err(|e| anyhow!("Failed to get message: {}", e))?;

            let Some(message) = message else {
                break;
            };
            let delivery = message.delivery;
            received.push(ReceivedMessage {
                message_id: delivery.delivery_tag.to_string(),
                body: delivery.data,
                lease_handle: delivery.delivery_tag.to_string(),
                // The broker only says whether this is a redelivery.
                receive_count: if delivery.redelivered { 2 } else { 1 },
            });
        }

        Ok(received)
    }

    async fn ack_internal(&self, delivery_tag: u64) -> Result<()> {
        let channel = self.channel.lock().await;
        channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to ack message: {}", e))
    }
}

#[async_trait]
impl JobQueue for RabbitMqQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.max(1) as usize;
        let deadline = Instant::now() + Duration::from_secs(wait_seconds.max(0) as u64);

        loop {
            let received = match self.get_internal(max_messages).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("RabbitMQ get failed: {}. Retrying after reconnect.", e);
                    self.reconnect()
                        .await
                        .map_err(|e| QueueError::Backend(e.to_string()))?;
                    self.get_internal(max_messages)
                        .await
                        .map_err(|e| QueueError::Backend(e.to_string()))?
                }
            };

            if !received.is_empty() || Instant::now() >= deadline {
                debug!(count = received.len(), "Received messages");
                return Ok(received);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, lease_handle: &str) -> Result<(), QueueError> {
        let delivery_tag: u64 = lease_handle
            .parse()
            .map_err(|_| QueueError::UnknownLease(lease_handle.to_string()))?;

        // Delivery tags are channel-scoped, so a reconnect would ack the wrong message.
        self.ack_internal(delivery_tag)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    async fn send(&self, body: &[u8]) -> Result<(), QueueError> {
        if let Err(e) = self.publish_internal(body).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect()
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            self.publish_internal(body)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        }

        Ok(())
    }
}
