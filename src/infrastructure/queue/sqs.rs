use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use tracing::{debug, info};

use super::{JobQueue, QueueError, ReceivedMessage};

#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    visibility_timeout: Option<i32>,
}

impl SqsQueue {
    pub fn new(sdk_config: &SdkConfig, queue_url: &str, visibility_timeout: Option<i32>) -> Self {
        info!(queue_url = %queue_url, "SQS queue ready");
        Self {
            client: Client::new(sdk_config),
            queue_url: queue_url.to_string(),
            visibility_timeout,
        }
    }
}

#[async_trait]
impl JobQueue for SqsQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .set_visibility_timeout(self.visibility_timeout)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Backend(format!("receive: {}", e)))?;

        let mut received = Vec::new();
        for message in output.messages() {
            // A message without a receipt handle cannot be acknowledged; let it expire.
            let Some(lease_handle) = message.receipt_handle() else {
                continue;
            };
            let receive_count = message
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse().ok())
                .unwrap_or(1);

            received.push(ReceivedMessage {
                message_id: message.message_id().unwrap_or_default().to_string(),
                body: message.body().unwrap_or_default().as_bytes().to_vec(),
                lease_handle: lease_handle.to_string(),
                receive_count,
            });
        }

        debug!(count = received.len(), "Received messages");
        Ok(received)
    }

    async fn delete(&self, lease_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(lease_handle)
            .send()
            .await
            .map_err(|e| QueueError::Backend(format!("delete: {}", e)))?;
        Ok(())
    }

    async fn send(&self, body: &[u8]) -> Result<(), QueueError> {
        let body = std::str::from_utf8(body)
            .map_err(|e| QueueError::Backend(format!("message body is not UTF-8: {}", e)))?;

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Backend(format!("send: {}", e)))?;
        Ok(())
    }
}
