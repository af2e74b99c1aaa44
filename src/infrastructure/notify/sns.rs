use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sns::types::MessageAttributeValue;
use tracing::{debug, info};

use super::{Notifier, PublishError};
use crate::modules::jobs::CompletionEvent;

#[derive(Clone)]
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(sdk_config: &SdkConfig, topic_arn: &str) -> Self {
        info!(topic_arn = %topic_arn, "SNS notifier ready");
        Self {
            client: SnsClient::new(sdk_config),
            topic_arn: topic_arn.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, event: &CompletionEvent) -> Result<(), PublishError> {
        let message = serde_json::to_string(event)?;

        // Lets subscribers filter on outcome without parsing the body.
        let status = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(event.status.as_str())
            .build()
            .map_err(|e| {
                PublishError::Backend(format!("Failed to build status attribute: {}", e))
            })?;

        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .message_attributes("status", status)
            .send()
            .await
            .map_err(|e| PublishError::Backend(e.to_string()))?;

        debug!(
            image_key = %event.image_key,
            message_id = ?output.message_id(),
            "Published event"
        );
        Ok(())
    }
}
