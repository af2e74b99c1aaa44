use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::ConfigError;
use crate::config::env::{self, EnvKey, Lookup, ProcessEnv};

pub const DEFAULT_ENVIRONMENT: &str = "nonprod";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_QUEUE_NAME: &str = "image_transform_jobs";

/// Which queue adapter the configured URL points at.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub enum QueueBackend {
    Sqs,
    RabbitMq,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub queue_url: String,
    pub queue_backend: QueueBackend,
    pub queue_name: String,
    pub bucket_name: String,
    pub topic_arn: String,
    pub aws_region: String,
    pub aws_endpoint_url: Option<String>,
    pub delegate_function: Option<String>,
    pub worker: WorkerSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WorkerSettings {
    /// Messages requested per poll (1..=10).
    pub max_messages: i32,
    /// Long-poll wait in seconds (0..=20).
    pub wait_seconds: i32,
    pub visibility_timeout: Option<i32>,
    pub poll_error_backoff_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_seconds: 20,
            visibility_timeout: None,
            poll_error_backoff_ms: 1000,
        }
    }
}

impl WorkerSettings {
    pub fn poll_error_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_error_backoff_ms)
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_lookup(&ProcessEnv)
    }

    pub fn from_lookup(source: &impl Lookup) -> Result<Self, ConfigError> {
        let environment = env::get_or(source, EnvKey::Environment, DEFAULT_ENVIRONMENT);
        let queue_url = env::get_scoped(source, EnvKey::QueueUrl, &environment)?;
        let queue_backend = queue_backend_for(&queue_url)?;

        let aws_endpoint_url = env::get_opt(source, EnvKey::AwsEndpointUrl);
        if let Some(endpoint) = &aws_endpoint_url {
            Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
                key: EnvKey::AwsEndpointUrl.as_str().to_string(),
                reason: e.to_string(),
            })?;
        }

        let defaults = WorkerSettings::default();
        let worker = WorkerSettings {
            max_messages: in_range(
                EnvKey::MaxMessages,
                env::get_parsed(source, EnvKey::MaxMessages, defaults.max_messages)?,
                1,
                10,
            )?,
            wait_seconds: in_range(
                EnvKey::WaitSeconds,
                env::get_parsed(source, EnvKey::WaitSeconds, defaults.wait_seconds)?,
                0,
                20,
            )?,
            visibility_timeout: match env::get_opt(source, EnvKey::VisibilityTimeout) {
                Some(_) => Some(in_range(
                    EnvKey::VisibilityTimeout,
                    env::get_parsed(source, EnvKey::VisibilityTimeout, 0)?,
                    1,
                    43_200,
                )?),
                None => None,
            },
            poll_error_backoff_ms: env::get_parsed(
                source,
                EnvKey::PollErrorBackoffMs,
                defaults.poll_error_backoff_ms,
            )?,
        };

        Ok(Self {
            queue_url,
            queue_backend,
            queue_name: env::get_or(source, EnvKey::QueueName, DEFAULT_QUEUE_NAME),
            bucket_name: env::get(source, EnvKey::BucketName)?,
            topic_arn: env::get(source, EnvKey::TopicArn)?,
            aws_region: env::get_or(source, EnvKey::AwsRegion, DEFAULT_REGION),
            aws_endpoint_url,
            delegate_function: env::get_opt(source, EnvKey::DelegateFunction),
            environment,
            worker,
        })
    }
}

fn queue_backend_for(queue_url: &str) -> Result<QueueBackend, ConfigError> {
    let url = Url::parse(queue_url).map_err(|e| ConfigError::Invalid {
        key: EnvKey::QueueUrl.as_str().to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "amqp" | "amqps" => Ok(QueueBackend::RabbitMq),
        "http" | "https" => Ok(QueueBackend::Sqs),
        other => Err(ConfigError::Invalid {
            key: EnvKey::QueueUrl.as_str().to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn in_range(key: EnvKey, value: i32, min: i32, max: i32) -> Result<i32, ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            key: key.as_str().to_string(),
            reason: format!("{} is outside {}..={}", value, min, max),
        });
    }
    Ok(value)
}
