use std::env;
use std::str::FromStr;

use super::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvKey {
    Environment,
    QueueUrl,
    QueueName,
    BucketName,
    TopicArn,
    AwsRegion,
    AwsEndpointUrl,
    DelegateFunction,
    MaxMessages,
    WaitSeconds,
    VisibilityTimeout,
    PollErrorBackoffMs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::Environment => "ENVIRONMENT",
            EnvKey::QueueUrl => "SQS_QUEUE_URL",
            EnvKey::QueueName => "QUEUE_NAME",
            EnvKey::BucketName => "BUCKET_NAME",
            EnvKey::TopicArn => "SNS_TOPIC_ARN",
            EnvKey::AwsRegion => "AWS_REGION",
            EnvKey::AwsEndpointUrl => "AWS_ENDPOINT_URL",
            EnvKey::DelegateFunction => "DELEGATE_FUNCTION_NAME",
            EnvKey::MaxMessages => "WORKER_MAX_MESSAGES",
            EnvKey::WaitSeconds => "WORKER_WAIT_SECONDS",
            EnvKey::VisibilityTimeout => "WORKER_VISIBILITY_TIMEOUT",
            EnvKey::PollErrorBackoffMs => "WORKER_POLL_ERROR_BACKOFF_MS",
        }
    }
}

/// Variable source. The process environment in production, a map in tests.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl Lookup for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Reads a key, treating blank values as unset.
pub fn get_opt(source: &impl Lookup, key: EnvKey) -> Option<String> {
    source
        .lookup(key.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get(source: &impl Lookup, key: EnvKey) -> Result<String, ConfigError> {
    get_opt(source, key).ok_or(ConfigError::Missing(key.as_str().to_string()))
}

pub fn get_or(source: &impl Lookup, key: EnvKey, default: &str) -> String {
    get_opt(source, key).unwrap_or_else(|| default.to_string())
}

/// Looks up `<KEY>_<SCOPE>` first and falls back to the bare key.
pub fn get_scoped(source: &impl Lookup, key: EnvKey, scope: &str) -> Result<String, ConfigError> {
    let scoped = format!("{}_{}", key.as_str(), scope.to_uppercase());
    source
        .lookup(&scoped)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(Ok)
        .unwrap_or_else(|| {
            get(source, key).map_err(|_| {
                ConfigError::Missing(format!("{} (or {})", scoped, key.as_str()))
            })
        })
}

pub fn get_parsed<T: FromStr>(
    source: &impl Lookup,
    key: EnvKey,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get_opt(source, key) {
        Some(val) => val.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.as_str().to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
