use thiserror::Error;

use crate::infrastructure::compute::ComputeError;
use crate::infrastructure::notify::PublishError;
use crate::infrastructure::queue::QueueError;
use crate::infrastructure::storage::StorageError;

/// What the worker does with a message after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Delete from the queue. The message can never succeed.
    Acknowledge,
    /// Leave leased. The queue redelivers after the visibility timeout.
    Retain,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("malformed job: {0}")]
    MalformedJob(String),

    #[error("cannot decode source image: {0}")]
    Decode(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cannot encode result image: {0}")]
    Encode(String),

    #[error("source object not found: {0}")]
    NotFound(String),

    #[error("object store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("delegated execution failed: {0}")]
    DelegatedExecution(String),

    #[error("worker error: {0}")]
    Internal(String),
}

impl JobError {
    pub fn disposition(&self) -> Disposition {
        match self {
            JobError::MalformedJob(_) => Disposition::Acknowledge,
            _ => Disposition::Retain,
        }
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::MalformedJob(_) => "malformed_job",
            JobError::Decode(_) => "decode",
            JobError::InvalidOperation(_) => "invalid_operation",
            JobError::Encode(_) => "encode",
            JobError::NotFound(_) => "not_found",
            JobError::Store(_) => "store",
            JobError::Queue(_) => "queue",
            JobError::Publish(_) => "publish",
            JobError::DelegatedExecution(_) => "delegated_execution",
            JobError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => JobError::NotFound(key),
            other => JobError::Store(other.to_string()),
        }
    }
}

impl From<ComputeError> for JobError {
    fn from(err: ComputeError) -> Self {
        JobError::DelegatedExecution(err.to_string())
    }
}

impl From<tokio::task::JoinError> for JobError {
    fn from(err: tokio::task::JoinError) -> Self {
        JobError::Internal(format!("transform task aborted: {}", err))
    }
}
