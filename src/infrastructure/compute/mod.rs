pub mod lambda;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("invocation failed: {0}")]
    Invocation(String),
}

/// Raw result of a synchronous remote invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvocationResponse {
    pub status_code: i32,
    /// Set when the remote function itself raised.
    pub function_error: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn invoke(&self, payload: Vec<u8>) -> Result<InvocationResponse, ComputeError>;
}
