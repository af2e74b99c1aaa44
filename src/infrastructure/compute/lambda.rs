use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use tracing::{debug, info};

use super::{ComputeClient, ComputeError, InvocationResponse};

/// Invokes a named function with request/response semantics.
#[derive(Clone)]
pub struct LambdaCompute {
    client: Client,
    function_name: String,
}

impl LambdaCompute {
    pub fn new(sdk_config: &SdkConfig, function_name: &str) -> Self {
        info!(function = %function_name, "Delegated compute ready");
        Self {
            client: Client::new(sdk_config),
            function_name: function_name.to_string(),
        }
    }
}

#[async_trait]
impl ComputeClient for LambdaCompute {
    async fn invoke(&self, payload: Vec<u8>) -> Result<InvocationResponse, ComputeError> {
        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| ComputeError::Invocation(format!("{}: {}", self.function_name, e)))?;

        let response = InvocationResponse {
            status_code: output.status_code(),
            function_error: output.function_error().map(str::to_string),
            payload: output
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default(),
        };

        debug!(
            function = %self.function_name,
            status_code = response.status_code,
            "Invocation returned"
        );
        Ok(response)
    }
}
