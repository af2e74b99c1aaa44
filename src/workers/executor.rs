use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info};

use crate::infrastructure::compute::ComputeClient;
use crate::infrastructure::storage::ObjectStore;
use crate::modules::jobs::{JobError, JobMessage};
use crate::modules::transform::{TransformEngine, OUTPUT_CONTENT_TYPE};

/// Runs one job to completion and returns the key the result was stored under.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &JobMessage) -> Result<String, JobError>;

    fn name(&self) -> &'static str;
}

/// Fetch, transform and store inside this process.
pub struct LocalExecutor {
    storage: Arc<dyn ObjectStore>,
    engine: TransformEngine,
}

impl LocalExecutor {
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self {
            storage,
            engine: TransformEngine::new(),
        }
    }
}

#[async_trait]
impl JobExecutor for LocalExecutor {
    async fn execute(&self, job: &JobMessage) -> Result<String, JobError> {
        debug!(image_key = %job.image_key, "Fetching source");
        let source = self.storage.get(&job.image_key).await?;

        debug!(image_key = %job.image_key, bytes = source.len(), "Transforming");
        let result = self
            .engine
            .apply_blocking(source, job.operations.clone())
            .await?;

        let processed_key = job.processed_image_key();
        debug!(processed_image_key = %processed_key, bytes = result.len(), "Storing result");
        self.storage
            .put(&processed_key, Bytes::from(result), OUTPUT_CONTENT_TYPE)
            .await?;

        Ok(processed_key)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Hands the job to a remote function and trusts its answer.
pub struct DelegatedExecutor {
    compute: Arc<dyn ComputeClient>,
}

impl DelegatedExecutor {
    pub fn new(compute: Arc<dyn ComputeClient>) -> Self {
        Self { compute }
    }
}

#[async_trait]
impl JobExecutor for DelegatedExecutor {
    async fn execute(&self, job: &JobMessage) -> Result<String, JobError> {
        let payload = serde_json::to_vec(job)
            .map_err(|e| JobError::DelegatedExecution(format!("cannot serialize job: {}", e)))?;

        let response = self.compute.invoke(payload).await?;

        if let Some(function_error) = response.function_error {
            return Err(JobError::DelegatedExecution(format!(
                "remote function raised: {}",
                function_error
            )));
        }
        if !(200..300).contains(&response.status_code) {
            return Err(JobError::DelegatedExecution(format!(
                "invocation returned status {}",
                response.status_code
            )));
        }

        let processed_key = job.processed_image_key();
        check_response_body(&response.payload, &processed_key)?;

        info!(
            image_key = %job.image_key,
            processed_image_key = %processed_key,
            "Delegated job succeeded"
        );
        Ok(processed_key)
    }

    fn name(&self) -> &'static str {
        "delegated"
    }
}

/// Accepts an empty body, `null`, or an object whose optional `statusCode` is a 2xx
/// integer and whose optional `processed_image_key` names the deterministic key.
fn check_response_body(payload: &[u8], processed_key: &str) -> Result<(), JobError> {
    if payload.is_empty() {
        return Ok(());
    }
    let body: Value = serde_json::from_slice(payload).map_err(|e| {
        JobError::DelegatedExecution(format!("unreadable response body: {}", e))
    })?;
    let fields = match &body {
        Value::Null => return Ok(()),
        Value::Object(fields) => fields,
        other => {
            return Err(JobError::DelegatedExecution(format!(
                "unexpected response body: {}",
                other
            )));
        }
    };

    if let Some(status) = fields.get("statusCode") {
        let ok = status
            .as_i64()
            .is_some_and(|code| (200..300).contains(&code));
        if !ok {
            return Err(JobError::DelegatedExecution(format!(
                "remote function reported status {}",
                status
            )));
        }
    }

    if let Some(key) = fields.get("processed_image_key") {
        if key.as_str() != Some(processed_key) {
            return Err(JobError::DelegatedExecution(format!(
                "remote function stored {} instead of {}",
                key, processed_key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::compute::{ComputeError, InvocationResponse};
    use crate::infrastructure::storage::memory::MemoryStorage;
    use crate::modules::jobs::Operation;
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tokio::sync::Mutex;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    struct FakeCompute {
        response: Result<InvocationResponse, String>,
        payloads: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeCompute {
        fn answering(response: InvocationResponse) -> Self {
            Self {
                response: Ok(response),
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ComputeClient for FakeCompute {
        async fn invoke(&self, payload: Vec<u8>) -> Result<InvocationResponse, ComputeError> {
            self.payloads.lock().await.push(payload);
            self.response.clone().map_err(ComputeError::Invocation)
        }
    }

    #[tokio::test]
    async fn local_executor_stores_png_under_processed_key() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("cat.png", png(80, 60), "image/png").await;
        let executor = LocalExecutor::new(storage.clone());

        let job = JobMessage::new("cat.png", vec![Operation::Resize { width: 8, height: 6 }]);
        let key = executor.execute(&job).await.unwrap();

        assert_eq!(key, "processed-cat.png");
        let stored = storage.object(&key).await.unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(image::load_from_memory(&stored.body).unwrap().dimensions(), (8, 6));
    }

    #[tokio::test]
    async fn local_executor_reports_missing_source() {
        let executor = LocalExecutor::new(Arc::new(MemoryStorage::new()));
        let err = executor
            .execute(&JobMessage::new("ghost.png", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[tokio::test]
    async fn local_executor_does_not_store_on_transform_failure() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("bad.png", b"garbage".to_vec(), "image/png").await;
        let executor = LocalExecutor::new(storage.clone());

        let err = executor
            .execute(&JobMessage::new("bad.png", vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Decode(_)));
        assert!(storage.writes().await.is_empty());
    }

    #[tokio::test]
    async fn delegated_executor_sends_the_job_and_accepts_matching_key() {
        let compute = Arc::new(FakeCompute::answering(InvocationResponse {
            status_code: 200,
            function_error: None,
            payload: br#"{"statusCode":200,"processed_image_key":"processed-cat.png"}"#.to_vec(),
        }));
        let executor = DelegatedExecutor::new(compute.clone());
        let job = JobMessage::new("cat.png", vec![Operation::Grayscale]);

        let key = executor.execute(&job).await.unwrap();

        assert_eq!(key, "processed-cat.png");
        let sent = compute.payloads.lock().await.clone();
        assert_eq!(JobMessage::parse(&sent[0]).unwrap(), job);
    }

    #[tokio::test]
    async fn unknown_operations_are_forwarded_as_received() {
        let compute = Arc::new(FakeCompute::answering(InvocationResponse {
            status_code: 200,
            function_error: None,
            payload: vec![],
        }));
        let job = JobMessage::parse(
            br#"{"image_key":"a.png","operations":[{"operation":"sepia","strength":3}]}"#,
        )
        .unwrap();

        DelegatedExecutor::new(compute.clone()).execute(&job).await.unwrap();

        let sent = compute.payloads.lock().await.clone();
        let forwarded: Value = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(
            forwarded,
            serde_json::json!({
                "image_key": "a.png",
                "operations": [{"operation": "sepia", "strength": 3}]
            })
        );
    }

    #[tokio::test]
    async fn delegated_executor_falls_back_to_deterministic_key() {
        let compute = Arc::new(FakeCompute::answering(InvocationResponse {
            status_code: 200,
            function_error: None,
            payload: b"null".to_vec(),
        }));
        let key = DelegatedExecutor::new(compute)
            .execute(&JobMessage::new("cat.png", vec![]))
            .await
            .unwrap();
        assert_eq!(key, "processed-cat.png");
    }

    #[tokio::test]
    async fn delegated_failures_are_execution_errors() {
        let responses = [
            InvocationResponse {
                status_code: 200,
                function_error: Some("Unhandled".into()),
                payload: vec![],
            },
            InvocationResponse {
                status_code: 500,
                function_error: None,
                payload: vec![],
            },
            InvocationResponse {
                status_code: 200,
                function_error: None,
                payload: br#"{"statusCode":404}"#.to_vec(),
            },
        ];
        let bad_bodies = [
            &br#"{"statusCode":"500"}"#[..],
            br#"{"statusCode":500.0}"#,
            br#"{"statusCode":200.5}"#,
            br#""internal error""#,
            b"Task timed out",
            br#"[200]"#,
            br#"{"processed_image_key":"resized-cat.png"}"#,
        ];
        let responses = responses.into_iter().chain(bad_bodies.iter().map(|body| {
            InvocationResponse {
                status_code: 200,
                function_error: None,
                payload: body.to_vec(),
            }
        }));

        for response in responses {
            let executor = DelegatedExecutor::new(Arc::new(FakeCompute::answering(response)));
            let err = executor
                .execute(&JobMessage::new("cat.png", vec![]))
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::DelegatedExecution(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn unreachable_compute_is_an_execution_error() {
        let compute = Arc::new(FakeCompute {
            response: Err("connection refused".into()),
            payloads: Mutex::new(Vec::new()),
        });
        let err = DelegatedExecutor::new(compute)
            .execute(&JobMessage::new("cat.png", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::DelegatedExecution(_)));
    }
}
