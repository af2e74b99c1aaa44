use std::sync::Arc;

use tracing::info;
use validator::Validate;

use super::error::JobError;
use super::model::JobMessage;
use crate::infrastructure::queue::JobQueue;

/// Producer side of the job contract: what the upload/transform API calls.
#[derive(Clone)]
pub struct JobProducer {
    queue: Arc<dyn JobQueue>,
}

impl JobProducer {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    pub async fn enqueue(&self, job: &JobMessage) -> Result<(), JobError> {
        job.validate()
            .map_err(|e| JobError::MalformedJob(e.to_string()))?;

        let body = serde_json::to_vec(job)
            .map_err(|e| JobError::MalformedJob(format!("cannot serialize job: {}", e)))?;
        self.queue.send(&body).await?;

        info!(
            image_key = %job.image_key,
            operations = job.operations.len(),
            "Enqueued transformation job"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queue::memory::MemoryQueue;
    use crate::modules::jobs::model::Operation;
    use std::time::Duration;

    #[tokio::test]
    async fn enqueued_body_parses_back_into_the_same_job() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30)));
        let producer = JobProducer::new(queue.clone());
        let job = JobMessage::new("dog.jpg", vec![Operation::Rotate { degrees: 45 }]);

        producer.enqueue(&job).await.unwrap();

        let received = queue.receive(10, 0).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(JobMessage::parse(&received[0].body).unwrap(), job);
    }

    #[tokio::test]
    async fn rejects_jobs_without_a_key() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30)));
        let producer = JobProducer::new(queue.clone());

        let err = producer
            .enqueue(&JobMessage::new("", vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::MalformedJob(_)));
        assert_eq!(queue.visible_len().await, 0);
    }
}
