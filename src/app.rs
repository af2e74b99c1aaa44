use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::settings::{AppConfig, QueueBackend};
use crate::infrastructure::aws::load_sdk_config;
use crate::infrastructure::compute::lambda::LambdaCompute;
use crate::infrastructure::notify::sns::SnsNotifier;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::queue::rabbitmq::RabbitMqQueue;
use crate::infrastructure::queue::sqs::SqsQueue;
use crate::infrastructure::storage::s3::S3Storage;
use crate::state::WorkerState;
use crate::workers::{DelegatedExecutor, JobExecutor, LocalExecutor, Worker};

/// Connects every external client and wires up the worker.
pub async fn create_worker(config: AppConfig) -> Result<Worker> {
    let sdk_config = load_sdk_config(&config).await;

    let storage = Arc::new(S3Storage::new(
        &sdk_config,
        &config.bucket_name,
        config.aws_endpoint_url.is_some(),
    ));

    let queue: Arc<dyn JobQueue> = match config.queue_backend {
        QueueBackend::Sqs => Arc::new(SqsQueue::new(
            &sdk_config,
            &config.queue_url,
            config.worker.visibility_timeout,
        )),
        QueueBackend::RabbitMq => Arc::new(
            RabbitMqQueue::new(&config.queue_url, &config.queue_name)
                .await
                .context("connecting to RabbitMQ")?,
        ),
    };

    let notifier = Arc::new(SnsNotifier::new(&sdk_config, &config.topic_arn));

    let executor: Arc<dyn JobExecutor> = match &config.delegate_function {
        Some(function_name) => {
            info!(function = %function_name, "Jobs will run on delegated compute");
            Arc::new(DelegatedExecutor::new(Arc::new(LambdaCompute::new(
                &sdk_config,
                function_name,
            ))))
        }
        None => Arc::new(LocalExecutor::new(storage.clone())),
    };

    let state = WorkerState::new(config, storage, queue, notifier);
    Ok(Worker::new(state, executor))
}
