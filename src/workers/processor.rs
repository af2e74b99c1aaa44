use std::ops::AddAssign;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::JobExecutor;
use crate::config::settings::WorkerSettings;
use crate::infrastructure::queue::{QueueError, ReceivedMessage};
use crate::modules::jobs::{CompletionEvent, Disposition, JobError, JobMessage};
use crate::state::WorkerState;

/// Terminal state of one message within a polling cycle.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Processed, published (best effort) and acknowledged.
    Completed { processed_image_key: String },
    /// Poison message, acknowledged without processing.
    Dropped(JobError),
    /// Left leased; the queue will redeliver it.
    Failed(JobError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub completed: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Completed { .. } => self.completed += 1,
            MessageOutcome::Dropped(_) => self.dropped += 1,
            MessageOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl AddAssign for CycleReport {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.completed += other.completed;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

/// Sequential poll -> execute -> publish -> acknowledge loop.
///
/// One instance processes one message at a time. Scale out by running more
/// instances against the same queue; the queue's lease keeps them apart.
pub struct Worker {
    state: WorkerState,
    executor: Arc<dyn JobExecutor>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(state: WorkerState, executor: Arc<dyn JobExecutor>) -> Self {
        let settings = state.config.worker.clone();
        Self {
            state,
            executor,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Polls until `shutdown` is cancelled. A batch in hand is always finished first.
    pub async fn run(&self, shutdown: CancellationToken) -> CycleReport {
        info!(
            executor = self.executor.name(),
            environment = %self.state.config.environment,
            max_messages = self.settings.max_messages,
            wait_seconds = self.settings.wait_seconds,
            "Worker started"
        );

        let mut totals = CycleReport::default();
        while !shutdown.is_cancelled() {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll() => polled,
            };

            match polled {
                Ok(messages) => totals += self.process_batch(messages).await,
                Err(e) => {
                    error!(error = %e, "Polling failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.poll_error_backoff()) => {}
                    }
                }
            }
        }

        info!(
            received = totals.received,
            completed = totals.completed,
            dropped = totals.dropped,
            failed = totals.failed,
            "Worker stopped"
        );
        totals
    }

    /// One polling cycle: receive a batch and process every message in it.
    pub async fn run_once(&self) -> Result<CycleReport, QueueError> {
        let messages = self.poll().await?;
        Ok(self.process_batch(messages).await)
    }

    async fn poll(&self) -> Result<Vec<ReceivedMessage>, QueueError> {
        debug!("Polling queue");
        self.state
            .queue
            .receive(self.settings.max_messages, self.settings.wait_seconds)
            .await
    }

    async fn process_batch(&self, messages: Vec<ReceivedMessage>) -> CycleReport {
        let mut report = CycleReport {
            received: messages.len(),
            ..CycleReport::default()
        };
        for message in &messages {
            let outcome = self.handle_message(message).await;
            report.record(&outcome);
        }
        report
    }

    /// Processes one message. Never returns an error: every failure ends in an outcome.
    pub async fn handle_message(&self, message: &ReceivedMessage) -> MessageOutcome {
        let job = match JobMessage::parse(&message.body) {
            Ok(job) => job,
            Err(e) => return self.drop_poison(message, e).await,
        };

        info!(
            message_id = %message.message_id,
            image_key = %job.image_key,
            operations = job.operations.len(),
            receive_count = message.receive_count,
            "Processing job"
        );

        match self.executor.execute(&job).await {
            Ok(processed_image_key) => self.complete(message, &job, processed_image_key).await,
            Err(e) => self.fail(message, &job, e).await,
        }
    }

    async fn complete(
        &self,
        message: &ReceivedMessage,
        job: &JobMessage,
        processed_image_key: String,
    ) -> MessageOutcome {
        let event = CompletionEvent::completed(
            job,
            processed_image_key.clone(),
            &self.state.config.environment,
        );
        self.publish(&event).await;

        if let Err(e) = self.state.queue.delete(&message.lease_handle).await {
            // Result is stored; the redelivery will overwrite it with the same bytes.
            error!(
                message_id = %message.message_id,
                image_key = %job.image_key,
                error = %e,
                "Failed to acknowledge completed job"
            );
            return MessageOutcome::Failed(e.into());
        }

        info!(
            image_key = %job.image_key,
            processed_image_key = %processed_image_key,
            "Job completed"
        );
        MessageOutcome::Completed {
            processed_image_key,
        }
    }

    async fn fail(
        &self,
        message: &ReceivedMessage,
        job: &JobMessage,
        err: JobError,
    ) -> MessageOutcome {
        match err.disposition() {
            Disposition::Acknowledge => self.drop_poison(message, err).await,
            Disposition::Retain => {
                warn!(
                    message_id = %message.message_id,
                    image_key = %job.image_key,
                    kind = err.kind(),
                    error = %err,
                    receive_count = message.receive_count,
                    "Job failed, leaving message for redelivery"
                );
                let event = CompletionEvent::failed(job, &self.state.config.environment);
                self.publish(&event).await;
                MessageOutcome::Failed(err)
            }
        }
    }

    async fn drop_poison(&self, message: &ReceivedMessage, err: JobError) -> MessageOutcome {
        warn!(
            message_id = %message.message_id,
            error = %err,
            "Dropping malformed message"
        );
        if let Err(e) = self.state.queue.delete(&message.lease_handle).await {
            error!(
                message_id = %message.message_id,
                error = %e,
                "Failed to drop malformed message"
            );
            return MessageOutcome::Failed(e.into());
        }
        MessageOutcome::Dropped(err)
    }

    /// Best effort: a lost event never blocks acknowledgment.
    async fn publish(&self, event: &CompletionEvent) {
        if let Err(e) = self.state.notifier.publish(event).await {
            error!(
                image_key = %event.image_key,
                status = event.status.as_str(),
                error = %e,
                "Failed to publish event"
            );
        }
    }
}
