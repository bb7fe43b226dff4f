use crate::infrastructure::queue::rabbitmq::{declare_queue, RabbitMqService};
use crate::modules::encoding::events::EncodeTask;
use crate::modules::encoding::model::JobStatus;
use crate::modules::encoding::service::EncodingService;
use crate::state::AppState;
use anyhow::anyhow;
use async_channel::Receiver;
use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What the consumer should tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Started,
    /// Redelivery of a job that already got past `SUBMITTED`.
    Skipped,
    /// Undecodable payload; acked so it is not redelivered forever.
    Poison,
    /// Build or persistence failed; goes to the dead-letter queue.
    Failed,
}

/// Never panics and never returns an error: every failure is logged and
/// folded into an [`Outcome`].
pub async fn process_payload(state: &AppState, payload: &[u8]) -> Outcome {
    let task: EncodeTask = match serde_json::from_slice(payload) {
        Ok(task) => task,
        Err(e) => {
            error!(error = %e, bytes = payload.len(), "Failed to parse encoding task");
            return Outcome::Poison;
        }
    };

    match state.repo.find_by_id(task.job_id).await {
        Ok(job) if job.status != JobStatus::Submitted => {
            info!(job_id = %job.id, status = %job.status, "Encoding task already handled, skipping");
            return Outcome::Skipped;
        }
        Ok(_) => {}
        Err(e) => {
            error!(job_id = %task.job_id, error = %e, "Failed to load job for encoding task");
            return Outcome::Failed;
        }
    }

    info!(job_id = %task.job_id, file = %task.request.file_name, "Processing encoding task");
    match EncodingService::run_build(state, task.job_id, &task.request).await {
        Ok(_) => Outcome::Started,
        // run_build has already logged the step and cause
        Err(_) => Outcome::Failed,
    }
}

pub async fn start_rabbitmq_worker(state: AppState, rabbit: RabbitMqService, worker: usize, shutdown: CancellationToken) {
    info!(worker, "Starting encoder worker (RabbitMQ)");

    loop {
        match consume(&state, &rabbit, worker, &shutdown).await {
            Ok(()) => break,
            Err(e) => {
                error!(worker, error = %e, "Encoder worker lost its consumer, retrying");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    info!(worker, "Encoder worker stopped");
}

async fn consume(
    state: &AppState,
    rabbit: &RabbitMqService,
    worker: usize,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let queue = state.config.encoding_queue.as_str();
    let channel = rabbit.create_channel().await?;
    declare_queue(&channel, queue).await?;

    // One unacked job per consumer.
    channel.basic_qos(1, BasicQosOptions::default()).await?;

    let mut consumer = channel
        .basic_consume(
            queue,
            &format!("encoder_worker_{}", worker),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(worker, queue, "Encoder worker listening");

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            next = consumer.next() => next,
        };
        let delivery = next.ok_or_else(|| anyhow!("consumer stream closed"))??;

        if delivery.redelivered {
            warn!(worker, "Received redelivered encoding task");
        }

        let result = match process_payload(state, &delivery.data).await {
            Outcome::Failed => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..BasicNackOptions::default()
                    })
                    .await
            }
            _ => delivery.ack(BasicAckOptions::default()).await,
        };

        if let Err(e) = result {
            error!(worker, error = %e, "Failed to settle delivery");
        }
    }
}

/// Consumer for the in-process queue. There is no redelivery: a failed task
/// stays `SUBMITTED` and is only logged.
pub async fn start_memory_worker(state: AppState, receiver: Receiver<Vec<u8>>, worker: usize, shutdown: CancellationToken) {
    info!(worker, "Starting encoder worker (in-memory)");

    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => break,
            payload = receiver.recv() => payload,
        };
        match payload {
            Ok(payload) => {
                let outcome = process_payload(&state, &payload).await;
                if outcome == Outcome::Failed {
                    warn!(worker, "Encoding task failed and will not be retried");
                }
            }
            Err(_) => break,
        }
    }

    info!(worker, "Encoder worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queue::TaskQueue;
    use crate::modules::encoding::dto::CreateEncodingRequest;
    use crate::modules::encoding::provider::testing::FakeProvider;
    use crate::modules::encoding::provider::ResourceKind;
    use crate::modules::encoding::repository::EncodingRepository;
    use crate::state::testing::{harness, harness_with};

    fn request() -> CreateEncodingRequest {
        CreateEncodingRequest {
            file_name: Some("a.mp4".into()),
            user_id: Some("u1".into()),
            encode_video: true,
            encode_audio: true,
            ..CreateEncodingRequest::default()
        }
    }

    #[tokio::test]
    async fn garbage_payload_is_poison() {
        let h = harness();
        assert_eq!(process_payload(&h.state, b"{not json").await, Outcome::Poison);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn redelivered_task_is_skipped() {
        let h = harness();
        let receiver = h.queue.subscribe(&h.state.config.encoding_queue).await;
        let job = EncodingService::submit(&h.state, request()).await.unwrap();
        let payload = receiver.recv().await.unwrap();

        assert_eq!(process_payload(&h.state, &payload).await, Outcome::Started);
        let calls = h.provider.calls().len();

        assert_eq!(process_payload(&h.state, &payload).await, Outcome::Skipped);
        assert_eq!(h.provider.calls().len(), calls);
        assert_eq!(h.repo.find_by_id(job.id).await.unwrap().status, JobStatus::Started);
    }

    #[tokio::test]
    async fn failed_build_is_reported_and_job_stays_submitted() {
        let h = harness_with(FakeProvider::failing_on(ResourceKind::Start));
        let receiver = h.queue.subscribe(&h.state.config.encoding_queue).await;
        let job = EncodingService::submit(&h.state, request()).await.unwrap();
        let payload = receiver.recv().await.unwrap();

        assert_eq!(process_payload(&h.state, &payload).await, Outcome::Failed);
        let stored = h.repo.find_by_id(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Submitted);
        assert!(stored.foreign_id.is_none());
    }

    #[tokio::test]
    async fn task_for_missing_job_fails() {
        let h = harness();
        let task = EncodeTask {
            job_id: uuid::Uuid::now_v7(),
            request: EncodingService::normalize(&h.state, request()).unwrap(),
        };
        let payload = serde_json::to_vec(&task).unwrap();
        assert_eq!(process_payload(&h.state, &payload).await, Outcome::Failed);
    }

    #[tokio::test]
    async fn memory_worker_survives_bad_tasks_and_builds_good_ones() {
        let h = harness();
        let queue_name = h.state.config.encoding_queue.clone();
        let receiver = h.queue.subscribe(&queue_name).await;
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(start_memory_worker(h.state.clone(), receiver, 0, shutdown.clone()));

        h.queue.publish(&queue_name, b"garbage").await.unwrap();
        let job = EncodingService::submit(&h.state, request()).await.unwrap();

        let mut status = JobStatus::Submitted;
        for _ in 0..200 {
            status = h.repo.find_by_id(job.id).await.unwrap().status;
            if status == JobStatus::Started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Started);

        shutdown.cancel();
        worker.await.unwrap();
    }
}
