use super::builder::{BuildSettings, GraphBuilder};
use super::dto::{CreateEncodingRequest, EncodeRequest, ListEncodingsQuery, SaveEncodingRequest};
use super::events::EncodeTask;
use super::model::{EncodingChanges, EncodingFilter, EncodingJob, EncodingPage, JobStatus, NewEncodingJob};
use super::normalizer;
use super::repository::DEFAULT_PAGE_SIZE;
use super::webhook::{self, Reconciled};
use crate::common::error::{EncodingError, Result};
use crate::state::AppState;
use tracing::{error, info};
use uuid::Uuid;

pub const MAX_PAGE_SIZE: i64 = 100;

pub struct EncodingService;

impl EncodingService {
    pub fn normalize(state: &AppState, raw: CreateEncodingRequest) -> Result<EncodeRequest> {
        normalizer::normalize(raw, &state.config.storage)
    }

    async fn create_job(state: &AppState, request: &EncodeRequest) -> Result<EncodingJob> {
        state
            .repo
            .save(NewEncodingJob {
                user_id: request.user_id.clone(),
                description: request.output_file_name.clone(),
                status: JobStatus::Submitted,
                foreign_id: None,
                third_party_encoder: state.provider.name().to_string(),
            })
            .await
    }

    /// Builds inline and returns the `STARTED` job. Slow: one remote call per
    /// graph node.
    pub async fn encode(state: &AppState, raw: CreateEncodingRequest) -> Result<EncodingJob> {
        let request = Self::normalize(state, raw)?;
        let job = Self::create_job(state, &request).await?;
        info!(job_id = %job.id, file = %request.file_name, "Encoding synchronously");

        Self::run_build(state, job.id, &request).await
    }

    /// Persists a `SUBMITTED` job and hands the build to a queue consumer.
    pub async fn submit(state: &AppState, raw: CreateEncodingRequest) -> Result<EncodingJob> {
        let request = Self::normalize(state, raw)?;
        let job = Self::create_job(state, &request).await?;

        let task = EncodeTask { job_id: job.id, request };
        let payload = serde_json::to_vec(&task).map_err(|e| EncodingError::Internal(e.to_string()))?;

        state
            .queue
            .publish(&state.config.encoding_queue, &payload)
            .await
            .map_err(|e| {
                error!(job_id = %job.id, error = %e, "Failed to enqueue encoding task");
                EncodingError::Queue(e.to_string())
            })?;

        info!(job_id = %job.id, queue = %state.config.encoding_queue, "Encoding task enqueued");
        Ok(job)
    }

    /// Builds the remote graph for an already persisted job, then records the
    /// remote id and `STARTED`. On failure the job is left untouched.
    pub async fn run_build(state: &AppState, job_id: Uuid, request: &EncodeRequest) -> Result<EncodingJob> {
        let builder = GraphBuilder::new(state.provider.as_ref(), BuildSettings::from(&state.config));

        let built = builder.build(request).await.map_err(|e| {
            error!(
                job_id = %job_id,
                step = ?e.step(),
                error = %e,
                "Encoding build failed; job left SUBMITTED"
            );
            EncodingError::from(e)
        })?;

        let changes = EncodingChanges {
            user_id: Some(request.user_id.clone()),
            description: Some(request.output_file_name.clone()),
            status: Some(JobStatus::Started),
            foreign_id: Some(built.foreign_id.clone()),
            third_party_encoder: Some(state.provider.name().to_string()),
        };
        let job = state.repo.update_by_id(job_id, changes, true).await?;

        info!(
            job_id = %job.id,
            foreign_id = %built.foreign_id,
            muxings = ?built.muxing_ids,
            dash_manifest = %built.dash_manifest_id,
            hls_manifest = %built.hls_manifest_id,
            "Encoding started"
        );
        Ok(job)
    }

    /// Direct persistence; no remote call is made.
    pub async fn save(state: &AppState, req: SaveEncodingRequest) -> Result<EncodingJob> {
        if req.user_id.trim().is_empty() {
            return Err(EncodingError::Validation("userId is required".to_string()));
        }

        state
            .repo
            .save(NewEncodingJob {
                user_id: req.user_id,
                description: req.description.unwrap_or_default(),
                status: req.status,
                foreign_id: req.foreign_id.filter(|id| !id.is_empty()),
                third_party_encoder: req
                    .third_party_encoder
                    .unwrap_or_else(|| state.provider.name().to_string()),
            })
            .await
    }

    pub async fn find_by_id(state: &AppState, id: Uuid) -> Result<EncodingJob> {
        state.repo.find_by_id(id).await
    }

    pub async fn find_by_user(state: &AppState, user_id: &str, query: ListEncodingsQuery) -> Result<EncodingPage> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        state
            .repo
            .find(&EncodingFilter::by_user(user_id), query.cursor, limit)
            .await
    }

    pub async fn handle_webhook(state: &AppState, body: &[u8], signature: Option<&str>) -> Result<Reconciled> {
        webhook::handle(state.repo.as_ref(), &state.config.webhook.secret, body, signature).await
    }
}
