use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::model::{EncodingJob, EncodingPage, JobStatus};

// --- ENCODE REQUEST DTOs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct VideoRendition {
    #[validate(range(min = 1, message = "width must be positive"))]
    pub width: u32,
    #[validate(range(min = 1, message = "height must be positive"))]
    pub height: u32,
    #[validate(range(min = 1, max = 1_000_000_000, message = "bitrate must be between 1 and 1000000000"))]
    pub bitrate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct AudioRendition {
    #[validate(range(min = 1, max = 1_000_000_000, message = "bitrate must be between 1 and 1000000000"))]
    pub bitrate: u64,
}

/// Source-file probe results, as reported by whoever uploaded the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub has_audio: bool,
    pub video_stream: Option<VideoStreamInfo>,
    pub audio_stream: Option<AudioStreamInfo>,
    pub file_name: Option<String>,
    pub size: Option<u64>,
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamInfo {
    pub bit_rate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(rename = "duration_s")]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamInfo {
    pub bit_rate: Option<u64>,
    #[serde(rename = "duration_s")]
    pub duration_secs: Option<f64>,
}

/// Encode request as received from clients; see `normalizer` for defaults.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEncodingRequest {
    #[validate(length(min = 1, message = "fileName must not be empty"))]
    pub file_name: Option<String>,
    pub file_info: Option<FileInfo>,
    #[validate(length(min = 1, message = "outputFileName must not be empty"))]
    pub output_file_name: Option<String>,
    pub input_bucket: Option<String>,
    pub output_bucket: Option<String>,
    #[serde(default)]
    pub encode_video: bool,
    #[validate(nested)]
    pub video_options: Option<Vec<VideoRendition>>,
    #[serde(default)]
    pub encode_audio: bool,
    #[validate(nested)]
    pub audio_options: Option<Vec<AudioRendition>>,
    #[serde(default)]
    pub generate_thumbnail_track: bool,
    #[serde(default)]
    pub drm: bool,
    #[validate(length(min = 1, message = "userId must not be empty"))]
    pub user_id: Option<String>,
}

/// Fully populated request. Rendition lists always hold at least one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    pub file_name: String,
    pub input_bucket: String,
    pub output_bucket: String,
    pub output_file_name: String,
    pub encode_video: bool,
    pub video_options: Vec<VideoRendition>,
    pub encode_audio: bool,
    pub audio_options: Vec<AudioRendition>,
    pub generate_thumbnail_track: bool,
    pub drm: bool,
    pub user_id: String,
}

// --- JOB DTOs ---

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveEncodingRequest {
    pub description: Option<String>,
    pub status: JobStatus,
    pub foreign_id: Option<String>,
    pub third_party_encoder: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncodingJobResponse {
    pub id: Uuid,
    pub user_id: String,
    pub description: String,
    pub status: JobStatus,
    pub foreign_id: Option<String>,
    pub third_party_encoder: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<EncodingJob> for EncodingJobResponse {
    fn from(job: EncodingJob) -> Self {
        Self {
            id: job.id,
            user_id: job.user_id,
            description: job.description,
            status: job.status,
            foreign_id: job.foreign_id,
            third_party_encoder: job.third_party_encoder,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncodingPageResponse {
    pub results: Vec<EncodingJobResponse>,
    pub prev_cursor: Option<Uuid>,
    pub curr_cursor: Option<Uuid>,
}

impl From<EncodingPage> for EncodingPageResponse {
    fn from(page: EncodingPage) -> Self {
        Self {
            results: page.results.into_iter().map(EncodingJobResponse::from).collect(),
            prev_cursor: page.prev_cursor,
            curr_cursor: page.curr_cursor,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListEncodingsQuery {
    /// Identity of the last job seen; results start strictly after it.
    pub cursor: Option<Uuid>,
    pub limit: Option<i64>,
}

// --- WEBHOOK DTOs ---

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Provider-side encoding id, stored locally as `foreignId`.
    pub resource_id: String,
    pub event_type: String,
    pub encoding_status: Option<WebhookEncodingStatus>,
    pub webhook_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookEncodingStatus {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub progress: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub event_type: String,
    pub applied: bool,
    pub job: Option<EncodingJobResponse>,
}
