use crate::modules::encoding::dto::*;
use crate::modules::encoding::model::JobStatus;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::encoding::handler::encode,
        crate::modules::encoding::handler::queue_encoding,
        crate::modules::encoding::handler::get_encoding,
        crate::modules::encoding::handler::list_user_encodings,
        crate::modules::encoding::handler::save_encoding,
        crate::modules::encoding::handler::update_webhook,
    ),
    components(
        schemas(
            CreateEncodingRequest, SaveEncodingRequest, EncodingJobResponse, EncodingPageResponse,
            VideoRendition, AudioRendition, FileInfo, VideoStreamInfo, AudioStreamInfo,
            WebhookPayload, WebhookEncodingStatus, WebhookAck, JobStatus,
        )
    ),
    tags(
        (name = "Encodings", description = "Encoding job submission and tracking")
    )
)]
pub struct ApiDoc;
