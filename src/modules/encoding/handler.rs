use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::modules::encoding::dto::*;
use crate::modules::encoding::service::EncodingService;
use crate::modules::encoding::webhook::SIGNATURE_HEADER;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/v1/encodings/encode",
    request_body = CreateEncodingRequest,
    responses(
        (status = 201, description = "Encoding started", body = ApiResponse<EncodingJobResponse>),
        (status = 400, description = "Bad Request"),
        (status = 502, description = "Provider rejected the encoding")
    ),
    tag = "Encodings"
)]
pub async fn encode(
    State(state): State<AppState>,
    Json(req): Json<CreateEncodingRequest>,
) -> impl IntoResponse {
    match EncodingService::encode(&state, req).await {
        Ok(job) => ApiSuccess::created(EncodingJobResponse::from(job), "Encoding started").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/encodings/queues/encoding",
    request_body = CreateEncodingRequest,
    responses(
        (status = 202, description = "Encoding queued", body = ApiResponse<EncodingJobResponse>),
        (status = 400, description = "Bad Request"),
        (status = 503, description = "Queue unavailable")
    ),
    tag = "Encodings"
)]
pub async fn queue_encoding(
    State(state): State<AppState>,
    Json(req): Json<CreateEncodingRequest>,
) -> impl IntoResponse {
    match EncodingService::submit(&state, req).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(EncodingJobResponse::from(job), "Encoding queued"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/encodings/{id}",
    params(
        ("id" = Uuid, Path, description = "Encoding ID")
    ),
    responses(
        (status = 200, description = "Get Encoding", body = ApiResponse<EncodingJobResponse>),
        (status = 404, description = "Encoding Not Found")
    ),
    tag = "Encodings"
)]
pub async fn get_encoding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match EncodingService::find_by_id(&state, id).await {
        Ok(job) => ApiSuccess::ok(EncodingJobResponse::from(job), "Encoding retrieved successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/encodings/users/{user_id}",
    params(
        ("user_id" = String, Path, description = "Owner of the encodings"),
        ListEncodingsQuery
    ),
    responses(
        (status = 200, description = "Page of encodings", body = ApiResponse<EncodingPageResponse>)
    ),
    tag = "Encodings"
)]
pub async fn list_user_encodings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListEncodingsQuery>,
) -> impl IntoResponse {
    match EncodingService::find_by_user(&state, &user_id, query).await {
        Ok(page) => ApiSuccess::ok(EncodingPageResponse::from(page), "Encodings retrieved successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/encodings",
    request_body = SaveEncodingRequest,
    responses(
        (status = 201, description = "Encoding saved", body = ApiResponse<EncodingJobResponse>),
        (status = 400, description = "Bad Request"),
        (status = 409, description = "Foreign id already recorded")
    ),
    tag = "Encodings"
)]
pub async fn save_encoding(
    State(state): State<AppState>,
    Json(req): Json<SaveEncodingRequest>,
) -> impl IntoResponse {
    match EncodingService::save(&state, req).await {
        Ok(job) => ApiSuccess::created(EncodingJobResponse::from(job), "Encoding saved successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// The body is taken as raw bytes: the signature covers exactly what was sent.
#[utoipa::path(
    post,
    path = "/api/v1/encodings/update-webhook",
    request_body = WebhookPayload,
    params(
        ("bitmovin-signature" = String, Header, description = "Hex HMAC-SHA512 of the raw body")
    ),
    responses(
        (status = 200, description = "Webhook processed", body = ApiResponse<WebhookAck>),
        (status = 403, description = "Invalid signature"),
        (status = 404, description = "No encoding with this foreign id")
    ),
    tag = "Encodings"
)]
pub async fn update_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match EncodingService::handle_webhook(&state, &body, signature).await {
        Ok(outcome) => {
            let ack = WebhookAck {
                event_type: outcome.event_type,
                applied: outcome.applied,
                job: outcome.job.map(EncodingJobResponse::from),
            };
            ApiSuccess::ok(ack, "Webhook processed").into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
