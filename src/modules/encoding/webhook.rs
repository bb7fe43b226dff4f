use super::dto::WebhookPayload;
use super::model::{EncodingChanges, EncodingFilter, EncodingJob, JobStatus};
use super::repository::EncodingRepository;
use crate::common::error::{EncodingError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use tracing::{debug, info, warn};

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "bitmovin-signature";

pub const ENCODING_FINISHED: &str = "ENCODING_FINISHED";
pub const ENCODING_ERROR: &str = "ENCODING_ERROR";

/// Outcome of a verified callback.
#[derive(Debug)]
pub struct Reconciled {
    pub event_type: String,
    /// The matched job now reports the status the event carries.
    pub applied: bool,
    pub job: Option<EncodingJob>,
}

/// HMAC-SHA512 over the exact bytes received, hex encoded in the header.
/// Comparison is constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    if signature.is_empty() {
        return false;
    }

    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);

    match hex::decode(signature) {
        Ok(expected) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

pub fn target_status(event_type: &str) -> Option<JobStatus> {
    match event_type {
        ENCODING_FINISHED => Some(JobStatus::Finished),
        ENCODING_ERROR => Some(JobStatus::Error),
        _ => None,
    }
}

/// Verifies the raw body before anything is parsed; a mismatch never
/// touches the store.
pub async fn handle(
    repo: &dyn EncodingRepository,
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<Reconciled> {
    if !verify_signature(secret, body, signature.unwrap_or_default()) {
        warn!(
            has_signature = signature.is_some(),
            body_len = body.len(),
            "Webhook signature verification failed, possible forgery"
        );
        return Err(EncodingError::Authentication("Invalid webhook signature".to_string()));
    }

    let payload: WebhookPayload = serde_json::from_slice(body)
        .map_err(|e| EncodingError::Validation(format!("Malformed webhook payload: {}", e)))?;

    reconcile(repo, payload).await
}

/// Set-if-not-terminal: replays and late deliveries leave the job as is.
pub async fn reconcile(repo: &dyn EncodingRepository, payload: WebhookPayload) -> Result<Reconciled> {
    let Some(status) = target_status(&payload.event_type) else {
        debug!(event_type = %payload.event_type, foreign_id = %payload.resource_id, "Ignoring webhook event");
        return Ok(Reconciled {
            event_type: payload.event_type,
            applied: false,
            job: None,
        });
    };

    let job = repo
        .update_by_filter(
            &EncodingFilter::by_foreign_id(payload.resource_id.as_str()),
            EncodingChanges::status(status),
        )
        .await?;

    let remote = payload.encoding_status.as_ref();
    info!(
        job_id = %job.id,
        foreign_id = %payload.resource_id,
        event_type = %payload.event_type,
        webhook_id = payload.webhook_id.as_deref().unwrap_or("-"),
        remote_kind = remote.and_then(|r| r.kind.as_deref()).unwrap_or("-"),
        remote_status = remote.and_then(|r| r.status.as_deref()).unwrap_or("-"),
        progress = remote.and_then(|r| r.progress),
        status = %job.status,
        "Webhook reconciled"
    );

    Ok(Reconciled {
        event_type: payload.event_type,
        applied: job.status == status,
        job: Some(job),
    })
}

#[cfg(test)]
pub mod testing {
    use super::*;

    pub fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sign;
    use super::*;
    use crate::modules::encoding::model::NewEncodingJob;
    use crate::modules::encoding::repository::MemoryEncodingRepository;

    const SECRET: &str = "webhook-secret";

    async fn started_job(repo: &MemoryEncodingRepository, foreign_id: &str) -> EncodingJob {
        let job = repo
            .save(NewEncodingJob {
                user_id: "u1".into(),
                description: "a.mp4".into(),
                status: JobStatus::Submitted,
                foreign_id: None,
                third_party_encoder: "bitMovin".into(),
            })
            .await
            .unwrap();
        repo.update_by_id(
            job.id,
            EncodingChanges {
                status: Some(JobStatus::Started),
                foreign_id: Some(foreign_id.into()),
                ..EncodingChanges::default()
            },
            false,
        )
        .await
        .unwrap()
    }

    fn event(foreign_id: &str, event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "resourceId": foreign_id,
            "eventType": event_type,
            "encodingStatus": { "type": "ENCODING", "progress": 100, "status": "FINISHED" }
        }))
        .unwrap()
    }

    #[test]
    fn accepts_valid_signature() {
        let body = b"{\"resourceId\":\"r1\"}";
        assert!(verify_signature(SECRET, body, &sign(SECRET, body)));
        assert!(verify_signature(SECRET, body, &format!(" {} ", sign(SECRET, body))));
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let body = b"payload";
        assert!(!verify_signature(SECRET, body, &sign("other", body)));
        assert!(!verify_signature(SECRET, body, "not-hex"));
        assert!(!verify_signature(SECRET, body, ""));
    }

    #[test]
    fn any_flipped_byte_breaks_signature() {
        let body = event("remote-1", ENCODING_FINISHED);
        let signature = sign(SECRET, &body);
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(!verify_signature(SECRET, &tampered, &signature), "byte {} flipped", i);
        }
    }

    #[tokio::test]
    async fn tampered_body_does_not_mutate_job() {
        let repo = MemoryEncodingRepository::new();
        let job = started_job(&repo, "remote-1").await;

        let body = event("remote-1", ENCODING_FINISHED);
        let signature = sign(SECRET, &body);
        let mut tampered = body.clone();
        let last = tampered.len() - 2;
        tampered[last] ^= 0x20;

        let err = handle(&repo, SECRET, &tampered, Some(&signature)).await.unwrap_err();
        assert!(matches!(err, EncodingError::Authentication(_)));
        assert_eq!(repo.find_by_id(job.id).await.unwrap(), job);

        let err = handle(&repo, SECRET, &body, None).await.unwrap_err();
        assert!(matches!(err, EncodingError::Authentication(_)));
        assert_eq!(repo.find_by_id(job.id).await.unwrap().status, JobStatus::Started);
    }

    #[tokio::test]
    async fn finished_event_is_idempotent() {
        let repo = MemoryEncodingRepository::new();
        let job = started_job(&repo, "remote-1").await;
        let body = event("remote-1", ENCODING_FINISHED);
        let signature = sign(SECRET, &body);

        let first = handle(&repo, SECRET, &body, Some(&signature)).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.job.unwrap().status, JobStatus::Finished);

        let second = handle(&repo, SECRET, &body, Some(&signature)).await.unwrap();
        let after = second.job.unwrap();
        assert_eq!(after.id, job.id);
        assert_eq!(after.status, JobStatus::Finished);
        assert_eq!(after.foreign_id.as_deref(), Some("remote-1"));
    }

    #[tokio::test]
    async fn error_after_finished_is_ignored() {
        let repo = MemoryEncodingRepository::new();
        let job = started_job(&repo, "remote-1").await;

        let finished = event("remote-1", ENCODING_FINISHED);
        handle(&repo, SECRET, &finished, Some(&sign(SECRET, &finished))).await.unwrap();

        let error = event("remote-1", ENCODING_ERROR);
        let late = handle(&repo, SECRET, &error, Some(&sign(SECRET, &error))).await.unwrap();
        assert!(!late.applied);
        assert_eq!(repo.find_by_id(job.id).await.unwrap().status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn error_event_marks_job_failed() {
        let repo = MemoryEncodingRepository::new();
        let job = started_job(&repo, "remote-2").await;
        let body = event("remote-2", ENCODING_ERROR);

        handle(&repo, SECRET, &body, Some(&sign(SECRET, &body))).await.unwrap();
        assert_eq!(repo.find_by_id(job.id).await.unwrap().status, JobStatus::Error);
    }

    #[tokio::test]
    async fn unknown_foreign_id_is_not_found() {
        let repo = MemoryEncodingRepository::new();
        started_job(&repo, "remote-1").await;
        let body = event("remote-404", ENCODING_FINISHED);

        let err = handle(&repo, SECRET, &body, Some(&sign(SECRET, &body))).await.unwrap_err();
        assert!(matches!(err, EncodingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn other_events_are_acknowledged_without_change() {
        let repo = MemoryEncodingRepository::new();
        let job = started_job(&repo, "remote-1").await;
        let body = event("remote-1", "ENCODING_TRANSFER_FINISHED");

        let outcome = handle(&repo, SECRET, &body, Some(&sign(SECRET, &body))).await.unwrap();
        assert!(!outcome.applied);
        assert!(outcome.job.is_none());
        assert_eq!(repo.find_by_id(job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn signed_but_malformed_payload_is_rejected() {
        let repo = MemoryEncodingRepository::new();
        let body = b"not json";
        let err = handle(&repo, SECRET, body, Some(&sign(SECRET, body))).await.unwrap_err();
        assert!(matches!(err, EncodingError::Validation(_)));
    }

    #[tokio::test]
    async fn provider_status_details_are_read_from_payload() {
        let body = serde_json::json!({
            "resourceId": "remote-7",
            "eventType": "ENCODING_FINISHED",
            "webhookId": "hook-1",
            "encodingStatus": { "type": "ENCODING", "progress": 100, "status": "FINISHED" }
        });
        let payload: WebhookPayload = serde_json::from_value(body).unwrap();
        assert_eq!(payload.webhook_id.as_deref(), Some("hook-1"));
        let remote = payload.encoding_status.as_ref().unwrap();
        assert_eq!(remote.kind.as_deref(), Some("ENCODING"));
        assert_eq!(remote.progress, Some(100.0));
        assert_eq!(remote.status.as_deref(), Some("FINISHED"));

        let repo = MemoryEncodingRepository::new();
        started_job(&repo, "remote-7").await;
        let outcome = reconcile(&repo, payload).await.unwrap();
        assert!(outcome.applied);
    }
}
