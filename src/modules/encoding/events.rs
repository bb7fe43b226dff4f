use super::dto::EncodeRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue payload: a persisted `SUBMITTED` job plus the normalized request
/// the worker builds from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeTask {
    pub job_id: Uuid,
    pub request: EncodeRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case_field_names() {
        let task = EncodeTask {
            job_id: Uuid::nil(),
            request: EncodeRequest {
                file_name: "a.mp4".into(),
                input_bucket: "in".into(),
                output_bucket: "out".into(),
                output_file_name: "a.mp4".into(),
                encode_video: true,
                video_options: vec![],
                encode_audio: false,
                audio_options: vec![],
                generate_thumbnail_track: false,
                drm: false,
                user_id: "u1".into(),
            },
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["jobId"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["request"]["fileName"], "a.mp4");
        assert_eq!(json["request"]["encodeVideo"], true);
    }
}
