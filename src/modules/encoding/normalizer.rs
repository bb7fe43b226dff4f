use super::dto::{AudioRendition, AudioStreamInfo, CreateEncodingRequest, EncodeRequest, VideoRendition, VideoStreamInfo};
use crate::common::error::{EncodingError, Result};
use crate::config::settings::StorageSettings;
use validator::Validate;

pub const DEFAULT_VIDEO_WIDTH: u32 = 1280;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 720;
pub const DEFAULT_VIDEO_BITRATE: u64 = 3_000_000;
pub const DEFAULT_AUDIO_BITRATE: u64 = 192_000;
/// Upper bound for any rendition bitrate, requested or probed.
pub const MAX_BITRATE: u64 = 1_000_000_000;

/// Fills every optional field of a client request. Pure: the only failure
/// is a missing source file name or owner.
pub fn normalize(raw: CreateEncodingRequest, storage: &StorageSettings) -> Result<EncodeRequest> {
    raw.validate()?;

    let probe = raw.file_info.as_ref();
    let file_name = non_empty(raw.file_name)
        .or_else(|| probe.and_then(|info| non_empty(info.file_name.clone())))
        .ok_or_else(|| EncodingError::Validation("fileName is required".to_string()))?;
    let user_id = non_empty(raw.user_id)
        .ok_or_else(|| EncodingError::Validation("userId is required".to_string()))?;

    let video_options = video_renditions(raw.video_options, probe.and_then(|i| i.video_stream.as_ref()));
    let audio_options = audio_renditions(raw.audio_options, probe.and_then(|i| i.audio_stream.as_ref()));

    Ok(EncodeRequest {
        output_file_name: non_empty(raw.output_file_name).unwrap_or_else(|| file_name.clone()),
        input_bucket: non_empty(raw.input_bucket).unwrap_or_else(|| storage.default_input_bucket.clone()),
        output_bucket: non_empty(raw.output_bucket).unwrap_or_else(|| storage.default_output_bucket.clone()),
        file_name,
        encode_video: raw.encode_video,
        video_options,
        encode_audio: raw.encode_audio,
        audio_options,
        generate_thumbnail_track: raw.generate_thumbnail_track,
        drm: raw.drm,
        user_id,
    })
}

pub fn video_renditions(requested: Option<Vec<VideoRendition>>, probe: Option<&VideoStreamInfo>) -> Vec<VideoRendition> {
    match requested {
        Some(options) if !options.is_empty() => options,
        _ => vec![VideoRendition {
            width: positive(probe.and_then(|p| p.width)).unwrap_or(DEFAULT_VIDEO_WIDTH),
            height: positive(probe.and_then(|p| p.height)).unwrap_or(DEFAULT_VIDEO_HEIGHT),
            bitrate: probed_bitrate(probe.and_then(|p| p.bit_rate)).unwrap_or(DEFAULT_VIDEO_BITRATE),
        }],
    }
}

pub fn audio_renditions(requested: Option<Vec<AudioRendition>>, probe: Option<&AudioStreamInfo>) -> Vec<AudioRendition> {
    match requested {
        Some(options) if !options.is_empty() => options,
        _ => vec![AudioRendition {
            bitrate: probed_bitrate(probe.and_then(|p| p.bit_rate)).unwrap_or(DEFAULT_AUDIO_BITRATE),
        }],
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// Probes report 0 for unknown values.
fn positive<T: Default + PartialOrd>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v > T::default())
}

fn probed_bitrate(value: Option<u64>) -> Option<u64> {
    positive(value).filter(|v| *v <= MAX_BITRATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::AppConfig;
    use crate::modules::encoding::dto::FileInfo;

    fn storage() -> StorageSettings {
        AppConfig::for_tests().storage
    }

    fn request(file_name: &str, user_id: &str) -> CreateEncodingRequest {
        CreateEncodingRequest {
            file_name: Some(file_name.to_string()),
            user_id: Some(user_id.to_string()),
            ..CreateEncodingRequest::default()
        }
    }

    #[test]
    fn synthesizes_default_renditions_without_probe() {
        let raw = CreateEncodingRequest {
            encode_video: true,
            ..request("a.mp4", "u1")
        };
        let normalized = normalize(raw, &storage()).unwrap();

        assert_eq!(
            normalized.video_options,
            vec![VideoRendition { width: 1280, height: 720, bitrate: 3_000_000 }]
        );
        assert_eq!(normalized.audio_options, vec![AudioRendition { bitrate: 192_000 }]);
        assert!(normalized.encode_video);
        assert!(!normalized.encode_audio);
    }

    #[test]
    fn uses_probed_metadata_when_present() {
        let raw = CreateEncodingRequest {
            file_info: Some(FileInfo {
                video_stream: Some(VideoStreamInfo {
                    bit_rate: Some(5_000_000),
                    width: Some(1920),
                    height: Some(1080),
                    duration_secs: Some(12.0),
                }),
                audio_stream: Some(AudioStreamInfo {
                    bit_rate: Some(128_000),
                    duration_secs: Some(12.0),
                }),
                ..FileInfo::default()
            }),
            ..request("a.mp4", "u1")
        };
        let normalized = normalize(raw, &storage()).unwrap();

        assert_eq!(
            normalized.video_options,
            vec![VideoRendition { width: 1920, height: 1080, bitrate: 5_000_000 }]
        );
        assert_eq!(normalized.audio_options, vec![AudioRendition { bitrate: 128_000 }]);
    }

    #[test]
    fn probed_fields_fall_back_independently() {
        let probe = VideoStreamInfo {
            bit_rate: Some(0),
            width: Some(640),
            height: None,
            duration_secs: None,
        };
        assert_eq!(
            video_renditions(None, Some(&probe)),
            vec![VideoRendition { width: 640, height: 720, bitrate: 3_000_000 }]
        );
    }

    #[test]
    fn explicit_renditions_are_kept() {
        let options = vec![
            VideoRendition { width: 640, height: 360, bitrate: 800_000 },
            VideoRendition { width: 1920, height: 1080, bitrate: 6_000_000 },
        ];
        assert_eq!(video_renditions(Some(options.clone()), None), options);
        assert_eq!(video_renditions(Some(vec![]), None).len(), 1);
        assert_eq!(audio_renditions(Some(vec![]), None), vec![AudioRendition { bitrate: 192_000 }]);
    }

    #[test]
    fn fills_output_name_and_buckets() {
        let normalized = normalize(request("movie.mov", "u1"), &storage()).unwrap();
        assert_eq!(normalized.output_file_name, "movie.mov");
        assert_eq!(normalized.input_bucket, "input-bucket");
        assert_eq!(normalized.output_bucket, "output-bucket");

        let raw = CreateEncodingRequest {
            output_file_name: Some("out.mp4".into()),
            input_bucket: Some("in".into()),
            output_bucket: Some("out".into()),
            ..request("movie.mov", "u1")
        };
        let normalized = normalize(raw, &storage()).unwrap();
        assert_eq!(normalized.output_file_name, "out.mp4");
        assert_eq!(normalized.input_bucket, "in");
        assert_eq!(normalized.output_bucket, "out");
    }

    #[test]
    fn file_name_falls_back_to_probe() {
        let raw = CreateEncodingRequest {
            file_info: Some(FileInfo {
                file_name: Some("probed.mkv".into()),
                ..FileInfo::default()
            }),
            user_id: Some("u1".into()),
            ..CreateEncodingRequest::default()
        };
        assert_eq!(normalize(raw, &storage()).unwrap().file_name, "probed.mkv");
    }

    #[test]
    fn missing_file_name_or_user_fails_fast() {
        let no_file = CreateEncodingRequest {
            user_id: Some("u1".into()),
            ..CreateEncodingRequest::default()
        };
        assert!(matches!(normalize(no_file, &storage()), Err(EncodingError::Validation(_))));

        let no_user = CreateEncodingRequest {
            file_name: Some("a.mp4".into()),
            ..CreateEncodingRequest::default()
        };
        assert!(matches!(normalize(no_user, &storage()), Err(EncodingError::Validation(_))));
    }

    #[test]
    fn rejects_non_positive_rendition_values() {
        let raw = CreateEncodingRequest {
            video_options: Some(vec![VideoRendition { width: 0, height: 720, bitrate: 1 }]),
            ..request("a.mp4", "u1")
        };
        assert!(matches!(normalize(raw, &storage()), Err(EncodingError::Validation(_))));
    }

    #[test]
    fn rejects_bitrate_above_limit() {
        let raw = CreateEncodingRequest {
            audio_options: Some(vec![AudioRendition { bitrate: u64::MAX }]),
            ..request("a.mp4", "u1")
        };
        assert!(matches!(normalize(raw, &storage()), Err(EncodingError::Validation(_))));

        let raw = CreateEncodingRequest {
            video_options: Some(vec![VideoRendition { width: 1280, height: 720, bitrate: MAX_BITRATE + 1 }]),
            ..request("a.mp4", "u1")
        };
        assert!(matches!(normalize(raw, &storage()), Err(EncodingError::Validation(_))));

        let raw = CreateEncodingRequest {
            audio_options: Some(vec![AudioRendition { bitrate: MAX_BITRATE }]),
            ..request("a.mp4", "u1")
        };
        assert!(normalize(raw, &storage()).is_ok());
    }
}
