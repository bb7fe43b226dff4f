//! Turns a normalized [`EncodeRequest`] into a started remote encoding.
//!
//! The remote graph is strictly layered:
//!
//! ```text
//! Encoding, Input, Output
//!   -> per rendition: CodecConfiguration -> Stream -> Fmp4Muxing [-> CencDrm]
//!   -> DASH + HLS default manifests
//!   -> Start -> webhook subscriptions (finished, error)
//! ```
//!
//! Renditions are independent of each other and are built concurrently; every
//! step inside a rendition waits for the resource it references. Nothing is
//! rolled back on failure: an encoding that was never started is inert on the
//! provider side, and the error carries its id for inspection.

use super::drm::{encrypted_path, DrmPlanner};
use super::dto::{AudioRendition, EncodeRequest, VideoRendition};
use super::provider::{
    CodecConfiguration, EncodingProvider, ManifestFormat, OutputBinding, ProviderError, Resource, ResourceRequest,
    Storage, WebhookTrigger,
};
use crate::common::error::EncodingError;
use crate::config::settings::{AppConfig, DrmSettings, StorageSettings, WebhookSettings};
use futures_util::future::try_join_all;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

pub const SEGMENT_LENGTH_SECS: f64 = 4.0;
pub const DASH_MANIFEST_NAME: &str = "stream.mpd";
pub const HLS_MANIFEST_NAME: &str = "master.m3u8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    CreateEncoding,
    CreateInput,
    CreateOutput,
    CreateCodecConfiguration,
    CreateStream,
    CreateSprite,
    CreateMuxing,
    ApplyDrm,
    CreateManifest,
    StartEncoding,
    SubscribeWebhook,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStep::CreateEncoding => "create_encoding",
            BuildStep::CreateInput => "create_input",
            BuildStep::CreateOutput => "create_output",
            BuildStep::CreateCodecConfiguration => "create_codec_configuration",
            BuildStep::CreateStream => "create_stream",
            BuildStep::CreateSprite => "create_sprite",
            BuildStep::CreateMuxing => "create_muxing",
            BuildStep::ApplyDrm => "apply_drm",
            BuildStep::CreateManifest => "create_manifest",
            BuildStep::StartEncoding => "start_encoding",
            BuildStep::SubscribeWebhook => "subscribe_webhook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{step} failed for encoding {}: {source}", encoding_id.as_deref().unwrap_or("<none>"))]
    Provider {
        step: BuildStep,
        /// Remote encoding left behind by the failed build, if one was created.
        encoding_id: Option<String>,
        #[source]
        source: ProviderError,
    },

    #[error("DRM was requested but no content keys are configured")]
    DrmNotConfigured,
}

impl BuildError {
    pub fn step(&self) -> Option<BuildStep> {
        match self {
            BuildError::Provider { step, .. } => Some(*step),
            BuildError::DrmNotConfigured => None,
        }
    }
}

impl From<BuildError> for EncodingError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::DrmNotConfigured => EncodingError::Validation(e.to_string()),
            BuildError::Provider { .. } => EncodingError::Provider(e.to_string()),
        }
    }
}

/// Result of a successful build. The provider owns the graph from here on;
/// only `foreign_id` is persisted.
#[derive(Debug, Clone)]
pub struct BuiltEncoding {
    pub foreign_id: String,
    pub muxing_ids: Vec<String>,
    pub dash_manifest_id: String,
    pub hls_manifest_id: String,
}

#[derive(Clone, Copy)]
pub struct BuildSettings<'a> {
    pub storage: &'a StorageSettings,
    pub webhook: &'a WebhookSettings,
    pub drm: Option<&'a DrmSettings>,
}

impl<'a> From<&'a AppConfig> for BuildSettings<'a> {
    fn from(config: &'a AppConfig) -> Self {
        Self {
            storage: &config.storage,
            webhook: &config.webhook,
            drm: config.drm.as_ref(),
        }
    }
}

/// Paths inside the output bucket, all rooted at the output file's stem.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    output_stem: String,
    input_stem: String,
}

impl OutputLayout {
    pub fn new(request: &EncodeRequest) -> Self {
        Self {
            output_stem: file_stem(&request.output_file_name),
            input_stem: file_stem(&request.file_name),
        }
    }

    pub fn root(&self) -> String {
        format!("{}/", self.output_stem)
    }

    pub fn segments(&self, track: Track, bitrate: u64) -> String {
        format!("{}/{}/{}/", self.output_stem, track, bitrate)
    }

    pub fn sprite_names(&self) -> (String, String) {
        (format!("{}.jpg", self.input_stem), format!("{}.vtt", self.input_stem))
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Video,
    Audio,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Track::Video => "video",
            Track::Audio => "audio",
        })
    }
}

struct RenditionPlan {
    track: Track,
    bitrate: u64,
    codec: CodecConfiguration,
    thumbnail: bool,
}

impl RenditionPlan {
    fn video(rendition: &VideoRendition, thumbnail: bool) -> Self {
        Self {
            track: Track::Video,
            bitrate: rendition.bitrate,
            codec: CodecConfiguration::H264 {
                name: format!("H.264 {}p {} Kbit/s", rendition.height, kbps(rendition.bitrate)),
                width: rendition.width,
                height: rendition.height,
                bitrate: rendition.bitrate,
            },
            thumbnail,
        }
    }

    fn audio(rendition: &AudioRendition) -> Self {
        Self {
            track: Track::Audio,
            bitrate: rendition.bitrate,
            codec: CodecConfiguration::Aac {
                name: format!("AAC {} kbit/s", kbps(rendition.bitrate)),
                bitrate: rendition.bitrate,
            },
            thumbnail: false,
        }
    }
}

fn kbps(bitrate: u64) -> u64 {
    bitrate.saturating_add(500) / 1000
}

/// Ids shared by every rendition of one build.
struct GraphRoots<'r> {
    encoding_id: &'r str,
    input_id: &'r str,
    output_id: &'r str,
    input_path: &'r str,
    layout: &'r OutputLayout,
    drm: Option<DrmPlanner<'r>>,
}

pub struct GraphBuilder<'a> {
    provider: &'a dyn EncodingProvider,
    settings: BuildSettings<'a>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(provider: &'a dyn EncodingProvider, settings: BuildSettings<'a>) -> Self {
        Self { provider, settings }
    }

    pub async fn build(&self, request: &EncodeRequest) -> Result<BuiltEncoding, BuildError> {
        let drm_settings = match (request.drm, self.settings.drm) {
            (true, None) => return Err(BuildError::DrmNotConfigured),
            (true, Some(settings)) => Some(settings),
            (false, _) => None,
        };
        if !request.encode_video && !request.encode_audio {
            warn!(file = %request.file_name, "Neither video nor audio requested; manifests will be empty");
        }

        let encoding = self
            .create(
                BuildStep::CreateEncoding,
                None,
                ResourceRequest::Encoding {
                    name: request.file_name.clone(),
                    description: request.output_file_name.clone(),
                },
            )
            .await?;
        let encoding_id = encoding.id.as_str();
        info!(encoding_id, file = %request.file_name, "Created remote encoding");

        let input = self
            .create(
                BuildStep::CreateInput,
                Some(encoding_id),
                ResourceRequest::Input(self.storage(&request.input_bucket)),
            )
            .await?;
        let output = self
            .create(
                BuildStep::CreateOutput,
                Some(encoding_id),
                ResourceRequest::Output(self.storage(&request.output_bucket)),
            )
            .await?;

        let layout = OutputLayout::new(request);
        let roots = GraphRoots {
            encoding_id,
            input_id: input.id(),
            output_id: output.id(),
            input_path: &request.file_name,
            layout: &layout,
            drm: drm_settings.map(|settings| DrmPlanner::new(self.provider, settings)),
        };

        let mut plans = Vec::new();
        if request.encode_video {
            plans.extend(request.video_options.iter().enumerate().map(|(index, rendition)| {
                RenditionPlan::video(rendition, request.generate_thumbnail_track && index == 0)
            }));
        }
        if request.encode_audio {
            plans.extend(request.audio_options.iter().map(RenditionPlan::audio));
        }

        let muxing_ids = try_join_all(plans.into_iter().map(|plan| self.rendition(&roots, plan))).await?;

        let dash = self.manifest(&roots, ManifestFormat::Dash, DASH_MANIFEST_NAME).await?;
        let hls = self.manifest(&roots, ManifestFormat::Hls, HLS_MANIFEST_NAME).await?;

        let started = self
            .create(
                BuildStep::StartEncoding,
                Some(encoding_id),
                ResourceRequest::Start {
                    encoding_id: encoding_id.to_string(),
                    dash_manifest_ids: vec![dash.id.clone()],
                    hls_manifest_ids: vec![hls.id.clone()],
                },
            )
            .await?;

        for trigger in [WebhookTrigger::Finished, WebhookTrigger::Error] {
            self.create(
                BuildStep::SubscribeWebhook,
                Some(encoding_id),
                ResourceRequest::Webhook {
                    encoding_id: started.id.clone(),
                    trigger,
                    url: self.settings.webhook.callback_url.clone(),
                    secret: self.settings.webhook.secret.clone(),
                },
            )
            .await?;
        }

        info!(
            encoding_id,
            muxings = muxing_ids.len(),
            drm = request.drm,
            "Remote encoding started"
        );

        Ok(BuiltEncoding {
            foreign_id: started.id,
            muxing_ids,
            dash_manifest_id: dash.id,
            hls_manifest_id: hls.id,
        })
    }

    async fn rendition(&self, roots: &GraphRoots<'_>, plan: RenditionPlan) -> Result<String, BuildError> {
        let encoding_id = Some(roots.encoding_id);

        let config = self
            .create(
                BuildStep::CreateCodecConfiguration,
                encoding_id,
                ResourceRequest::CodecConfiguration(plan.codec),
            )
            .await?;
        let stream = self
            .create(
                BuildStep::CreateStream,
                encoding_id,
                ResourceRequest::Stream {
                    encoding_id: roots.encoding_id.to_string(),
                    input_id: roots.input_id.to_string(),
                    input_path: roots.input_path.to_string(),
                    codec_config_id: config.id,
                },
            )
            .await?;

        if plan.thumbnail {
            let (sprite_name, vtt_name) = roots.layout.sprite_names();
            self.create(
                BuildStep::CreateSprite,
                encoding_id,
                ResourceRequest::Sprite {
                    encoding_id: roots.encoding_id.to_string(),
                    stream_id: stream.id.clone(),
                    sprite_name,
                    vtt_name,
                    output: roots.binding(roots.layout.root()),
                },
            )
            .await?;
        }

        let plain_path = roots.layout.segments(plan.track, plan.bitrate);
        let muxing = self
            .create(
                BuildStep::CreateMuxing,
                encoding_id,
                ResourceRequest::Fmp4Muxing {
                    encoding_id: roots.encoding_id.to_string(),
                    stream_id: stream.id,
                    segment_length: SEGMENT_LENGTH_SECS,
                    output: match roots.drm {
                        Some(_) => None,
                        None => Some(roots.binding(plain_path.clone())),
                    },
                },
            )
            .await?;

        if let Some(planner) = &roots.drm {
            planner
                .encrypt(roots.encoding_id, &muxing, roots.binding(encrypted_path(&plain_path)))
                .await
                .map_err(|source| BuildError::Provider {
                    step: BuildStep::ApplyDrm,
                    encoding_id: Some(roots.encoding_id.to_string()),
                    source,
                })?;
        }

        debug!(
            encoding_id = roots.encoding_id,
            track = %plan.track,
            bitrate = plan.bitrate,
            muxing_id = %muxing.id,
            "Rendition configured"
        );
        Ok(muxing.id)
    }

    async fn manifest(
        &self,
        roots: &GraphRoots<'_>,
        format: ManifestFormat,
        manifest_name: &str,
    ) -> Result<Resource, BuildError> {
        self.create(
            BuildStep::CreateManifest,
            Some(roots.encoding_id),
            ResourceRequest::Manifest {
                format,
                encoding_id: roots.encoding_id.to_string(),
                manifest_name: manifest_name.to_string(),
                output: roots.binding(roots.layout.root()),
            },
        )
        .await
    }

    async fn create(
        &self,
        step: BuildStep,
        encoding_id: Option<&str>,
        request: ResourceRequest,
    ) -> Result<Resource, BuildError> {
        self.provider
            .create(request)
            .await
            .map_err(|source| BuildError::Provider {
                step,
                encoding_id: encoding_id.map(str::to_string),
                source,
            })
    }

    fn storage(&self, bucket: &str) -> Storage {
        Storage::S3 {
            bucket: bucket.to_string(),
            access_key: self.settings.storage.access_key.clone(),
            secret_key: self.settings.storage.secret_key.clone(),
        }
    }
}

impl GraphRoots<'_> {
    fn binding(&self, output_path: String) -> OutputBinding {
        OutputBinding {
            output_id: self.output_id.to_string(),
            output_path,
        }
    }
}
