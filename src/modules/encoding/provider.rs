//! Narrow capability interface over the remote encoding provider.
//!
//! Every remote resource the builder needs is one variant of [`ResourceRequest`];
//! a provider only has to know how to create each variant and hand back its id.
//! The HTTP binding lives in `infrastructure::provider`.

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Encoding,
    Input,
    Output,
    CodecConfiguration,
    Stream,
    Sprite,
    Muxing,
    Drm,
    Manifest,
    Start,
    Webhook,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Encoding => "encoding",
            ResourceKind::Input => "input",
            ResourceKind::Output => "output",
            ResourceKind::CodecConfiguration => "codec configuration",
            ResourceKind::Stream => "stream",
            ResourceKind::Sprite => "sprite",
            ResourceKind::Muxing => "muxing",
            ResourceKind::Drm => "drm",
            ResourceKind::Manifest => "manifest",
            ResourceKind::Start => "start",
            ResourceKind::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

/// Where the provider reads sources from or writes results to.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    S3 {
        bucket: String,
        access_key: String,
        secret_key: String,
    },
}

/// A write target: an output resource plus a path inside it. Written
/// publicly readable.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub output_id: String,
    pub output_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodecConfiguration {
    H264 {
        name: String,
        width: u32,
        height: u32,
        bitrate: u64,
    },
    Aac {
        name: String,
        bitrate: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Dash,
    Hls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTrigger {
    Finished,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRequest {
    Encoding {
        name: String,
        description: String,
    },
    Input(Storage),
    Output(Storage),
    CodecConfiguration(CodecConfiguration),
    Stream {
        encoding_id: String,
        input_id: String,
        input_path: String,
        codec_config_id: String,
    },
    Sprite {
        encoding_id: String,
        stream_id: String,
        sprite_name: String,
        vtt_name: String,
        output: OutputBinding,
    },
    /// Fragmented MP4. `output` is `None` when a DRM configuration will own
    /// the write target instead.
    Fmp4Muxing {
        encoding_id: String,
        stream_id: String,
        segment_length: f64,
        output: Option<OutputBinding>,
    },
    CencDrm {
        encoding_id: String,
        muxing_id: String,
        key: String,
        kid: String,
        widevine_pssh: String,
        playready_la_url: String,
        output: OutputBinding,
    },
    /// Default manifest that picks up every muxing of the encoding.
    Manifest {
        format: ManifestFormat,
        encoding_id: String,
        manifest_name: String,
        output: OutputBinding,
    },
    Start {
        encoding_id: String,
        dash_manifest_ids: Vec<String>,
        hls_manifest_ids: Vec<String>,
    },
    Webhook {
        encoding_id: String,
        trigger: WebhookTrigger,
        url: String,
        secret: String,
    },
}

impl ResourceRequest {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRequest::Encoding { .. } => ResourceKind::Encoding,
            ResourceRequest::Input(_) => ResourceKind::Input,
            ResourceRequest::Output(_) => ResourceKind::Output,
            ResourceRequest::CodecConfiguration(_) => ResourceKind::CodecConfiguration,
            ResourceRequest::Stream { .. } => ResourceKind::Stream,
            ResourceRequest::Sprite { .. } => ResourceKind::Sprite,
            ResourceRequest::Fmp4Muxing { .. } => ResourceKind::Muxing,
            ResourceRequest::CencDrm { .. } => ResourceKind::Drm,
            ResourceRequest::Manifest { .. } => ResourceKind::Manifest,
            ResourceRequest::Start { .. } => ResourceKind::Start,
            ResourceRequest::Webhook { .. } => ResourceKind::Webhook,
        }
    }
}

/// Handle to a created remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: String,
}

impl Resource {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{kind} rejected by provider: {message}")]
    Rejected { kind: ResourceKind, message: String },

    #[error("{kind} request failed: {source}")]
    Transport {
        kind: ResourceKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} response was malformed: {message}")]
    MalformedResponse { kind: ResourceKind, message: String },
}

#[async_trait]
pub trait EncodingProvider: Send + Sync {
    /// Identifies the integration on persisted jobs (`thirdPartyEncoder`).
    fn name(&self) -> &str;

    async fn create(&self, request: ResourceRequest) -> Result<Resource, ProviderError>;
}
