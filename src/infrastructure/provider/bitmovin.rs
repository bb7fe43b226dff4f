use crate::config::settings::ProviderSettings;
use crate::modules::encoding::provider::{
    CodecConfiguration, EncodingProvider, ManifestFormat, OutputBinding, ProviderError, Resource, ResourceKind,
    ResourceRequest, Storage, WebhookTrigger,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const PROVIDER_NAME: &str = "bitMovin";

const API_KEY_HEADER: &str = "X-Api-Key";
const SPRITE_WIDTH: u32 = 320;
const SPRITE_DISTANCE_SECS: u32 = 2;

/// REST binding of [`EncodingProvider`] for the Bitmovin encoding API.
pub struct BitmovinClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    data: Option<EnvelopeData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    result: Option<EnvelopeResult>,
    message: Option<String>,
    developer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResult {
    id: Option<String>,
}

impl BitmovinClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        // Transport-level bound only; a build as a whole has no deadline.
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build provider HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, kind: ResourceKind, path: &str, body: &Value) -> Result<Option<String>, ProviderError> {
        debug!(%kind, path, "Provider request");

        let response = self
            .client
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport { kind, source })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| ProviderError::Transport { kind, source })?;

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Rejected {
                    kind,
                    message: format!("HTTP {}: {}", status, text.trim()),
                })
            }
            Err(e) => {
                return Err(ProviderError::MalformedResponse {
                    kind,
                    message: e.to_string(),
                })
            }
        };

        if !status.is_success() || envelope.status.as_deref() == Some("ERROR") {
            let message = envelope
                .data
                .and_then(|d| d.message.or(d.developer_message))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(ProviderError::Rejected { kind, message });
        }

        Ok(envelope.data.and_then(|d| d.result).and_then(|r| r.id))
    }
}

fn output_json(output: &OutputBinding) -> Value {
    json!({
        "outputId": output.output_id,
        "outputPath": output.output_path,
        "acl": [{ "permission": "PUBLIC_READ" }],
    })
}

fn storage_json(storage: &Storage) -> Value {
    match storage {
        Storage::S3 {
            bucket,
            access_key,
            secret_key,
        } => json!({
            "bucketName": bucket,
            "accessKey": access_key,
            "secretKey": secret_key,
        }),
    }
}

/// Endpoint path and JSON body for one resource.
fn route(request: &ResourceRequest) -> (String, Value) {
    match request {
        ResourceRequest::Encoding { name, description } => (
            "/encoding/encodings".to_string(),
            json!({ "name": name, "description": description }),
        ),
        ResourceRequest::Input(storage) => match storage {
            Storage::S3 { .. } => ("/encoding/inputs/s3".to_string(), storage_json(storage)),
        },
        ResourceRequest::Output(storage) => match storage {
            Storage::S3 { .. } => ("/encoding/outputs/s3".to_string(), storage_json(storage)),
        },
        ResourceRequest::CodecConfiguration(CodecConfiguration::H264 {
            name,
            width,
            height,
            bitrate,
        }) => (
            "/encoding/configurations/video/h264".to_string(),
            json!({
                "name": name,
                "width": width,
                "height": height,
                "bitrate": bitrate,
                "presetConfiguration": "VOD_STANDARD",
            }),
        ),
        ResourceRequest::CodecConfiguration(CodecConfiguration::Aac { name, bitrate }) => (
            "/encoding/configurations/audio/aac".to_string(),
            json!({ "name": name, "bitrate": bitrate }),
        ),
        ResourceRequest::Stream {
            encoding_id,
            input_id,
            input_path,
            codec_config_id,
        } => (
            format!("/encoding/encodings/{}/streams", encoding_id),
            json!({
                "codecConfigId": codec_config_id,
                "inputStreams": [{
                    "inputId": input_id,
                    "inputPath": input_path,
                    "selectionMode": "AUTO",
                }],
            }),
        ),
        ResourceRequest::Sprite {
            encoding_id,
            stream_id,
            sprite_name,
            vtt_name,
            output,
        } => (
            format!("/encoding/encodings/{}/streams/{}/sprites", encoding_id, stream_id),
            json!({
                "spriteName": sprite_name,
                "vttName": vtt_name,
                "width": SPRITE_WIDTH,
                "distance": SPRITE_DISTANCE_SECS,
                "outputs": [output_json(output)],
            }),
        ),
        ResourceRequest::Fmp4Muxing {
            encoding_id,
            stream_id,
            segment_length,
            output,
        } => {
            let mut body = json!({
                "segmentLength": segment_length,
                "streams": [{ "streamId": stream_id }],
            });
            if let Some(output) = output {
                body["outputs"] = json!([output_json(output)]);
            }
            (format!("/encoding/encodings/{}/muxings/fmp4", encoding_id), body)
        }
        ResourceRequest::CencDrm {
            encoding_id,
            muxing_id,
            key,
            kid,
            widevine_pssh,
            playready_la_url,
            output,
        } => (
            format!("/encoding/encodings/{}/muxings/fmp4/{}/drm/cenc", encoding_id, muxing_id),
            json!({
                "key": key,
                "kid": kid,
                "widevine": { "pssh": widevine_pssh },
                "playReady": { "laUrl": playready_la_url },
                "outputs": [output_json(output)],
            }),
        ),
        ResourceRequest::Manifest {
            format,
            encoding_id,
            manifest_name,
            output,
        } => {
            let path = match format {
                ManifestFormat::Dash => "/encoding/manifests/dash/default",
                ManifestFormat::Hls => "/encoding/manifests/hls/default",
            };
            (
                path.to_string(),
                json!({
                    "encodingId": encoding_id,
                    "manifestName": manifest_name,
                    "outputs": [output_json(output)],
                }),
            )
        }
        ResourceRequest::Start {
            encoding_id,
            dash_manifest_ids,
            hls_manifest_ids,
        } => (
            format!("/encoding/encodings/{}/start", encoding_id),
            json!({
                "manifestGenerator": "V2",
                "vodDashManifests": dash_manifest_ids.iter().map(|id| json!({ "manifestId": id })).collect::<Vec<_>>(),
                "vodHlsManifests": hls_manifest_ids.iter().map(|id| json!({ "manifestId": id })).collect::<Vec<_>>(),
            }),
        ),
        ResourceRequest::Webhook {
            encoding_id,
            trigger,
            url,
            secret,
        } => {
            let event = match trigger {
                WebhookTrigger::Finished => "finished",
                WebhookTrigger::Error => "error",
            };
            (
                format!("/notifications/webhooks/encoding/encodings/{}/{}", encoding_id, event),
                json!({
                    "url": url,
                    "method": "POST",
                    "signature": { "type": "HMAC", "key": secret },
                }),
            )
        }
    }
}

#[async_trait]
impl EncodingProvider for BitmovinClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create(&self, request: ResourceRequest) -> Result<Resource, ProviderError> {
        let kind = request.kind();
        let (path, body) = route(&request);
        let id = self.post(kind, &path, &body).await?;

        let id = match (id, &request) {
            (Some(id), _) => id,
            // The start call answers with the encoding itself.
            (None, ResourceRequest::Start { encoding_id, .. }) => encoding_id.clone(),
            (None, _) => {
                return Err(ProviderError::MalformedResponse {
                    kind,
                    message: "response carries no resource id".to_string(),
                })
            }
        };

        Ok(Resource { kind, id })
    }
}
