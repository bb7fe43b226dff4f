//! CENC wrapping of fragmented MP4 output.
//!
//! An encrypted rendition is muxed without any output of its own; the DRM
//! configuration created here is the only thing that writes segments, so a
//! stream is never delivered both in clear and encrypted.

use super::provider::{EncodingProvider, OutputBinding, ProviderError, Resource, ResourceRequest};
use crate::config::settings::DrmSettings;
use tracing::debug;

pub struct DrmPlanner<'a> {
    provider: &'a dyn EncodingProvider,
    settings: &'a DrmSettings,
}

impl<'a> DrmPlanner<'a> {
    pub fn new(provider: &'a dyn EncodingProvider, settings: &'a DrmSettings) -> Self {
        Self { provider, settings }
    }

    /// Attaches a CENC configuration (Widevine PSSH + PlayReady license URL)
    /// to `muxing`, writing the encrypted segments to `output`.
    pub async fn encrypt(
        &self,
        encoding_id: &str,
        muxing: &Resource,
        output: OutputBinding,
    ) -> Result<Resource, ProviderError> {
        debug!(encoding_id, muxing_id = %muxing.id(), path = %output.output_path, "Creating CENC DRM configuration");

        self.provider
            .create(self.request(encoding_id, muxing, output))
            .await
    }

    fn request(&self, encoding_id: &str, muxing: &Resource, output: OutputBinding) -> ResourceRequest {
        ResourceRequest::CencDrm {
            encoding_id: encoding_id.to_string(),
            muxing_id: muxing.id().to_string(),
            key: self.settings.key.clone(),
            kid: self.settings.kid.clone(),
            widevine_pssh: self.settings.widevine_pssh.clone(),
            playready_la_url: self.settings.playready_la_url.clone(),
            output,
        }
    }
}

/// Encrypted segments get their own directory next to where clear segments
/// of the same rendition would go.
pub fn encrypted_path(plain_path: &str) -> String {
    format!("{}/cenc/", plain_path.trim_end_matches('/'))
}
