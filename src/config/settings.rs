use crate::config::env::{self, EnvKey};
use anyhow::{anyhow, Context, Result};
use url::Url;

pub const WEBHOOK_PATH: &str = "api/v1/encodings/update-webhook";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub rabbitmq_url: Option<String>,
    pub encoding_queue: String,
    pub encoding_workers: usize,
    pub provider: ProviderSettings,
    pub storage: StorageSettings,
    pub webhook: WebhookSettings,
    pub drm: Option<DrmSettings>,
}

#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Buckets and credentials the provider uses to reach the source and
/// destination storage.
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub default_input_bucket: String,
    pub default_output_bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub struct WebhookSettings {
    pub callback_url: String,
    pub secret: String,
}

#[derive(Clone, Debug)]
pub struct DrmSettings {
    pub key: String,
    pub kid: String,
    pub widevine_pssh: String,
    pub playready_la_url: String,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        let webhook_base = env::get(EnvKey::WebhookBaseUrl).context("WEBHOOK_BASE_URL is required")?;

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get_optional(EnvKey::DatabaseUrl),
            rabbitmq_url: env::get_optional(EnvKey::RabbitMqUrl),
            encoding_queue: env::get_or(EnvKey::EncodingQueue, "encoding_tasks"),
            encoding_workers: env::get_parsed(EnvKey::EncodingWorkers, 1usize).max(1),
            provider: ProviderSettings {
                api_url: env::get_or(EnvKey::BitmovinApiUrl, "https://api.bitmovin.com/v1"),
                api_key: env::get(EnvKey::BitmovinApiKey).context("BITMOVIN_API_KEY is required")?,
                timeout_secs: env::get_parsed(EnvKey::ProviderTimeoutSecs, 30),
            },
            storage: StorageSettings {
                default_input_bucket: env::get(EnvKey::DefaultInputBucket)
                    .context("DEFAULT_INPUT_BUCKET is required")?,
                default_output_bucket: env::get(EnvKey::DefaultOutputBucket)
                    .context("DEFAULT_OUTPUT_BUCKET is required")?,
                access_key: env::get(EnvKey::AwsAccessKey).context("AWS_ACCESS_KEY_ID is required")?,
                secret_key: env::get(EnvKey::AwsSecretKey).context("AWS_SECRET_ACCESS_KEY is required")?,
            },
            webhook: WebhookSettings {
                callback_url: callback_url(&webhook_base)?,
                secret: env::get(EnvKey::WebhookSecret).context("WEBHOOK_SECRET is required")?,
            },
            drm: load_drm_settings()?,
        })
    }
}

/// Joins the public base URL with the webhook route, tolerating a trailing
/// slash (or its absence) on the base.
pub fn callback_url(base: &str) -> Result<String> {
    let mut base = Url::parse(base).map_err(|e| anyhow!("Invalid WEBHOOK_BASE_URL {}: {}", base, e))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    Ok(base.join(WEBHOOK_PATH)?.to_string())
}

// DRM keys are all-or-nothing: a partial set is a deployment mistake.
fn load_drm_settings() -> Result<Option<DrmSettings>> {
    let key = env::get_optional(EnvKey::DrmKey);
    let kid = env::get_optional(EnvKey::DrmKid);
    let pssh = env::get_optional(EnvKey::DrmWidevinePssh);
    let la_url = env::get_optional(EnvKey::DrmPlayReadyLaUrl);

    match (key, kid, pssh, la_url) {
        (Some(key), Some(kid), Some(widevine_pssh), Some(playready_la_url)) => Ok(Some(DrmSettings {
            key,
            kid,
            widevine_pssh,
            playready_la_url,
        })),
        (None, None, None, None) => Ok(None),
        _ => Err(anyhow!(
            "DRM_KEY, DRM_KID, DRM_WIDEVINE_PSSH and DRM_PLAYREADY_LA_URL must be set together"
        )),
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            database_url: None,
            rabbitmq_url: None,
            encoding_queue: "encoding_tasks".to_string(),
            encoding_workers: 1,
            provider: ProviderSettings {
                api_url: "http://provider.test/v1".to_string(),
                api_key: "test-api-key".to_string(),
                timeout_secs: 5,
            },
            storage: StorageSettings {
                default_input_bucket: "input-bucket".to_string(),
                default_output_bucket: "output-bucket".to_string(),
                access_key: "access".to_string(),
                secret_key: "secret".to_string(),
            },
            webhook: WebhookSettings {
                callback_url: "https://hooks.test/api/v1/encodings/update-webhook".to_string(),
                secret: "webhook-secret".to_string(),
            },
            drm: Some(DrmSettings {
                key: "2e42d3b9ecce677ea2a2a8431d2b5551".to_string(),
                kid: "6cdebd403fd2d0770344631776239b04".to_string(),
                widevine_pssh: "EhBs3r1AP9LQdwNEYxd2I5sEGgVlemRybUjj3JWbBg==".to_string(),
                playready_la_url: "https://playready.test/preauth".to_string(),
            }),
        }
    }
}
