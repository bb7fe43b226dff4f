use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RabbitMqUrl,
    EncodingQueue,
    EncodingWorkers,
    BitmovinApiUrl,
    BitmovinApiKey,
    ProviderTimeoutSecs,
    WebhookBaseUrl,
    WebhookSecret,
    DefaultInputBucket,
    DefaultOutputBucket,
    AwsAccessKey,
    AwsSecretKey,
    DrmKey,
    DrmKid,
    DrmWidevinePssh,
    DrmPlayReadyLaUrl,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::EncodingQueue => "ENCODING_QUEUE",
            EnvKey::EncodingWorkers => "ENCODING_WORKERS",
            EnvKey::BitmovinApiUrl => "BITMOVIN_API_URL",
            EnvKey::BitmovinApiKey => "BITMOVIN_API_KEY",
            EnvKey::ProviderTimeoutSecs => "PROVIDER_TIMEOUT_SECS",
            EnvKey::WebhookBaseUrl => "WEBHOOK_BASE_URL",
            EnvKey::WebhookSecret => "WEBHOOK_SECRET",
            EnvKey::DefaultInputBucket => "DEFAULT_INPUT_BUCKET",
            EnvKey::DefaultOutputBucket => "DEFAULT_OUTPUT_BUCKET",
            EnvKey::AwsAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::AwsSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::DrmKey => "DRM_KEY",
            EnvKey::DrmKid => "DRM_KID",
            EnvKey::DrmWidevinePssh => "DRM_WIDEVINE_PSSH",
            EnvKey::DrmPlayReadyLaUrl => "DRM_PLAYREADY_LA_URL",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

/// Like [`get`], but treats unset and blank values the same.
pub fn get_optional(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
