use crate::config::settings::AppConfig;
use crate::infrastructure::queue::TaskQueue;
use crate::modules::encoding::provider::EncodingProvider;
use crate::modules::encoding::repository::EncodingRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub repo: Arc<dyn EncodingRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub provider: Arc<dyn EncodingProvider>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repo: Arc<dyn EncodingRepository>,
        queue: Arc<dyn TaskQueue>,
        provider: Arc<dyn EncodingProvider>,
    ) -> Self {
        Self {
            config,
            repo,
            queue,
            provider,
        }
    }
}
