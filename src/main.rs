use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

use config::settings::AppConfig;
use infrastructure::db::pool;
use infrastructure::provider::bitmovin::BitmovinClient;
use infrastructure::queue::memory::MemoryQueue;
use infrastructure::queue::rabbitmq::RabbitMqService;
use infrastructure::queue::TaskQueue;
use modules::encoding::repository::{EncodingRepository, MemoryEncodingRepository, PgEncodingRepository};
use state::AppState;

enum QueueBackend {
    RabbitMq(RabbitMqService),
    Memory(Arc<MemoryQueue>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting encoding service...");

    let config = AppConfig::new().context("Invalid configuration")?;
    if config.drm.is_none() {
        info!("DRM keys not configured; DRM requests will be rejected");
    }

    let repo: Arc<dyn EncodingRepository> = match &config.database_url {
        Some(url) => {
            let db = pool::connect_to_db(url).await.context("Failed to connect to PostgreSQL")?;
            pool::run_migrations(&db).await.context("Failed to run migrations")?;
            Arc::new(PgEncodingRepository::new(db))
        }
        None => {
            warn!("DATABASE_URL not set; jobs are kept in memory and lost on restart");
            Arc::new(MemoryEncodingRepository::new())
        }
    };

    let backend = match &config.rabbitmq_url {
        Some(url) => QueueBackend::RabbitMq(RabbitMqService::new(url).await?),
        None => {
            warn!("RABBITMQ_URL not set; using in-process queue without redelivery");
            QueueBackend::Memory(Arc::new(MemoryQueue::new()))
        }
    };
    let queue: Arc<dyn TaskQueue> = match &backend {
        QueueBackend::RabbitMq(rabbit) => Arc::new(rabbit.clone()),
        QueueBackend::Memory(memory) => memory.clone(),
    };

    let provider = Arc::new(BitmovinClient::new(&config.provider)?);
    let port = config.server_port;
    let workers = config.encoding_workers;
    let state = AppState::new(config, repo, queue, provider);

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    for worker in 0..workers {
        match &backend {
            QueueBackend::RabbitMq(rabbit) => {
                tracker.spawn(workers::encoder::start_rabbitmq_worker(
                    state.clone(),
                    rabbit.clone(),
                    worker,
                    shutdown.clone(),
                ));
            }
            QueueBackend::Memory(memory) => {
                let receiver = memory.subscribe(&state.config.encoding_queue).await;
                tracker.spawn(workers::encoder::start_memory_worker(
                    state.clone(),
                    receiver,
                    worker,
                    shutdown.clone(),
                ));
            }
        }
    }
    tracker.close();

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    tracker.wait().await;
    info!("Encoding service stopped");

    Ok(())
}
