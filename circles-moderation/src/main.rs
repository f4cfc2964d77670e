use std::sync::Arc;

use circles_shared::clients::db::create_pool;
use circles_shared::clients::minio::MinioClient;
use circles_shared::clients::rabbitmq::RabbitMQClient;

use circles_moderation::clock::SystemClock;
use circles_moderation::config::{AppConfig, StorageBackend};
use circles_moderation::engine::ModerationEngine;
use circles_moderation::events::EventBus;
use circles_moderation::store::{CircleStore, MemoryStore, PgStore};
use circles_moderation::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    circles_shared::middleware::init_tracing("circles-moderation");

    let config = AppConfig::load()?;
    let metrics_handle = circles_shared::middleware::init_metrics()?;

    match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.db_pool_size)?;
            start(PgStore::new(pool), config, metrics_handle).await
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; all data is lost on restart");
            start(MemoryStore::default(), config, metrics_handle).await
        }
    }
}

async fn start<S: CircleStore>(
    store: S,
    config: AppConfig,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> anyhow::Result<()> {
    let events = if config.events_enabled {
        EventBus::RabbitMq(RabbitMQClient::connect(&config.rabbitmq_url).await?)
    } else {
        tracing::info!("event publishing disabled");
        EventBus::Disabled
    };

    let media = if config.media_cleanup {
        Some(
            MinioClient::new(
                &config.minio_endpoint,
                &config.minio_access_key,
                &config.minio_secret_key,
                &config.minio_bucket,
            )
            .await,
        )
    } else {
        None
    };

    let engine = ModerationEngine::new(store, Arc::new(SystemClock), config.policy());
    let state = Arc::new(AppState {
        engine,
        config,
        events,
        media,
        metrics_handle: Some(metrics_handle),
    });

    circles_moderation::serve(state).await
}
