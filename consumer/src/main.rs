//! `atelier-query`, the read-model synchronization service.
//!
//! Composition root: loads config, installs the Prometheus exporter, connects
//! and migrates the read-model database, wires the four handlers into a
//! registry, and runs the consumer until SIGINT.

use anyhow::Context;
use atelier_consumer::handlers::{
    ImageProcessedHandler, ImageUploadedHandler, ProcessingFailedHandler, UserRegisteredHandler,
};
use atelier_consumer::{instrument, Config, EventConsumer, HandlerRegistry};
use atelier_core::dead_letter::DeadLetters;
use atelier_core::event_bus::EventBus;
use atelier_read_model::{PgDeadLetters, PgImageStatistics, PgProcessedImages, PgUserProfiles};
use atelier_redpanda::{QueueDepthProbe, RedpandaEventBus};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        brokers = %config.brokers,
        topics = ?config.topics,
        consumer_group = %config.consumer_group,
        metrics_addr = %config.metrics_addr,
        "Starting atelier-query"
    );

    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()
        .context("installing Prometheus exporter")?;

    let pool = atelier_read_model::connect(&config.database_url, config.max_connections)
        .await
        .context("connecting to read-model database")?;
    atelier_read_model::migrate(&pool)
        .await
        .context("running migrations")?;

    let images = Arc::new(PgProcessedImages::new(pool.clone()));
    let profiles = Arc::new(PgUserProfiles::new(pool.clone()));
    let statistics = Arc::new(PgImageStatistics::new(pool.clone()));
    let dead_letters: Arc<dyn DeadLetters> = Arc::new(PgDeadLetters::new(pool));

    let bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(config.brokers.as_str())
            .consumer_group(config.consumer_group.as_str())
            .auto_offset_reset(config.auto_offset_reset.as_str())
            .build()
            .context("creating event bus")?,
    );

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(UserRegisteredHandler::new(
        Arc::clone(&profiles),
        Arc::clone(&statistics),
    )));
    registry.register(Arc::new(ImageUploadedHandler::new(
        Arc::clone(&images),
        Arc::clone(&profiles),
        Arc::clone(&statistics),
    )));
    registry.register(Arc::new(ImageProcessedHandler::new(
        Arc::clone(&images),
        Arc::clone(&statistics),
    )));
    registry.register(Arc::new(ProcessingFailedHandler::new(
        Arc::clone(&images),
        Arc::clone(&statistics),
    )));

    let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let probe = QueueDepthProbe::new(&config.brokers, &config.consumer_group, &topics)
        .context("creating queue-depth probe")?;
    let depth_task =
        instrument::spawn_queue_depth_poller(probe, config.poll_interval, shutdown_rx.clone());
    let gauges_task = instrument::spawn_read_model_gauges(
        Arc::clone(&profiles),
        Arc::clone(&dead_letters),
        config.poll_interval,
        shutdown_rx.clone(),
    );

    let consumer = EventConsumer::new(bus, registry, dead_letters);

    tokio::select! {
        result = consumer.run(&topics, shutdown_rx) => {
            result.context("consumer loop failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(depth_task, gauges_task);

    tracing::info!("atelier-query stopped");
    Ok(())
}
