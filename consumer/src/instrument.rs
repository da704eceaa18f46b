//! Lag, freshness, and throughput instrumentation.
//!
//! All metrics go through the `metrics` facade; the binary installs the
//! Prometheus exporter. Two background pollers feed the gauges that cannot be
//! updated inline: broker queue depth and the read-model aggregates.

use crate::consumer::Disposition;
use atelier_core::dead_letter::DeadLetters;
use atelier_core::event::EventKind;
use atelier_core::read_model::UserProfiles;
use atelier_redpanda::QueueDepthProbe;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Count one message through the state machine.
pub fn record_disposition(event_type: &'static str, disposition: Disposition) {
    metrics::counter!(
        "consumer.events",
        "event_type" => event_type,
        "disposition" => disposition.as_str(),
    )
    .increment(1);
}

/// Record a successfully applied event: end-to-end lag against the producer
/// timestamp and the freshness watermark for this event type.
#[allow(clippy::cast_precision_loss)] // Second-scale magnitudes fit f64
pub fn record_applied(kind: EventKind, produced_at: Option<DateTime<Utc>>, elapsed: Duration) {
    let now = Utc::now();

    if let Some(produced_at) = produced_at {
        let lag_seconds = ((now - produced_at).num_milliseconds() as f64 / 1000.0).max(0.0);
        metrics::histogram!("read_model.lag_seconds", "event_type" => kind.as_str())
            .record(lag_seconds);
    }

    metrics::gauge!("read_model.freshness_timestamp", "event_type" => kind.as_str())
        .set(now.timestamp() as f64);

    tracing::trace!(event_type = %kind, elapsed = ?elapsed, "Event applied");
}

/// Spawn the queue-depth poller.
///
/// Each tick runs the blocking probe on the blocking pool and publishes the
/// summed consumer-group lag as the `consumer.queue_depth` gauge.
#[allow(clippy::cast_precision_loss)]
pub fn spawn_queue_depth_poller(
    probe: QueueDepthProbe,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let probe = Arc::new(probe);
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let probe = Arc::clone(&probe);
                    match tokio::task::spawn_blocking(move || probe.total_lag()).await {
                        Ok(Ok(lag)) => {
                            metrics::gauge!("consumer.queue_depth").set(lag as f64);
                            tracing::debug!(lag = lag, "Queue depth sampled");
                        }
                        Ok(Err(error)) => {
                            tracing::warn!(error = %error, "Queue depth probe failed");
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "Queue depth task failed");
                        }
                    }
                }
            }
        }
    })
}

/// Spawn the read-model aggregate poller.
///
/// Publishes `read_model.users_total` from the profile count and
/// `dead_letter.pending` from the dead-letter queue on every tick.
#[allow(clippy::cast_precision_loss)]
pub fn spawn_read_model_gauges<P>(
    profiles: Arc<P>,
    dead_letters: Arc<dyn DeadLetters>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    P: UserProfiles + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match profiles.count().await {
                        Ok(users) => {
                            metrics::gauge!("read_model.users_total").set(users as f64);
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "User count poll failed");
                        }
                    }

                    match dead_letters.count_pending().await {
                        Ok(pending) => {
                            metrics::gauge!("dead_letter.pending").set(pending as f64);
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "Dead-letter count poll failed");
                        }
                    }
                }
            }
        }
    })
}
