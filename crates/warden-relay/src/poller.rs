//! Interval-driven batch loop shared by the relay and the worker.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// Counts for one processed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// One poll of the PENDING outbox set.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process_batch(&self) -> Result<BatchReport, RelayError>;
}

/// Poll `processor` until `shutdown` flips to `true` or its sender is dropped.
///
/// A failed batch is logged and followed by the configured backoff; the loop
/// itself never exits on a batch error.
pub async fn run_poller(
    processor: &dyn BatchProcessor,
    config: &RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        processor = processor.name(),
        poll_interval_ms = config.poll_interval_ms,
        "Outbox poller started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                match processor.process_batch().await {
                    Ok(report) if report.fetched > 0 => {
                        info!(
                            processor = processor.name(),
                            fetched = report.fetched,
                            delivered = report.delivered,
                            failed = report.failed,
                            "Outbox batch complete"
                        );
                    }
                    Ok(_) => debug!(processor = processor.name(), "Outbox idle"),
                    Err(e) => {
                        error!(processor = processor.name(), error = %e, "Outbox batch failed");
                        tokio::select! {
                            _ = sleep(config.error_backoff()) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(processor = processor.name(), "Outbox poller stopped");
}
