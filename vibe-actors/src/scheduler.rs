//! Interval driver for the ingestion and analysis jobs.
//!
//! A job runs immediately, then once per interval. After a failed run it is
//! retried sooner, with an exponential backoff that starts at the configured
//! base and never exceeds the regular interval.
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: 0,
        }
    }

    /// Delay before the next attempt after one more failure.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.failures.min(31)).unwrap_or(u32::MAX);
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run `job` now and then every `interval` until `shutdown` fires.
///
/// A run in progress is abandoned when shutdown is signalled.
pub async fn run_interval_job<F, Fut>(
    name: String,
    interval: Duration,
    backoff_base: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut job: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    let mut backoff = Backoff::new(backoff_base, interval);
    info!(job=%name, interval_secs = interval.as_secs(), "scheduler.job.started");

    loop {
        let outcome = tokio::select! {
            _ = shutdown.recv() => break,
            res = job() => res,
        };
        let delay = match outcome {
            Ok(()) => {
                backoff.reset();
                interval
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    job=%name,
                    error=%e,
                    failures = backoff.failures(),
                    retry_in_secs = delay.as_secs_f64(),
                    "scheduler.job.failed"
                );
                delay
            }
        };
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!(job=%name, "scheduler.job.stopped");
    Ok(())
}

/// [`run_interval_job`] on its own task.
pub fn spawn_interval_job<F, Fut>(
    name: impl Into<String>,
    interval: Duration,
    backoff_base: Duration,
    shutdown: broadcast::Receiver<()>,
    job: F,
) -> JoinHandle<anyhow::Result<()>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(run_interval_job(
        name.into(),
        interval,
        backoff_base,
        shutdown,
        job,
    ))
}
