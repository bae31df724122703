//! Fixed-interval background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs `tick` every `period` until `cancel` fires.
///
/// The first tick runs immediately. A tick in progress when `cancel` fires
/// runs to completion; no new tick starts afterwards. Slow ticks delay the
/// next one instead of piling up.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(task = name, period_secs = period.as_secs(), "Periodic task started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tick().await;
        }

        tracing::debug!(task = name, "Periodic task stopped");
    })
}
