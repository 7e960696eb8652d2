//! Fixed-interval background loop with cooperative stop.
//!
//! The loop selects on a `watch` stop signal (with `biased` priority) and an
//! interval tick. Every tick spawns the cycle as its own task inside a
//! `JoinSet`, so a cycle that overruns the interval never delays the timer
//! and a panicking cycle never ends the loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::ServiceError;

/// How long [`PeriodicTask::stop`] waits for in-flight cycles before
/// aborting them.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PeriodicTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// With `run_immediately` the first cycle starts right away, otherwise
    /// one full `period` passes first.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        run_immediately: bool,
        tick: F,
    ) -> Result<Self, ServiceError>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ServiceError::NoRuntime(name))?;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let start = if run_immediately {
                tokio::time::Instant::now()
            } else {
                tokio::time::Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut cycles = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        tracing::info!(task = name, "periodic task stopping");
                        break;
                    }
                    Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                        log_cycle_exit(name, joined);
                    }
                    _ = interval.tick() => {
                        cycles.spawn(tick());
                    }
                }
            }

            while let Some(joined) = cycles.join_next().await {
                log_cycle_exit(name, joined);
            }
        });

        tracing::info!(
            task = name,
            period_secs = period.as_secs(),
            run_immediately,
            "periodic task started"
        );
        Ok(Self {
            name,
            stop_tx,
            handle,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop, then wait up to `timeout` for it and its in-flight
    /// cycles to finish. Anything still running after that is aborted.
    pub async fn stop(self, timeout: Duration) -> Result<(), ServiceError> {
        let _ = self.stop_tx.send(true);
        let abort = self.handle.abort_handle();

        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => {
                tracing::info!(task = self.name, "periodic task stopped");
                Ok(())
            }
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(ServiceError::TaskFailed {
                task: self.name,
                reason: e.to_string(),
            }),
            Err(_) => {
                abort.abort();
                tracing::warn!(
                    task = self.name,
                    "stop timeout ({:?}), in-flight cycle aborted",
                    timeout
                );
                Ok(())
            }
        }
    }
}

fn log_cycle_exit(name: &'static str, joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(task = name, "cycle panicked: {e}");
        }
    }
}
