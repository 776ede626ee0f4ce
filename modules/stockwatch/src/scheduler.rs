use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info};

use crate::cycle::Cycle;

/// Default pause between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed: u64,
    /// Cycles that returned an error or panicked.
    pub missed: u64,
}

/// Runs a cycle, sleeps the interval, repeats. Nothing a cycle does ends the loop.
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown cuts the sleep short, but a cycle already in flight is allowed
    /// to finish first.
    pub async fn run_until<C, F>(&self, cycle: &C, shutdown: F) -> SchedulerStats
    where
        C: Cycle + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = SchedulerStats::default();
        let mut stopping = false;

        loop {
            let run = AssertUnwindSafe(cycle.run_cycle()).catch_unwind();
            tokio::pin!(run);

            let result = loop {
                tokio::select! {
                    biased;
                    result = &mut run => break result,
                    _ = &mut shutdown, if !stopping => {
                        stopping = true;
                        info!("Shutdown requested, finishing current cycle");
                    }
                }
            };

            match result {
                Ok(Ok(_)) => stats.completed += 1,
                Ok(Err(e)) => {
                    stats.missed += 1;
                    error!(error = format!("{e:#}"), missed = stats.missed, "Cycle failed");
                }
                Err(panic) => {
                    stats.missed += 1;
                    error!(
                        panic = panic_message(panic.as_ref()),
                        missed = stats.missed,
                        "Cycle panicked"
                    );
                }
            }

            if stopping {
                break;
            }

            info!(next_in_secs = self.interval.as_secs(), "Waiting for next cycle");
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        info!(completed = stats.completed, missed = stats.missed, "Scheduler stopped");
        stats
    }

    pub async fn run_forever<C>(&self, cycle: &C) -> SchedulerStats
    where
        C: Cycle + ?Sized,
    {
        self.run_until(cycle, std::future::pending()).await
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
