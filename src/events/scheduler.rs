//! Delayed-work scheduling for event redelivery.
//!
//! Retries are handed to a [`DelayScheduler`] instead of being rescheduled with
//! ad hoc timers, so a durable scheduler can be swapped in and tests can observe
//! exactly which delays were requested.

use futures::future::BoxFuture;
use std::time::Duration;
use tracing::trace;

pub trait DelayScheduler: Send + Sync {
    /// Run `job` once `delay` has elapsed
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>);
}

/// Runs each job on its own tokio task after sleeping for the delay
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelayScheduler;

impl DelayScheduler for TokioDelayScheduler {
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>) {
        trace!(delay_ms = delay.as_millis() as u64, "Scheduling delayed job");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        TokioDelayScheduler.schedule(
            Duration::from_secs(5),
            async move { flag.store(true, Ordering::SeqCst) }.boxed(),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
