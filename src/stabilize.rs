//! Tiered "is the page settled yet" heuristic.

use crate::config::Timing;
use crate::page::BrowserPage;
use crate::report::FailureReason;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Which tier settled the page. Each is weaker evidence than the one before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settled {
    NetworkIdle,
    Loaded,
    /// Neither tier could be observed; a fixed pause was taken instead.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct StabilizationWaiter {
    pub primary: Duration,
    pub fallback: Duration,
    pub pause: Duration,
}

impl StabilizationWaiter {
    pub fn new(primary: Duration, fallback: Duration, pause: Duration) -> Self {
        Self {
            primary,
            fallback,
            pause,
        }
    }

    pub fn from_timing(timing: &Timing) -> Self {
        Self::new(
            Duration::from_millis(timing.network_idle_ms),
            Duration::from_millis(timing.load_ms),
            Duration::from_millis(timing.settle_pause_ms),
        )
    }

    /// Wait for network quiescence, then for load completion, then just pause.
    /// Never fails: not being able to prove stability is not a reason to stop.
    pub async fn await_stable<P: BrowserPage + ?Sized>(&self, page: &P) -> Settled {
        if settles_within(self.primary, page.wait_network_idle(self.primary)).await {
            debug!("settled: network idle");
            return Settled::NetworkIdle;
        }
        if settles_within(self.fallback, page.wait_loaded(self.fallback)).await {
            debug!("settled: load complete");
            return Settled::Loaded;
        }
        warn!(
            "{}: pausing {}ms",
            FailureReason::StabilizationDegraded,
            self.pause.as_millis()
        );
        page.pause(self.pause).await;
        Settled::Degraded
    }
}

/// Free-function form with the default one-second last-resort pause.
pub async fn await_stable<P: BrowserPage + ?Sized>(
    page: &P,
    primary_timeout: Duration,
    fallback_timeout: Duration,
) -> Settled {
    StabilizationWaiter::new(primary_timeout, fallback_timeout, Duration::from_secs(1))
        .await_stable(page)
        .await
}

async fn settles_within<F>(limit: Duration, wait: F) -> bool
where
    F: Future<Output = crate::Result<()>>,
{
    match tokio::time::timeout(limit, wait).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("stabilization tier failed: {}", e);
            false
        }
        Err(_) => false,
    }
}
