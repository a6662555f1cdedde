//! Ordered fallback resolution over heterogeneous locator candidates.

use crate::config::LocatorCandidate;
use crate::page::{BrowserPage, ElementHandle};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Lower bound on a single probe so a zero timeout still gets one full pass.
const MIN_PROBE_BUDGET: Duration = Duration::from_millis(500);

/// The winning candidate and the element it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Position of the winning candidate in the list.
    pub index: usize,
    pub element: ElementHandle,
}

/// Finds the first visible match among ordered candidates.
#[derive(Debug, Clone)]
pub struct LocatorResolver {
    poll_interval: Duration,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl LocatorResolver {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Try candidates strictly in order until one has at least one match whose first
    /// element is visible. Re-polls the whole list until `timeout`; `None` if nothing
    /// matched. Candidates that error are treated as non-matches.
    pub async fn resolve<P: BrowserPage + ?Sized>(
        &self,
        page: &P,
        candidates: &[LocatorCandidate],
        timeout: Duration,
    ) -> Option<Resolved> {
        if candidates.is_empty() {
            return None;
        }
        let deadline = Instant::now() + timeout;
        let mut pass = 1u32;
        loop {
            if let Some(found) = first_match(page, candidates, deadline).await {
                return Some(found);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "no candidate matched after {} pass(es) in {}ms",
                    pass,
                    timeout.as_millis()
                );
                return None;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            pass += 1;
        }
    }
}

async fn first_match<P: BrowserPage + ?Sized>(
    page: &P,
    candidates: &[LocatorCandidate],
    deadline: Instant,
) -> Option<Resolved> {
    for (index, candidate) in candidates.iter().enumerate() {
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(MIN_PROBE_BUDGET);
        match tokio::time::timeout(budget, page.probe(candidate)).await {
            Ok(Ok(probe)) if probe.count > 0 && probe.visible => match probe.selector {
                Some(selector) => {
                    debug!("matched {} ({} element(s))", candidate, probe.count);
                    return Some(Resolved {
                        index,
                        element: ElementHandle { selector },
                    });
                }
                None => debug!("{} matched but has no addressable path", candidate),
            },
            Ok(Ok(probe)) => debug!(
                "{}: count={}, visible={}",
                candidate, probe.count, probe.visible
            ),
            Ok(Err(e)) => debug!("{} failed: {}", candidate, e),
            Err(_) => debug!("{} timed out", candidate),
        }
    }
    None
}
