use crate::artifacts::ArtifactRecorder;
use crate::config::{Criticality, Step, StepAction, Timing};
use crate::locator::{LocatorResolver, Resolved};
use crate::page::BrowserPage;
use crate::report::{FailureReason, Outcome, StepRecord};
use crate::stabilize::StabilizationWaiter;
use crate::Error;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs one step: locate, act, settle, screenshot. Never returns an error; every way a
/// step can go wrong ends up in its [`Outcome`].
#[derive(Debug, Clone)]
pub struct StepExecutor {
    resolver: LocatorResolver,
    waiter: StabilizationWaiter,
    click_delay: Duration,
}

impl StepExecutor {
    pub fn new(
        resolver: LocatorResolver,
        waiter: StabilizationWaiter,
        click_delay: Duration,
    ) -> Self {
        Self {
            resolver,
            waiter,
            click_delay,
        }
    }

    pub fn from_timing(timing: &Timing) -> Self {
        Self::new(
            LocatorResolver::new(Duration::from_millis(timing.poll_ms)),
            StabilizationWaiter::from_timing(timing),
            Duration::from_millis(timing.click_delay_ms),
        )
    }

    /// Execute `step` and record its evidence.
    pub async fn run<P: BrowserPage + ?Sized>(
        &self,
        step: &Step,
        page: &P,
        recorder: &mut ArtifactRecorder,
    ) -> StepRecord {
        let start = Instant::now();
        info!("Step '{}'", step.name);
        let outcome = self.perform(step, page).await;
        self.conclude(&step.name, outcome, page, recorder, start).await
    }

    /// Settle the page and take the step's screenshot. Shared with steps whose outcome
    /// is decided elsewhere, such as document capture.
    pub(crate) async fn conclude<P: BrowserPage + ?Sized>(
        &self,
        name: &str,
        outcome: Outcome,
        page: &P,
        recorder: &mut ArtifactRecorder,
        start: Instant,
    ) -> StepRecord {
        let settled = self.waiter.await_stable(page).await;
        let screenshot = match recorder.screenshot(page, name).await {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!("Step '{}': screenshot failed: {}", name, e);
                None
            }
        };

        match &outcome {
            Outcome::Failed(reason) => warn!("Step '{}' failed: {}", name, reason),
            Outcome::Skipped(reason) => info!("Step '{}' skipped: {}", name, reason),
            other => info!("Step '{}' {}", name, other),
        }

        StepRecord {
            name: name.to_string(),
            outcome,
            settled,
            screenshot,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn perform<P: BrowserPage + ?Sized>(&self, step: &Step, page: &P) -> Outcome {
        if let StepAction::Navigate(ref url) = step.action {
            info!("Navigating to: {}", url);
            return match page.navigate(url).await {
                Ok(()) => Outcome::Succeeded,
                Err(e) => action_failed(e),
            };
        }
        if step.action == StepAction::None && step.candidates.is_empty() {
            return Outcome::Succeeded;
        }

        let Some(found) = self.locate(step, page).await else {
            return match step.criticality {
                Criticality::BestEffort => Outcome::Skipped(FailureReason::NotFound),
                Criticality::Critical => Outcome::Failed(FailureReason::NotFound),
            };
        };
        debug!(
            "Step '{}': resolved via {} -> {}",
            step.name, step.candidates[found.index], found.element.selector
        );

        if let Err(e) = page.scroll_into_view(&found.element).await {
            return action_failed(e);
        }
        if step.action == StepAction::Click {
            if let Err(e) = page.click_element(&found.element, self.click_delay).await {
                return action_failed(e);
            }
        }

        match found.index {
            0 => Outcome::Succeeded,
            i => Outcome::SucceededByFallback(i),
        }
    }

    async fn locate<P: BrowserPage + ?Sized>(&self, step: &Step, page: &P) -> Option<Resolved> {
        if let Some(found) = self
            .resolver
            .resolve(page, &step.candidates, step.timeout)
            .await
        {
            return Some(found);
        }
        let scan = step.scan.as_ref()?;

        for attempt in 1..=scan.attempts {
            debug!(
                "Step '{}': scan {}/{} ({}px)",
                step.name, attempt, scan.attempts, scan.wheel_px
            );
            if let Err(e) = page.scroll_page(scan.wheel_px).await {
                debug!("scroll failed: {}", e);
            }
            page.pause(scan.pause()).await;
            if let Some(found) = self
                .resolver
                .resolve(page, &step.candidates, Duration::ZERO)
                .await
            {
                return Some(found);
            }
        }
        None
    }
}

/// An interaction error as a step outcome, without repeating the "action failed" prefix.
fn action_failed(e: Error) -> Outcome {
    let detail = match e {
        Error::ActionFailed(message) => message,
        other => other.to_string(),
    };
    Outcome::Failed(FailureReason::ActionFailed(detail))
}
