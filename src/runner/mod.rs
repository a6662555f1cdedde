pub mod executor;

use crate::artifacts::{ArtifactRecorder, RunDir};
use crate::config::{Config, Criticality, ScanPolicy, Step, StepAction, Timing};
use crate::page::BrowserPage;
use crate::print::{CaptureTier, PrintCapture, TransferWatch};
use crate::report::{FailureReason, Outcome, ReportBuilder, RunReport};
use executor::StepExecutor;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One entry of the workflow plan.
#[derive(Debug, Clone)]
pub enum PlannedStep {
    /// A regular locate-and-act step.
    Interact(Step),
    /// The page's own print control. The transfer observer is armed before it runs.
    Print(Step),
    /// Collect the printed document through [`PrintCapture`].
    Capture { name: String, document: String },
}

impl PlannedStep {
    pub fn name(&self) -> &str {
        match self {
            Self::Interact(step) | Self::Print(step) => &step.name,
            Self::Capture { name, .. } => name,
        }
    }
}

/// Runs the wizard plan from start to finish and produces the [`RunReport`].
pub struct WorkflowRunner {
    name: String,
    target_url: String,
    plan: Vec<PlannedStep>,
    executor: StepExecutor,
    print: PrintCapture,
}

impl WorkflowRunner {
    /// Build the fixed wizard sequence from the config's candidate lists.
    pub fn from_config(config: &Config) -> Self {
        let targets = &config.steps;
        let timing = &config.timing;

        let mut disclosures = targets.disclosures.to_step(
            "disclosures-visible",
            StepAction::ScrollIntoView,
            Criticality::Critical,
            timing,
        );
        if disclosures.scan.is_none() {
            disclosures.scan = Some(ScanPolicy::default());
        }

        let plan = vec![
            PlannedStep::Interact(Step::navigate("landing", config.target.url.as_str())),
            PlannedStep::Interact(
                targets
                    .consent
                    .to_step("consent", StepAction::Click, Criticality::BestEffort, timing)
                    .best_effort(),
            ),
            PlannedStep::Interact(targets.confirm_customer.to_step(
                "after-yes",
                StepAction::Click,
                Criticality::Critical,
                timing,
            )),
            PlannedStep::Interact(targets.continue_without_sign_on.to_step(
                "after-continue",
                StepAction::Click,
                Criticality::Critical,
                timing,
            )),
            PlannedStep::Interact(disclosures),
            PlannedStep::Print(targets.print.to_step(
                "after-print-click",
                StepAction::Click,
                Criticality::Critical,
                timing,
            )),
            PlannedStep::Capture {
                name: "document".into(),
                document: config.output.document_name.clone(),
            },
            PlannedStep::Interact(Step::observe("final")),
        ];

        Self::with_plan(&config.name, &config.target.url, plan, timing)
    }

    /// Use an arbitrary plan.
    pub fn with_plan(
        name: &str,
        target_url: &str,
        plan: Vec<PlannedStep>,
        timing: &Timing,
    ) -> Self {
        Self {
            name: name.into(),
            target_url: target_url.into(),
            plan,
            executor: StepExecutor::from_timing(timing),
            print: PrintCapture::new(Duration::from_millis(timing.print_timeout_ms)),
        }
    }

    pub fn plan(&self) -> &[PlannedStep] {
        &self.plan
    }

    /// Execute every planned step in order. Step failures are recorded, never raised;
    /// the returned report has exactly one record per planned step.
    pub async fn execute<P: BrowserPage + ?Sized>(&self, page: &P, dir: RunDir) -> RunReport {
        info!("Running: {} ({} steps)", self.name, self.plan.len());
        let mut report = ReportBuilder::new(&self.name, &self.target_url, dir.path());
        let report_path = dir.report_path();
        let mut recorder = ArtifactRecorder::new(dir);
        let mut watch: Option<TransferWatch> = None;

        for (i, planned) in self.plan.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, self.plan.len(), planned.name());
            let record = match planned {
                PlannedStep::Interact(step) => self.executor.run(step, page, &mut recorder).await,
                PlannedStep::Print(step) => {
                    if watch.is_none() {
                        watch = Some(self.print.arm(page).await);
                    }
                    self.executor.run(step, page, &mut recorder).await
                }
                PlannedStep::Capture { name, document } => {
                    let start = Instant::now();
                    let armed = match watch.take() {
                        Some(armed) => armed,
                        None => self.print.arm(page).await,
                    };
                    let outcome = match self
                        .print
                        .finish(page, &mut recorder, armed, document)
                        .await
                    {
                        Some(captured) => {
                            let outcome = match captured.tier {
                                CaptureTier::Native => Outcome::Succeeded,
                                CaptureTier::Transfer => Outcome::SucceededByFallback(1),
                            };
                            report.document(captured.artifact);
                            outcome
                        }
                        None => Outcome::Skipped(FailureReason::CaptureUnavailable),
                    };
                    self.executor
                        .conclude(name, outcome, page, &mut recorder, start)
                        .await
                }
            };
            report.record(record);
        }

        // A print step without a later capture step.
        if let Some(armed) = watch.take() {
            self.print.release(page, armed).await;
        }

        let report = report.finish();
        if let Err(e) = report.write_json(&report_path) {
            warn!("Failed to write {}: {}", report_path.display(), e);
        }
        info!(
            "Finished: {} steps, {} failed, document: {}",
            report.steps.len(),
            report.failures(),
            report
                .document
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".into())
        );
        report
    }
}
