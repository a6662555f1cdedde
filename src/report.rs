//! Per-step outcomes and the run report.

use crate::artifacts::{Artifact, ArtifactKind};
use crate::stabilize::Settled;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a step did not fully succeed. Recovered locally, never raised to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// No locator candidate matched within the timeout.
    NotFound,
    /// The element was found but interacting with it failed.
    ActionFailed(String),
    /// No stabilization tier could be observed. Informational.
    StabilizationDegraded,
    /// Neither print capture tier produced a document.
    CaptureUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::ActionFailed(e) => write!(f, "action failed: {}", e),
            Self::StabilizationDegraded => f.write_str("stabilization degraded"),
            Self::CaptureUnavailable => f.write_str("capture unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// Succeeded through the candidate at this index (> 0).
    SucceededByFallback(usize),
    Skipped(FailureReason),
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::SucceededByFallback(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::SucceededByFallback(i) => write!(f, "succeeded via candidate {}", i),
            Self::Skipped(r) => write!(f, "skipped ({})", r),
            Self::Failed(r) => write!(f, "failed ({})", r),
        }
    }
}

/// What happened in one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: Outcome,
    pub settled: Settled,
    /// Absent only if the browser refused the screenshot.
    pub screenshot: Option<Artifact>,
    pub elapsed_ms: u64,
}

/// Final, immutable account of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub target_url: String,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One record per executed step, in execution order.
    pub steps: Vec<StepRecord>,
    /// Every artifact written, in the order it was written.
    pub artifacts: Vec<Artifact>,
    pub document: Option<PathBuf>,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.steps.iter().map(|s| &s.outcome)
    }

    pub fn screenshots(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Screenshot)
    }

    pub fn failures(&self) -> usize {
        self.outcomes().filter(|o| o.is_failure()).count()
    }

    /// True when no step ended in `Failed`.
    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Accumulates the report while the run is in progress.
pub(crate) struct ReportBuilder {
    name: String,
    target_url: String,
    output_dir: PathBuf,
    started_at: DateTime<Utc>,
    steps: Vec<StepRecord>,
    artifacts: Vec<Artifact>,
    document: Option<PathBuf>,
}

impl ReportBuilder {
    pub fn new(name: &str, target_url: &str, output_dir: &Path) -> Self {
        Self {
            name: name.into(),
            target_url: target_url.into(),
            output_dir: output_dir.to_path_buf(),
            started_at: Utc::now(),
            steps: Vec::new(),
            artifacts: Vec::new(),
            document: None,
        }
    }

    pub fn document(&mut self, artifact: Artifact) {
        self.document = Some(artifact.path.clone());
        self.artifacts.push(artifact);
    }

    pub fn record(&mut self, step: StepRecord) {
        if let Some(ref shot) = step.screenshot {
            self.artifacts.push(shot.clone());
        }
        self.steps.push(step);
    }

    pub fn finish(self) -> RunReport {
        RunReport {
            name: self.name,
            target_url: self.target_url,
            output_dir: self.output_dir,
            started_at: self.started_at,
            finished_at: Utc::now(),
            steps: self.steps,
            artifacts: self.artifacts,
            document: self.document,
        }
    }
}
