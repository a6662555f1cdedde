//! # eoka-capture
//!
//! Walks a fixed multi-page web wizard, prints the disclosures document it ends on and
//! keeps a screenshot of every step. Steps locate their targets through an ordered list
//! of locator candidates, and failures are recorded in the run report instead of
//! aborting the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_capture::{Config, RunDir, Session, WorkflowRunner};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_capture::Result<()> {
//! let config = Config::load("configs/disclosures.yaml")?;
//! let dir = RunDir::create(&config.output.root)?;
//! let session = Session::launch(&config.browser).await?;
//!
//! let report = WorkflowRunner::from_config(&config)
//!     .execute(session.page(), dir)
//!     .await;
//! println!("document: {:?}", report.document);
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod artifacts;
mod config;
mod locator;
mod page;
mod print;
mod report;
mod runner;
mod session;
mod stabilize;

pub use artifacts::{Artifact, ArtifactKind, ArtifactRecorder, RunDir};
pub use config::{
    BrowserConfig, Config, Criticality, LocatorCandidate, OutputConfig, ScanPolicy, Step,
    StepAction, TargetSpec, TargetUrl, Timing, Viewport, WorkflowTargets,
};
pub use locator::{LocatorResolver, Resolved};
pub use page::{BrowserPage, ElementHandle, Probe, Transfer};
pub use print::{CaptureTier, Captured, PrintCapture, TransferWatch};
pub use report::{FailureReason, Outcome, RunReport, StepRecord};
pub use runner::{executor::StepExecutor, PlannedStep, WorkflowRunner};
pub use session::Session;
pub use stabilize::{await_stable, Settled, StabilizationWaiter};

/// Result type for eoka-capture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading config, driving the page or writing artifacts.
///
/// Only config and session errors reach the caller of a run; everything raised while
/// executing steps is folded into the [`RunReport`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("page script error: {0}")]
    Script(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("document already saved to {}", .0.display())]
    DocumentExists(std::path::PathBuf),

    #[error("not supported: {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  confirm_customer:
    candidates:
      - css: "#yes"
  continue_without_sign_on:
    candidates:
      - text: "Continue"
  disclosures:
    candidates:
      - text: "Important Disclosures"
  print:
    candidates:
      - role: button
        name: "Print"
"##;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.name, "Test");
        assert_eq!(config.target.url, "https://example.com");
        assert!(config.browser.headless);
        assert!(config.steps.consent.candidates.is_empty());
        assert_eq!(config.steps.print.candidates.len(), 1);
    }

    #[test]
    fn test_default_values() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.timing.locate_ms, 5_000);
        assert_eq!(config.timing.network_idle_ms, 10_000);
        assert_eq!(config.timing.load_ms, 20_000);
        assert_eq!(config.timing.settle_pause_ms, 1_000);
        assert_eq!(config.timing.click_delay_ms, 50);
        assert_eq!(config.output.root, std::path::PathBuf::from("outputs"));
        assert_eq!(config.output.document_name, "important-disclosures");
        assert!(config.steps.disclosures.scan.is_none());
    }

    #[test]
    fn test_parse_candidate_forms() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  confirm_customer:
    candidates:
      - css: "[data-automation='are-you-customer-yes']"
      - role: button
        name: "Yes"
      - role: radio
      - label: "Yes"
      - label: "Yes"
        within: "fieldset span"
      - text: "Yes"
      - "Yes please"
  continue_without_sign_on:
    candidates: ["Continue without signing on"]
  disclosures:
    candidates: ["Important Disclosures"]
  print:
    candidates: ["Print"]
"##;
        let config = Config::parse(yaml).unwrap();
        let c = &config.steps.confirm_customer.candidates;
        assert_eq!(c.len(), 7);
        assert_eq!(
            c[0],
            LocatorCandidate::css("[data-automation='are-you-customer-yes']")
        );
        assert_eq!(c[1], LocatorCandidate::role("button", Some("Yes")));
        assert_eq!(c[2], LocatorCandidate::role("radio", None));
        assert_eq!(c[3], LocatorCandidate::label("Yes"));
        assert_eq!(
            c[4],
            LocatorCandidate::Label {
                text: "Yes".into(),
                within: Some("fieldset span".into()),
            }
        );
        assert_eq!(c[5], LocatorCandidate::text("Yes"));
        assert_eq!(c[6], LocatorCandidate::text("Yes please"));
    }

    #[test]
    fn test_parse_rejects_ambiguous_candidate() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  confirm_customer:
    candidates:
      - css: "#yes"
        text: "Yes"
  continue_without_sign_on:
    candidates: ["Continue"]
  disclosures:
    candidates: ["Disclosures"]
  print:
    candidates: ["Print"]
"##;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("exactly one of"), "{}", err);
    }

    #[test]
    fn test_parse_rejects_name_without_role() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  confirm_customer:
    candidates:
      - text: "Yes"
        name: "Yes"
  continue_without_sign_on:
    candidates: ["Continue"]
  disclosures:
    candidates: ["Disclosures"]
  print:
    candidates: ["Print"]
"##;
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn test_parse_target_overrides() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  consent:
    name: "cookie-banner"
    timeout_ms: 1500
    candidates:
      - role: button
        name: "Accept"
  confirm_customer:
    criticality: best_effort
    candidates: ["Yes"]
  continue_without_sign_on:
    candidates: ["Continue"]
  disclosures:
    candidates: ["Important Disclosures"]
    scan:
      attempts: 4
      pause_ms: 250
  print:
    candidates: ["Print"]
"##;
        let config = Config::parse(yaml).unwrap();
        let consent = &config.steps.consent;
        assert_eq!(consent.name.as_deref(), Some("cookie-banner"));
        assert_eq!(consent.timeout_ms, Some(1500));
        assert_eq!(
            config.steps.confirm_customer.criticality,
            Some(Criticality::BestEffort)
        );
        let scan = config.steps.disclosures.scan.as_ref().unwrap();
        assert_eq!(scan.attempts, 4);
        assert_eq!(scan.pause_ms, 250);
        assert_eq!(scan.wheel_px, 1200); // default
    }

    #[test]
    fn test_parse_browser_config() {
        let yaml = r##"
name: "Test"
browser:
  headless: false
  proxy: "http://localhost:8080"
  viewport:
    width: 1400
    height: 900
target:
  url: "https://example.com"
steps:
  confirm_customer:
    candidates: ["Yes"]
  continue_without_sign_on:
    candidates: ["Continue"]
  disclosures:
    candidates: ["Disclosures"]
  print:
    candidates: ["Print"]
"##;
        let config = Config::parse(yaml).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.proxy, Some("http://localhost:8080".into()));
        let viewport = config.browser.viewport.unwrap();
        assert_eq!(viewport.width, 1400);
        assert_eq!(viewport.height, 900);
    }

    #[test]
    fn test_validation_missing_url() {
        let yaml = MINIMAL.replace("https://example.com", "");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("target.url"));
    }

    #[test]
    fn test_validation_empty_name() {
        let yaml = MINIMAL.replace("name: \"Test\"", "name: \"\"");
        assert!(Config::parse(&yaml).is_err());
    }

    #[test]
    fn test_validation_required_target_without_candidates() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  confirm_customer:
    candidates: []
  continue_without_sign_on:
    candidates: ["Continue"]
  disclosures:
    candidates: ["Disclosures"]
  print:
    candidates: ["Print"]
"##;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("confirm_customer"), "{}", err);
    }

    #[test]
    fn test_validation_document_name_with_separator() {
        let yaml = format!(
            "{}\noutput:\n  document_name: \"../escape\"\n",
            MINIMAL.trim_end()
        );
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("document_name"), "{}", err);
    }

    #[test]
    fn test_load_example_config() {
        let config = Config::load("configs/disclosures.yaml").unwrap();
        assert_eq!(config.name, "Business credit card disclosures");
        assert!(config.target.url.starts_with("https://"));
        assert!(!config.steps.consent.candidates.is_empty());
        assert!(config.steps.disclosures.scan.is_some());
    }
}
