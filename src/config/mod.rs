pub mod schema;
pub mod steps;

pub use schema::{
    BrowserConfig, Config, OutputConfig, TargetSpec, TargetUrl, Timing, Viewport, WorkflowTargets,
};
pub use steps::{Criticality, LocatorCandidate, ScanPolicy, Step, StepAction};
