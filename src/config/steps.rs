use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// One way of finding an element on the page.
///
/// A target is described by an ordered list of candidates; the first candidate that
/// yields a visible match wins, so lists go from most to least specific.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocatorCandidate {
    /// `css: "..."` - exact CSS selector.
    Selector(String),
    /// `role: button` with optional `name: "Yes"` - ARIA role (explicit or implicit),
    /// filtered by a case-insensitive substring of the accessible name.
    Role { role: String, name: Option<String> },
    /// `text: "..."` - innermost element whose normalized text contains the fragment.
    Text(String),
    /// `label: "..."` - `<label>` elements (or the `within` selector) containing the text.
    Label { text: String, within: Option<String> },
}

impl LocatorCandidate {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Self::Role {
            role: role.into(),
            name: name.map(Into::into),
        }
    }

    pub fn text(fragment: impl Into<String>) -> Self {
        Self::Text(fragment.into())
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::Label {
            text: text.into(),
            within: None,
        }
    }

    /// Strategy name, as used in config keys and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Selector(_) => "css",
            Self::Role { .. } => "role",
            Self::Text(_) => "text",
            Self::Label { .. } => "label",
        }
    }
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(s) => write!(f, "css '{}'", s),
            Self::Role { role, name: None } => write!(f, "role '{}'", role),
            Self::Role {
                role,
                name: Some(n),
            } => write!(f, "role '{}' named '{}'", role, n),
            Self::Text(t) => write!(f, "text '{}'", t),
            Self::Label { text, within: None } => write!(f, "label '{}'", text),
            Self::Label {
                text,
                within: Some(w),
            } => write!(f, "'{}' containing '{}'", w, text),
        }
    }
}

const CANDIDATE_KEYS: &[&str] = &["css", "role", "text", "label"];

impl<'de> Deserialize<'de> for LocatorCandidate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CandidateVisitor)
    }
}

struct CandidateVisitor;

impl<'de> Visitor<'de> for CandidateVisitor {
    type Value = LocatorCandidate;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a text fragment, or a map with one of css, role, text or label")
    }

    // A bare string is a text-contains candidate.
    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(LocatorCandidate::text(value))
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut primary: Option<(String, String)> = None;
        let mut name = None;
        let mut within = None;

        while let Some((key, value)) = map.next_entry::<String, String>()? {
            match key.as_str() {
                "css" | "role" | "text" | "label" => {
                    if let Some((prev, _)) = &primary {
                        return Err(de::Error::custom(format!(
                            "candidate must have exactly one of css, role, text, label (got '{}' and '{}')",
                            prev, key
                        )));
                    }
                    primary = Some((key, value));
                }
                "name" => name = Some(value),
                "within" => within = Some(value),
                other => {
                    return Err(de::Error::unknown_field(
                        other,
                        &["css", "role", "text", "label", "name", "within"],
                    ))
                }
            }
        }

        let (key, value) = primary.ok_or_else(|| {
            de::Error::custom("candidate must have exactly one of css, role, text, label")
        })?;

        if name.is_some() && key != "role" {
            return Err(de::Error::custom("'name' is only valid with 'role'"));
        }
        if within.is_some() && key != "label" {
            return Err(de::Error::custom("'within' is only valid with 'label'"));
        }

        Ok(match key.as_str() {
            "css" => LocatorCandidate::Selector(value),
            "role" => LocatorCandidate::Role { role: value, name },
            "text" => LocatorCandidate::Text(value),
            "label" => LocatorCandidate::Label {
                text: value,
                within,
            },
            other => return Err(de::Error::unknown_variant(other, CANDIDATE_KEYS)),
        })
    }
}

/// Whether a step that cannot find its target counts as a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    #[default]
    Critical,
    BestEffort,
}

/// What a step does once its target is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Scroll the element into view, then click it.
    Click,
    /// Only make the element visible.
    ScrollIntoView,
    /// Nothing beyond locating; with no candidates the step just records evidence.
    None,
    /// Load a URL. Has no locator candidates.
    Navigate(String),
}

fn default_scan_attempts() -> u32 {
    10
}
fn default_wheel_px() -> i32 {
    1200
}
fn default_scan_pause_ms() -> u64 {
    500
}

/// Bounded scroll-and-recheck for targets that render lazily further down the page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanPolicy {
    #[serde(default = "default_scan_attempts")]
    pub attempts: u32,
    #[serde(default = "default_wheel_px")]
    pub wheel_px: i32,
    #[serde(default = "default_scan_pause_ms")]
    pub pause_ms: u64,
}

impl ScanPolicy {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            attempts: default_scan_attempts(),
            wheel_px: default_wheel_px(),
            pause_ms: default_scan_pause_ms(),
        }
    }
}

/// A single unit of the workflow.
#[derive(Debug, Clone)]
pub struct Step {
    /// Used for logs and for the screenshot file name.
    pub name: String,
    pub candidates: Vec<LocatorCandidate>,
    pub action: StepAction,
    pub criticality: Criticality,
    /// How long resolution may poll before giving up.
    pub timeout: Duration,
    pub scan: Option<ScanPolicy>,
}

impl Step {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    fn new(name: impl Into<String>, action: StepAction, candidates: Vec<LocatorCandidate>) -> Self {
        Self {
            name: name.into(),
            candidates,
            action,
            criticality: Criticality::Critical,
            timeout: Self::DEFAULT_TIMEOUT,
            scan: None,
        }
    }

    pub fn click(name: impl Into<String>, candidates: Vec<LocatorCandidate>) -> Self {
        Self::new(name, StepAction::Click, candidates)
    }

    pub fn scroll_to(name: impl Into<String>, candidates: Vec<LocatorCandidate>) -> Self {
        Self::new(name, StepAction::ScrollIntoView, candidates)
    }

    pub fn navigate(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, StepAction::Navigate(url.into()), Vec::new())
    }

    /// Evidence-only step: no target, just stabilization and a screenshot.
    pub fn observe(name: impl Into<String>) -> Self {
        Self::new(name, StepAction::None, Vec::new())
    }

    pub fn best_effort(mut self) -> Self {
        self.criticality = Criticality::BestEffort;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scan(mut self, scan: ScanPolicy) -> Self {
        self.scan = Some(scan);
        self
    }
}
