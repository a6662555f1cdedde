//! Run directory layout and artifact writing.

use crate::page::BrowserPage;
use crate::{Error, Result};
use chrono::{Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    PrintedDocument,
}

/// A file written during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub path: PathBuf,
}

/// `{root}/screenshots/` and `{root}/downloads/` for one run.
#[derive(Debug, Clone)]
pub struct RunDir {
    root: PathBuf,
}

impl RunDir {
    /// Create a fresh `{output_root}/{YYYYmmdd-HHMMSS}` directory.
    pub fn create(output_root: impl AsRef<Path>) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::at(output_root.as_ref().join(stamp))
    }

    /// Use `root` as the run directory, creating the layout under it.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let dir = Self { root: root.into() };
        std::fs::create_dir_all(dir.screenshots())?;
        std::fs::create_dir_all(dir.downloads())?;
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn screenshots(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join("report.json")
    }
}

/// Writes screenshots (append-only) and at most one printed document.
pub struct ArtifactRecorder {
    dir: RunDir,
    last_ms: u64,
    document: Option<PathBuf>,
}

impl ArtifactRecorder {
    pub fn new(dir: RunDir) -> Self {
        Self {
            dir,
            last_ms: 0,
            document: None,
        }
    }

    pub fn dir(&self) -> &RunDir {
        &self.dir
    }

    /// Wall-clock milliseconds, bumped so consecutive artifacts never share a stamp.
    fn next_timestamp(&mut self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.last_ms = now.max(self.last_ms + 1);
        self.last_ms
    }

    /// Save a screenshot as `screenshots/{epoch-ms}-{name}.png`.
    pub async fn screenshot<P: BrowserPage + ?Sized>(
        &mut self,
        page: &P,
        name: &str,
    ) -> Result<Artifact> {
        let png = page.capture_screenshot().await?;
        let timestamp_ms = self.next_timestamp();
        let path = self
            .dir
            .screenshots()
            .join(format!("{}-{}.png", timestamp_ms, file_stem(name)));
        std::fs::write(&path, png)?;
        info!("screenshot: {}", path.display());
        Ok(Artifact {
            kind: ArtifactKind::Screenshot,
            name: name.into(),
            timestamp_ms,
            path,
        })
    }

    /// Save the printed document as `downloads/{name}.pdf`. Only one per run.
    pub fn save_document(&mut self, name: &str, bytes: &[u8]) -> Result<Artifact> {
        if let Some(ref existing) = self.document {
            return Err(Error::DocumentExists(existing.clone()));
        }
        let path = self.dir.downloads().join(format!("{}.pdf", file_stem(name)));
        std::fs::write(&path, bytes)?;
        info!("document: {} ({} bytes)", path.display(), bytes.len());
        self.document = Some(path.clone());
        Ok(Artifact {
            kind: ArtifactKind::PrintedDocument,
            name: name.into(),
            timestamp_ms: self.next_timestamp(),
            path,
        })
    }
}

/// Keep names filesystem-safe: anything outside `[A-Za-z0-9_-]` becomes `-`.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if stem.is_empty() {
        "artifact".into()
    } else {
        stem
    }
}
