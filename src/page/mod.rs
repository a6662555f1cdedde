//! The seam between the step engine and a live browser page.

mod cdp;
#[cfg(test)]
pub(crate) mod fake;

use crate::config::LocatorCandidate;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// What a single locator candidate currently matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Probe {
    /// Number of matching elements.
    pub count: usize,
    /// Whether the first match is rendered and not hidden.
    pub visible: bool,
    /// Unique CSS path to the first match.
    pub selector: Option<String>,
}

/// A located element, addressed by a CSS path computed at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
}

/// A file the page handed over on its own (download link, blob window, attachment).
#[derive(Debug, Clone)]
pub struct Transfer {
    pub suggested_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Everything the engine needs from a browser page.
///
/// Futures are not `Send`: one page is driven by one task, strictly sequentially.
#[async_trait(?Send)]
pub trait BrowserPage {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Resolve once the network has been quiet, or fail after `timeout`.
    async fn wait_network_idle(&self, timeout: Duration) -> Result<()>;

    /// Resolve once the document has finished loading, or fail after `timeout`.
    async fn wait_loaded(&self, timeout: Duration) -> Result<()>;

    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Count matches for a candidate and report on the first one.
    async fn probe(&self, candidate: &LocatorCandidate) -> Result<Probe>;

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()>;

    /// Click with a short human-like delay before the press.
    async fn click_element(&self, element: &ElementHandle, delay: Duration) -> Result<()>;

    /// Scroll the viewport vertically by `dy` pixels.
    async fn scroll_page(&self, dy: i32) -> Result<()>;

    /// PNG bytes of the full page, beyond the viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>>;

    /// Whether the engine can render the current page to a paged document itself.
    fn supports_native_print(&self) -> bool {
        false
    }

    async fn emulate_print_media(&self) -> Result<()> {
        Err(Error::Unsupported("print media emulation"))
    }

    async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        Err(Error::Unsupported("native print to pdf"))
    }

    /// Start buffering files the page hands over.
    async fn watch_transfers(&self) -> Result<()>;

    /// Latest buffered transfer, if any.
    async fn take_transfer(&self) -> Result<Option<Transfer>>;

    /// Stop buffering and restore the page. Safe to call when nothing is registered.
    async fn unwatch_transfers(&self) -> Result<()>;
}
