//! Scripted in-memory page for engine tests.

use super::{BrowserPage, ElementHandle, Probe, Transfer};
use crate::config::LocatorCandidate;
use crate::{Error, Result};
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Navigate(String),
    Probe(LocatorCandidate),
    ScrollIntoView(String),
    Click(String),
    ScrollPage(i32),
    Pause(Duration),
    Screenshot,
    EmulatePrint,
    Print,
    Watch,
    Take,
    Unwatch,
}

#[derive(Debug, Clone)]
struct FakeMatch {
    selector: String,
    count: usize,
    visible: bool,
    /// Absent until the page has been scrolled this many times.
    after_scrolls: u32,
    broken: bool,
}

#[derive(Default)]
pub(crate) struct FakePage {
    matches: HashMap<LocatorCandidate, FakeMatch>,
    network_idle_delay: Duration,
    load_delay: Duration,
    network_idle_fails: bool,
    load_fails: bool,
    navigate_error: Option<String>,
    click_errors: HashMap<String, String>,
    screenshot_fails: bool,
    native_pdf: Option<Vec<u8>>,
    native_print_fails: bool,
    native_print_delay: Duration,
    transfer: Option<Vec<u8>>,
    scrolls: Cell<u32>,
    calls: RefCell<Vec<Call>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, candidate: LocatorCandidate, m: FakeMatch) -> Self {
        self.matches.insert(candidate, m);
        self
    }

    /// One visible element for `candidate`.
    pub fn with_match(self, candidate: LocatorCandidate, selector: &str) -> Self {
        self.insert(
            candidate,
            FakeMatch {
                selector: selector.into(),
                count: 1,
                visible: true,
                after_scrolls: 0,
                broken: false,
            },
        )
    }

    /// Present in the DOM but not visible.
    pub fn with_hidden(self, candidate: LocatorCandidate, selector: &str) -> Self {
        self.insert(
            candidate,
            FakeMatch {
                selector: selector.into(),
                count: 1,
                visible: false,
                after_scrolls: 0,
                broken: false,
            },
        )
    }

    /// Probing this candidate errors, like a query the page cannot evaluate.
    pub fn with_broken(self, candidate: LocatorCandidate) -> Self {
        self.insert(
            candidate,
            FakeMatch {
                selector: String::new(),
                count: 0,
                visible: false,
                after_scrolls: 0,
                broken: true,
            },
        )
    }

    /// Rendered only after `scrolls` page scrolls.
    pub fn with_lazy(self, candidate: LocatorCandidate, selector: &str, scrolls: u32) -> Self {
        self.insert(
            candidate,
            FakeMatch {
                selector: selector.into(),
                count: 1,
                visible: true,
                after_scrolls: scrolls,
                broken: false,
            },
        )
    }

    pub fn with_network_idle_after(mut self, delay: Duration) -> Self {
        self.network_idle_delay = delay;
        self
    }

    pub fn with_load_after(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// The idle wait errors right away instead of timing out.
    pub fn with_network_idle_error(mut self) -> Self {
        self.network_idle_fails = true;
        self
    }

    pub fn with_load_error(mut self) -> Self {
        self.load_fails = true;
        self
    }

    pub fn with_navigate_error(mut self, message: &str) -> Self {
        self.navigate_error = Some(message.into());
        self
    }

    pub fn with_click_error(mut self, selector: &str, message: &str) -> Self {
        self.click_errors.insert(selector.into(), message.into());
        self
    }

    pub fn with_screenshot_failure(mut self) -> Self {
        self.screenshot_fails = true;
        self
    }

    pub fn with_native_print(mut self, pdf: &[u8]) -> Self {
        self.native_pdf = Some(pdf.to_vec());
        self
    }

    /// Claims native print support but every render fails.
    pub fn with_native_print_failure(mut self) -> Self {
        self.native_print_fails = true;
        self
    }

    /// Native render succeeds, after `delay`.
    pub fn with_slow_native_print(mut self, pdf: &[u8], delay: Duration) -> Self {
        self.native_pdf = Some(pdf.to_vec());
        self.native_print_delay = delay;
        self
    }

    pub fn with_transfer(mut self, bytes: &[u8]) -> Self {
        self.transfer = Some(bytes.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn probed(&self) -> Vec<LocatorCandidate> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Probe(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Click(selector) => Some(selector.clone()),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

#[async_trait(?Send)]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.log(Call::Navigate(url.into()));
        match &self.navigate_error {
            Some(message) => Err(Error::ActionFailed(message.clone())),
            None => Ok(()),
        }
    }

    async fn wait_network_idle(&self, _timeout: Duration) -> Result<()> {
        if self.network_idle_fails {
            return Err(Error::Script("network tracking unavailable".into()));
        }
        tokio::time::sleep(self.network_idle_delay).await;
        Ok(())
    }

    async fn wait_loaded(&self, _timeout: Duration) -> Result<()> {
        if self.load_fails {
            return Err(Error::Script("document.readyState unreadable".into()));
        }
        tokio::time::sleep(self.load_delay).await;
        Ok(())
    }

    async fn pause(&self, duration: Duration) {
        self.log(Call::Pause(duration));
    }

    async fn probe(&self, candidate: &LocatorCandidate) -> Result<Probe> {
        self.log(Call::Probe(candidate.clone()));
        let Some(m) = self.matches.get(candidate) else {
            return Ok(Probe::default());
        };
        if m.broken {
            return Err(Error::Script(format!("cannot evaluate {}", candidate)));
        }
        if self.scrolls.get() < m.after_scrolls {
            return Ok(Probe::default());
        }
        Ok(Probe {
            count: m.count,
            visible: m.visible,
            selector: Some(m.selector.clone()),
        })
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.log(Call::ScrollIntoView(element.selector.clone()));
        Ok(())
    }

    async fn click_element(&self, element: &ElementHandle, _delay: Duration) -> Result<()> {
        self.log(Call::Click(element.selector.clone()));
        match self.click_errors.get(&element.selector) {
            Some(message) => Err(Error::ActionFailed(message.clone())),
            None => Ok(()),
        }
    }

    async fn scroll_page(&self, dy: i32) -> Result<()> {
        self.log(Call::ScrollPage(dy));
        self.scrolls.set(self.scrolls.get() + 1);
        Ok(())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        self.log(Call::Screenshot);
        if self.screenshot_fails {
            return Err(Error::ActionFailed("screenshot refused".into()));
        }
        Ok(b"\x89PNG fake".to_vec())
    }

    fn supports_native_print(&self) -> bool {
        self.native_pdf.is_some() || self.native_print_fails
    }

    async fn emulate_print_media(&self) -> Result<()> {
        self.log(Call::EmulatePrint);
        Ok(())
    }

    async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        self.log(Call::Print);
        tokio::time::sleep(self.native_print_delay).await;
        if self.native_print_fails {
            return Err(Error::Script("Printing failed".into()));
        }
        self.native_pdf
            .clone()
            .ok_or(Error::Unsupported("native print to pdf"))
    }

    async fn watch_transfers(&self) -> Result<()> {
        self.log(Call::Watch);
        Ok(())
    }

    async fn take_transfer(&self) -> Result<Option<Transfer>> {
        self.log(Call::Take);
        Ok(self.transfer.clone().map(|bytes| Transfer {
            suggested_name: Some("statement.pdf".into()),
            bytes,
        }))
    }

    async fn unwatch_transfers(&self) -> Result<()> {
        self.log(Call::Unwatch);
        Ok(())
    }
}
