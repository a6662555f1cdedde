//! `BrowserPage` for a live eoka page. Matching and scrolling run as injected JS;
//! printing, full-page screenshots and download capture go through raw CDP commands
//! on the page's session.

use super::{BrowserPage, ElementHandle, Probe, Transfer};
use crate::config::LocatorCandidate;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use eoka::Page;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Idle window passed to eoka's network-idle wait.
const NETWORK_IDLE_MS: u64 = 500;

const READY_POLL_MS: u64 = 100;

/// Settle time after a scroll so the screenshot does not catch the page mid-animation.
const SCROLL_SETTLE_MS: u64 = 200;

/// How long `take_transfer` waits for an in-flight browser download to finish.
const DOWNLOAD_WAIT_MS: u64 = 5_000;

/// Suffix Chrome uses while a download is still being written.
const PARTIAL_SUFFIX: &str = ".crdownload";

/// A4, in inches.
const PAPER_WIDTH_IN: f64 = 8.27;
const PAPER_HEIGHT_IN: f64 = 11.69;

/// Evaluate one candidate. Called as `PROBE_JS(kind, value, extra)`.
const PROBE_JS: &str = r#"
((kind, value, extra) => {
    const norm = s => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();

    function visible(el) {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'
            && parseFloat(s.opacity || '1') > 0;
    }

    function selector(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            path.unshift(s);
            n = p;
        }
        return path.join(' > ');
    }

    const ROLES = {
        button: 'button, input[type="button"], input[type="submit"], input[type="reset"], [role="button"]',
        link: 'a[href], [role="link"]',
        heading: 'h1, h2, h3, h4, h5, h6, [role="heading"]',
        radio: 'input[type="radio"], [role="radio"]',
        checkbox: 'input[type="checkbox"], [role="checkbox"]',
        textbox: 'input:not([type]), input[type="text"], input[type="email"], textarea, [role="textbox"]',
        dialog: 'dialog, [role="dialog"], [role="alertdialog"]',
    };

    function accessibleName(el) {
        const aria = el.getAttribute('aria-label');
        if (aria) return aria;
        const by = el.getAttribute('aria-labelledby');
        if (by) {
            const t = by.split(/\s+/).map(id => document.getElementById(id)?.textContent || '').join(' ');
            if (t.trim()) return t;
        }
        if (el.labels && el.labels.length) return [...el.labels].map(l => l.textContent).join(' ');
        return el.innerText || el.textContent || el.value || el.title || '';
    }

    function innermostContaining(fragment) {
        const needle = norm(fragment);
        const skip = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD']);
        const hits = [];
        const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT);
        while (walker.nextNode()) {
            const el = walker.currentNode;
            if (skip.has(el.tagName) || !norm(el.textContent).includes(needle)) continue;
            if (![...el.children].some(c => norm(c.textContent).includes(needle))) hits.push(el);
        }
        return hits;
    }

    let found;
    try {
        switch (kind) {
            case 'css':
                found = [...document.querySelectorAll(value)];
                break;
            case 'role':
                found = [...document.querySelectorAll(ROLES[value] || '[role="' + CSS.escape(value) + '"]')];
                if (extra) found = found.filter(el => norm(accessibleName(el)).includes(norm(extra)));
                break;
            case 'text':
                found = innermostContaining(value);
                break;
            case 'label':
                found = [...document.querySelectorAll(extra || 'label')]
                    .filter(el => norm(el.textContent).includes(norm(value)));
                break;
            default:
                return { count: 0, visible: false, selector: null, error: 'unknown strategy ' + kind };
        }
    } catch (e) {
        return { count: 0, visible: false, selector: null, error: String(e) };
    }
    if (!found.length) return { count: 0, visible: false, selector: null };
    return { count: found.length, visible: visible(found[0]), selector: selector(found[0]) };
})
"#;

/// Hooks the ways a page hands over a generated file: object URLs, download anchors
/// (attached or detached) and `window.open` of blob/data URLs. Blob bytes are read
/// eagerly so a later synchronous read can return them.
const WATCH_JS: &str = r#"(() => {
    if (window.__eokaTransfers) return true;
    const state = { items: [], blobs: new Map(), restore: [] };
    const remember = (url, name) => {
        if (!url) return;
        url = String(url);
        if (!state.items.some(i => i.url === url)) state.items.push({ url, name: name || null });
    };

    const origCreate = URL.createObjectURL;
    URL.createObjectURL = function (obj) {
        const url = origCreate.apply(this, arguments);
        if (obj instanceof Blob) {
            const entry = { type: obj.type, data: null };
            state.blobs.set(url, entry);
            const reader = new FileReader();
            reader.onload = () => { entry.data = String(reader.result).split(',')[1] || ''; };
            reader.readAsDataURL(obj);
        }
        return url;
    };
    state.restore.push(() => { URL.createObjectURL = origCreate; });

    const isTransfer = a => a.hasAttribute('download') || (a.href || '').startsWith('blob:');
    const onClick = ev => {
        const a = ev.target && ev.target.closest ? ev.target.closest('a[href]') : null;
        if (a && isTransfer(a)) remember(a.href, a.getAttribute('download'));
    };
    document.addEventListener('click', onClick, true);
    state.restore.push(() => document.removeEventListener('click', onClick, true));

    const origAnchorClick = HTMLAnchorElement.prototype.click;
    HTMLAnchorElement.prototype.click = function () {
        if (isTransfer(this)) remember(this.href, this.getAttribute('download'));
        return origAnchorClick.apply(this, arguments);
    };
    state.restore.push(() => { HTMLAnchorElement.prototype.click = origAnchorClick; });

    const origOpen = window.open;
    window.open = function (url) {
        const u = String(url || '');
        if (u.startsWith('blob:') || u.startsWith('data:application/pdf')) remember(u, null);
        return origOpen.apply(this, arguments);
    };
    state.restore.push(() => { window.open = origOpen; });

    window.__eokaTransfers = state;
    return true;
})()"#;

/// Newest buffered transfer as base64. Always returns an object: evaluate rejects `null`.
const TAKE_JS: &str = r#"(() => {
    const none = { found: false };
    const state = window.__eokaTransfers;
    if (!state) return none;
    const fromData = (url) => {
        const comma = url.indexOf(',');
        const meta = url.slice(5, comma);
        const body = url.slice(comma + 1);
        return meta.endsWith(';base64') ? body : btoa(unescape(encodeURIComponent(decodeURIComponent(body))));
    };
    const fetchSync = (url) => {
        const xhr = new XMLHttpRequest();
        xhr.open('GET', url, false);
        xhr.overrideMimeType('text/plain; charset=x-user-defined');
        xhr.send();
        if (xhr.status < 200 || xhr.status >= 300) return null;
        const raw = xhr.responseText;
        let bin = '';
        for (let i = 0; i < raw.length; i++) bin += String.fromCharCode(raw.charCodeAt(i) & 0xff);
        return btoa(bin);
    };
    for (let i = state.items.length - 1; i >= 0; i--) {
        const item = state.items[i];
        try {
            if (item.url.startsWith('data:')) {
                return { found: true, name: item.name, data: fromData(item.url) };
            }
            const blob = state.blobs.get(item.url);
            if (blob) {
                if (blob.data !== null) return { found: true, name: item.name, data: blob.data };
                continue;
            }
            const data = fetchSync(item.url);
            if (data !== null) return { found: true, name: item.name, data };
        } catch (e) {}
    }
    for (const blob of [...state.blobs.values()].reverse()) {
        if (blob.type === 'application/pdf' && blob.data !== null) {
            return { found: true, name: null, data: blob.data };
        }
    }
    return none;
})()"#;

const UNWATCH_JS: &str = r#"(() => {
    const state = window.__eokaTransfers;
    if (!state) return false;
    for (const undo of state.restore) { try { undo(); } catch (e) {} }
    delete window.__eokaTransfers;
    return true;
})()"#;

#[derive(Deserialize)]
struct RawProbe {
    count: usize,
    visible: bool,
    selector: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawTransfer {
    found: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

/// Reply of `Page.printToPDF` and `Page.captureScreenshot`.
#[derive(Deserialize)]
struct DataReply {
    data: String,
}

#[derive(Deserialize)]
struct Size {
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutMetrics {
    css_content_size: Option<Size>,
    content_size: Option<Size>,
}

fn decode_base64(data: &str, what: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| Error::Decode(format!("{} is not valid base64: {}", what, e)))
}

/// What the download staging directory currently holds.
#[derive(Debug, PartialEq, Eq)]
enum Staged {
    Empty,
    /// Only partially written files.
    Pending,
    Complete(PathBuf),
}

/// Newest completed file in `dir`. A missing directory counts as empty.
fn newest_download(dir: &Path) -> std::io::Result<Staged> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Staged::Empty),
        Err(e) => return Err(e),
    };
    let mut pending = false;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let path = entry.path();
        if path.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
            pending = true;
            continue;
        }
        let modified = meta.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    Ok(match newest {
        Some((_, path)) => Staged::Complete(path),
        None if pending => Staged::Pending,
        None => Staged::Empty,
    })
}

/// Per-page directory the browser saves downloads into while a watch is armed.
fn staging_dir(page: &Page) -> PathBuf {
    std::env::temp_dir().join(format!("eoka-capture-{}", page.session().target_id()))
}

/// `Browser.setDownloadBehavior` is not routed on every page session; the deprecated
/// page-level command takes the same parameters.
async fn set_download_behavior(page: &Page, params: Value) -> Result<()> {
    let session = page.session();
    if let Err(e) = session
        .send::<_, Value>("Browser.setDownloadBehavior", &params)
        .await
    {
        debug!("Browser.setDownloadBehavior failed, trying page level: {}", e);
        session
            .send::<_, Value>("Page.setDownloadBehavior", &params)
            .await?;
    }
    Ok(())
}

/// Wait for the newest finished download in the staging directory.
async fn take_download(page: &Page) -> Result<Option<Transfer>> {
    let dir = staging_dir(page);
    let start = Instant::now();
    loop {
        match newest_download(&dir)? {
            Staged::Complete(path) => {
                let bytes = std::fs::read(&path)?;
                debug!("download: {} ({} bytes)", path.display(), bytes.len());
                return Ok(Some(Transfer {
                    suggested_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
                    bytes,
                }));
            }
            Staged::Empty => return Ok(None),
            Staged::Pending if start.elapsed() >= Duration::from_millis(DOWNLOAD_WAIT_MS) => {
                debug!("download still in progress after {}ms", DOWNLOAD_WAIT_MS);
                return Ok(None);
            }
            Staged::Pending => page.wait(READY_POLL_MS).await,
        }
    }
}

/// JSON string literal for splicing a value into a script.
fn js_str(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn js_opt(s: Option<&str>) -> String {
    s.map(js_str).unwrap_or_else(|| "null".into())
}

fn probe_script(candidate: &LocatorCandidate) -> String {
    let (value, extra) = match candidate {
        LocatorCandidate::Selector(s) => (s.as_str(), None),
        LocatorCandidate::Role { role, name } => (role.as_str(), name.as_deref()),
        LocatorCandidate::Text(t) => (t.as_str(), None),
        LocatorCandidate::Label { text, within } => (text.as_str(), within.as_deref()),
    };
    format!(
        "{}({},{},{})",
        PROBE_JS,
        js_str(candidate.kind()),
        js_str(value),
        js_opt(extra)
    )
}

#[async_trait(?Send)]
impl BrowserPage for Page {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("goto: {}", url);
        Page::goto(self, url).await?;
        Ok(())
    }

    async fn wait_network_idle(&self, timeout: Duration) -> Result<()> {
        Page::wait_for_network_idle(self, NETWORK_IDLE_MS, timeout.as_millis() as u64).await?;
        Ok(())
    }

    async fn wait_loaded(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            let state: String = self.evaluate("document.readyState").await?;
            if state == "complete" {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(Error::Timeout(format!(
                    "document still '{}' after {}ms",
                    state,
                    timeout.as_millis()
                )));
            }
            self.wait(READY_POLL_MS).await;
        }
    }

    async fn pause(&self, duration: Duration) {
        self.wait(duration.as_millis() as u64).await;
    }

    async fn probe(&self, candidate: &LocatorCandidate) -> Result<Probe> {
        let raw: RawProbe = self.evaluate(&probe_script(candidate)).await?;
        if let Some(error) = raw.error {
            return Err(Error::Script(format!("{}: {}", candidate, error)));
        }
        Ok(Probe {
            count: raw.count,
            visible: raw.visible,
            selector: raw.selector,
        })
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        let js = format!(
            "document.querySelector({})?.scrollIntoView({{behavior:'smooth',block:'center'}})",
            js_str(&element.selector)
        );
        self.execute(&js).await?;
        self.wait(SCROLL_SETTLE_MS).await;
        Ok(())
    }

    async fn click_element(&self, element: &ElementHandle, delay: Duration) -> Result<()> {
        self.wait(delay.as_millis() as u64).await;
        self.human_click(&element.selector).await?;
        Ok(())
    }

    async fn scroll_page(&self, dy: i32) -> Result<()> {
        self.execute(&format!("window.scrollBy(0, {dy})")).await?;
        Ok(())
    }

    /// Whole document, not just the viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        let metrics: LayoutMetrics = match self
            .session()
            .send("Page.getLayoutMetrics", &json!({}))
            .await
        {
            Ok(metrics) => metrics,
            Err(e) => {
                debug!("layout metrics unavailable, capturing viewport: {}", e);
                return Ok(Page::screenshot(self).await?);
            }
        };
        let Some(size) = metrics.css_content_size.or(metrics.content_size) else {
            return Ok(Page::screenshot(self).await?);
        };
        let reply: DataReply = self
            .session()
            .send(
                "Page.captureScreenshot",
                &json!({
                    "format": "png",
                    "captureBeyondViewport": true,
                    "clip": {
                        "x": 0,
                        "y": 0,
                        "width": size.width.ceil(),
                        "height": size.height.ceil(),
                        "scale": 1
                    }
                }),
            )
            .await?;
        decode_base64(&reply.data, "screenshot")
    }

    fn supports_native_print(&self) -> bool {
        true
    }

    async fn emulate_print_media(&self) -> Result<()> {
        self.session()
            .send::<_, Value>("Emulation.setEmulatedMedia", &json!({ "media": "print" }))
            .await?;
        Ok(())
    }

    async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        let reply: Result<DataReply> = self
            .session()
            .send(
                "Page.printToPDF",
                &json!({
                    "printBackground": true,
                    "paperWidth": PAPER_WIDTH_IN,
                    "paperHeight": PAPER_HEIGHT_IN
                }),
            )
            .await
            .map_err(Error::from);
        // Back to screen media for the remaining screenshots.
        if let Err(e) = self
            .session()
            .send::<_, Value>("Emulation.setEmulatedMedia", &json!({ "media": "" }))
            .await
        {
            debug!("failed to reset emulated media: {}", e);
        }
        decode_base64(&reply?.data, "printed document")
    }

    /// Hooks the page's own hand-over paths and also routes real browser downloads into
    /// a staging directory. Fails only if neither could be installed.
    async fn watch_transfers(&self) -> Result<()> {
        let dir = staging_dir(self);
        let downloads = match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                set_download_behavior(
                    self,
                    json!({
                        "behavior": "allow",
                        "downloadPath": dir.to_string_lossy()
                    }),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };
        let hooks = match self.evaluate::<bool>(WATCH_JS).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Script("transfer observer did not install".into())),
            Err(e) => Err(e.into()),
        };
        match (downloads, hooks) {
            (Err(d), Err(h)) => Err(Error::Script(format!(
                "no transfer observer: downloads: {}; page hooks: {}",
                d, h
            ))),
            (d, h) => {
                if let Err(e) = d {
                    debug!("download staging unavailable: {}", e);
                }
                if let Err(e) = h {
                    debug!("page hooks unavailable: {}", e);
                }
                Ok(())
            }
        }
    }

    async fn take_transfer(&self) -> Result<Option<Transfer>> {
        match self.evaluate::<RawTransfer>(TAKE_JS).await {
            Ok(RawTransfer {
                found: true,
                name,
                data: Some(data),
            }) => {
                return Ok(Some(Transfer {
                    suggested_name: name,
                    bytes: decode_base64(&data, "transfer")?,
                }))
            }
            Ok(_) => {}
            // The page may have navigated away, which also removes the hooks.
            Err(e) => debug!("page hooks unreadable: {}", e),
        }
        take_download(self).await
    }

    async fn unwatch_transfers(&self) -> Result<()> {
        match self.evaluate::<bool>(UNWATCH_JS).await {
            Ok(true) => {}
            Ok(false) => debug!("transfer observer was already gone (page navigated?)"),
            Err(e) => debug!("failed to remove page hooks: {}", e),
        }
        set_download_behavior(self, json!({ "behavior": "default" })).await?;
        let dir = staging_dir(self);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_script_quotes_arguments() {
        let js = probe_script(&LocatorCandidate::css("a[title=\"x\"]"));
        assert!(js.ends_with(r#"("css","a[title=\"x\"]",null)"#), "{}", js);

        let js = probe_script(&LocatorCandidate::role("button", Some("Yes")));
        assert!(js.ends_with(r#"("role","button","Yes")"#), "{}", js);

        let js = probe_script(&LocatorCandidate::Label {
            text: "Yes".into(),
            within: Some("fieldset span".into()),
        });
        assert!(js.ends_with(r#"("label","Yes","fieldset span")"#), "{}", js);
    }

    #[test]
    fn js_opt_renders_null() {
        assert_eq!(js_opt(None), "null");
        assert_eq!(js_opt(Some("it's")), r#""it's""#);
    }

    #[test]
    fn take_script_never_returns_null() {
        assert!(!TAKE_JS.contains("return null"));
        let raw: RawTransfer = serde_json::from_str(r#"{"found":false}"#).unwrap();
        assert!(!raw.found);
        assert!(raw.data.is_none());
    }

    #[test]
    fn layout_metrics_prefer_css_size() {
        let metrics: LayoutMetrics = serde_json::from_str(
            r#"{"contentSize":{"x":0,"y":0,"width":2800,"height":9000},
                "cssContentSize":{"x":0,"y":0,"width":1400,"height":4500}}"#,
        )
        .unwrap();
        let size = metrics.css_content_size.or(metrics.content_size).unwrap();
        assert_eq!((size.width, size.height), (1400.0, 4500.0));
    }

    #[test]
    fn staged_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        assert_eq!(newest_download(&missing).unwrap(), Staged::Empty);
        assert_eq!(newest_download(tmp.path()).unwrap(), Staged::Empty);

        std::fs::write(tmp.path().join("a.pdf.crdownload"), b"%PD").unwrap();
        assert_eq!(newest_download(tmp.path()).unwrap(), Staged::Pending);

        let done = tmp.path().join("disclosures.pdf");
        std::fs::write(&done, b"%PDF-1.4").unwrap();
        assert_eq!(newest_download(tmp.path()).unwrap(), Staged::Complete(done));
    }

    #[test]
    fn decode_reports_bad_base64() {
        assert_eq!(decode_base64("JVBERg==", "doc").unwrap(), b"%PDF");
        let err = decode_base64("***", "doc").unwrap_err();
        assert!(err.to_string().contains("doc is not valid base64"), "{}", err);
    }
}
