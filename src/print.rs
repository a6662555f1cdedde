//! Two-tier capture of the printed document.
//!
//! Tier one asks the page to render itself to a PDF (only where the engine supports
//! it). Tier two reads whatever file the page's own print control handed over, which
//! requires the transfer observer to be armed *before* that control is clicked.

use crate::artifacts::{Artifact, ArtifactRecorder};
use crate::page::BrowserPage;
use crate::report::FailureReason;
use crate::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTier {
    Native,
    Transfer,
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub tier: CaptureTier,
    pub artifact: Artifact,
}

/// An armed transfer observer. Hand it back to [`PrintCapture::finish`] or
/// [`PrintCapture::release`] so the page hooks are removed.
#[must_use = "an armed observer must be finished or released"]
#[derive(Debug)]
pub struct TransferWatch {
    observing: bool,
}

#[derive(Debug, Clone)]
pub struct PrintCapture {
    native_timeout: Duration,
}

impl PrintCapture {
    pub fn new(native_timeout: Duration) -> Self {
        Self { native_timeout }
    }

    /// Register the transfer observer.
    pub async fn arm<P: BrowserPage + ?Sized>(&self, page: &P) -> TransferWatch {
        match page.watch_transfers().await {
            Ok(()) => {
                debug!("transfer observer armed");
                TransferWatch { observing: true }
            }
            Err(e) => {
                warn!("transfer observer unavailable: {}", e);
                TransferWatch { observing: false }
            }
        }
    }

    /// Arm and finish in one go, for pages whose print action already ran or needs none.
    pub async fn capture<P: BrowserPage + ?Sized>(
        &self,
        page: &P,
        recorder: &mut ArtifactRecorder,
        output_name: &str,
    ) -> Option<Captured> {
        let watch = self.arm(page).await;
        self.finish(page, recorder, watch, output_name).await
    }

    /// Try native generation, then the observer's buffer. The observer is deregistered
    /// exactly once whichever way this ends.
    pub async fn finish<P: BrowserPage + ?Sized>(
        &self,
        page: &P,
        recorder: &mut ArtifactRecorder,
        watch: TransferWatch,
        output_name: &str,
    ) -> Option<Captured> {
        let captured = self.try_tiers(page, recorder, &watch, output_name).await;
        self.release(page, watch).await;
        match &captured {
            Some(c) => info!("document captured via {:?} tier", c.tier),
            None => warn!(
                "{}: no document for '{}', screenshots remain as evidence",
                FailureReason::CaptureUnavailable,
                output_name
            ),
        }
        captured
    }

    /// Deregister without capturing.
    pub async fn release<P: BrowserPage + ?Sized>(&self, page: &P, watch: TransferWatch) {
        let TransferWatch { observing } = watch;
        if let Err(e) = page.unwatch_transfers().await {
            warn!("failed to remove transfer observer (armed: {}): {}", observing, e);
        }
    }

    async fn try_tiers<P: BrowserPage + ?Sized>(
        &self,
        page: &P,
        recorder: &mut ArtifactRecorder,
        watch: &TransferWatch,
        output_name: &str,
    ) -> Option<Captured> {
        if page.supports_native_print() {
            match tokio::time::timeout(self.native_timeout, render_native(page)).await {
                Ok(Ok(pdf)) => match recorder.save_document(output_name, &pdf) {
                    Ok(artifact) => {
                        return Some(Captured {
                            tier: CaptureTier::Native,
                            artifact,
                        })
                    }
                    Err(e) => warn!("failed to save native document: {}", e),
                },
                Ok(Err(e)) => warn!("native print failed: {}", e),
                Err(_) => warn!(
                    "native print timed out after {}ms",
                    self.native_timeout.as_millis()
                ),
            }
        } else {
            debug!("page has no native print support");
        }

        if !watch.observing {
            return None;
        }
        match page.take_transfer().await {
            Ok(Some(transfer)) => {
                debug!(
                    "transfer observed: {:?} ({} bytes)",
                    transfer.suggested_name,
                    transfer.bytes.len()
                );
                match recorder.save_document(output_name, &transfer.bytes) {
                    Ok(artifact) => Some(Captured {
                        tier: CaptureTier::Transfer,
                        artifact,
                    }),
                    Err(e) => {
                        warn!("failed to save transferred document: {}", e);
                        None
                    }
                }
            }
            Ok(None) => {
                debug!("no transfer observed");
                None
            }
            Err(e) => {
                warn!("reading transfer failed: {}", e);
                None
            }
        }
    }
}

async fn render_native<P: BrowserPage + ?Sized>(page: &P) -> Result<Vec<u8>> {
    page.emulate_print_media().await?;
    page.print_to_pdf().await
}
