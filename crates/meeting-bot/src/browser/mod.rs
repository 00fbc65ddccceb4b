//! Browser automation layer: the CDP-backed `Page` driver, the injected
//! capture/detect/stream bundle (C2-C4), and the CDP bindings the bundle
//! calls back into the host through.

pub mod bindings;
pub mod page;
pub mod scripts;

use std::sync::Arc;

use chromiumoxide::Page;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, instrument, warn};

use crate::errors::ProviderError;
pub use bindings::BindingEvent;
pub use page::{BrowserPage, RecordingOutcome};

/// Real `BrowserPage` backed by a `chromiumoxide::Page`. Owns the receiving
/// end of the CDP binding channel once `install_bundle` has run, so
/// `run_recording` can drain it until the pipeline settles.
#[derive(Clone)]
pub struct ChromePage {
    page: Page,
    events: Arc<Mutex<Option<mpsc::UnboundedReceiver<BindingEvent>>>>,
}

impl ChromePage {
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self {
            page,
            events: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Installs the CDP bindings and injects the capture/detect/stream
    /// bundle; idempotent, matching the leave-action install contract.
    #[instrument(skip(self))]
    pub async fn install_bundle(&self) -> Result<(), ProviderError> {
        let rx = install_bundle(&self.page).await?;
        *self.events.lock().await = Some(rx);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), ProviderError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ProviderError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, ProviderError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({selector:?}); return !!el && el.offsetParent !== null; }})()",
            selector = selector
        );
        eval_bool(&self.page, &script).await
    }

    async fn is_visible_and_enabled(&self, selector: &str) -> Result<bool, ProviderError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({selector:?}); return !!el && el.offsetParent !== null && el.getAttribute('aria-disabled') !== 'true'; }})()",
            selector = selector
        );
        eval_bool(&self.page, &script).await
    }

    async fn click(&self, selector: &str) -> Result<bool, ProviderError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({selector:?}); if (el) {{ el.click(); return true; }} return false; }})()",
            selector = selector
        );
        eval_bool(&self.page, &script).await
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<bool, ProviderError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({selector:?}); if (el) {{ el.value = {text:?}; el.dispatchEvent(new Event('input', {{bubbles: true}})); return true; }} return false; }})()",
            selector = selector,
            text = text
        );
        eval_bool(&self.page, &script).await
    }

    async fn count(&self, selector: &str) -> Result<usize, ProviderError> {
        let script = format!(
            "document.querySelectorAll({selector:?}).length",
            selector = selector
        );
        let value: i64 = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?
            .into_value()
            .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?;
        Ok(usize::try_from(value).unwrap_or(0))
    }

    async fn evaluate(&self, script: &str) -> Result<(), ProviderError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?;
        Ok(())
    }

    async fn run_recording(&self, start_script: &str) -> Result<RecordingOutcome, ProviderError> {
        self.page
            .evaluate(start_script)
            .await
            .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?;

        let mut guard = self.events.lock().await;
        let rx = guard
            .as_mut()
            .ok_or_else(|| ProviderError::Browser("bundle not installed before start_recording".to_string()))?;

        loop {
            match rx.recv().await {
                Some(BindingEvent::RecordingResolved) => return Ok(RecordingOutcome::Resolved),
                Some(BindingEvent::RecordingRejected(reason)) => return Ok(RecordingOutcome::Rejected(reason)),
                Some(BindingEvent::Log { .. } | BindingEvent::Speaker(_) | BindingEvent::ParticipantCount(_)) => {
                    continue;
                }
                None => {
                    debug!("binding channel closed before recording settled");
                    return Ok(RecordingOutcome::Resolved);
                }
            }
        }
    }

    async fn run_recording_with_registry(
        &self,
        start_script: &str,
        registry: Arc<dyn crate::session::ServerUrlSource>,
    ) -> Result<RecordingOutcome, ProviderError> {
        self.run_recording_with_registry(start_script, registry).await
    }

    fn as_chrome_page(&self) -> Option<&ChromePage> {
        Some(self)
    }
}

/// Prefix a `__bot_log` message carries when the page's stubborn/simple
/// reconnect logic fails a server URL and needs the host to allocate the
/// next one (`crate::session::ServerUrlSource`). Kept alongside the JS
/// source of truth (`bundle.js`'s `bridge.failServerUrl`) so the two sides
/// can't drift independently.
pub const RECONNECT_FAILURE_LOG_PREFIX: &str = "reconnect: failing server ";

/// Extracts the failed server URL from a `tag: "bundle"` log message, if
/// it is a reconnect-failure notification.
#[must_use]
pub fn parse_reconnect_failure(tag: &str, message: &str) -> Option<String> {
    if tag != "bundle" {
        return None;
    }
    message
        .strip_prefix(RECONNECT_FAILURE_LOG_PREFIX)
        .map(str::to_string)
}

impl ChromePage {
    /// Like `run_recording`, but also bridges the page's server requests to
    /// the shared server registry (C5): allocates an initial server before
    /// the bundle connects, pushes it in as `window.__botServerUrlHint`,
    /// and whenever the bundle logs that it failed a server, allocates the
    /// next candidate via `source` and pushes that in too. CDP bindings
    /// here are one-directional page->host, so the host pushes the next URL
    /// rather than the page pulling it synchronously.
    #[instrument(skip(self, source))]
    pub async fn run_recording_with_registry(
        &self,
        start_script: &str,
        source: Arc<dyn crate::session::ServerUrlSource>,
    ) -> Result<RecordingOutcome, ProviderError> {
        if let Some(initial_url) = source.allocate().await {
            self.push_server_url_hint(&initial_url).await?;
        } else {
            warn!("no transcription server available at startup, bundle will poll for one");
        }

        self.page
            .evaluate(start_script)
            .await
            .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?;

        let mut guard = self.events.lock().await;
        let rx = guard
            .as_mut()
            .ok_or_else(|| ProviderError::Browser("bundle not installed before start_recording".to_string()))?;

        loop {
            match rx.recv().await {
                Some(BindingEvent::RecordingResolved) => return Ok(RecordingOutcome::Resolved),
                Some(BindingEvent::RecordingRejected(reason)) => return Ok(RecordingOutcome::Rejected(reason)),
                Some(BindingEvent::Log { tag, message, .. }) => {
                    if let Some(failed_url) = parse_reconnect_failure(&tag, &message) {
                        debug!(failed_url = %failed_url, "bundle reported reconnect failure, reallocating");
                        if let Some(next_url) = source.fail(&failed_url).await {
                            if let Err(err) = self.push_server_url_hint(&next_url).await {
                                warn!(error = %err, "failed to push reallocated server url hint into page");
                            }
                        }
                    }
                }
                Some(BindingEvent::Speaker(_) | BindingEvent::ParticipantCount(_)) => continue,
                None => {
                    debug!("binding channel closed before recording settled");
                    return Ok(RecordingOutcome::Resolved);
                }
            }
        }
    }

    async fn push_server_url_hint(&self, url: &str) -> Result<(), ProviderError> {
        let hint_script = format!(
            "window.__botServerUrlHint = {url};",
            url = serde_json::to_string(url).unwrap_or_else(|_| "null".to_string())
        );
        self.page
            .evaluate(hint_script)
            .await
            .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?;
        Ok(())
    }
}

async fn eval_bool(page: &Page, script: &str) -> Result<bool, ProviderError> {
    page.evaluate(script)
        .await
        .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))?
        .into_value()
        .map_err(|e| ProviderError::ScriptEvaluation(e.to_string()))
}

/// Installs the CDP bindings and injects the capture/detect/stream bundle.
/// Tries a trusted-types-scoped `evaluate_on_new_document` first; falls
/// back to a blob-URL injection if the page's script-trust policy rejects
/// the direct inline evaluation.
#[instrument(skip(page))]
pub async fn install_bundle(page: &Page) -> Result<mpsc::UnboundedReceiver<BindingEvent>, ProviderError> {
    let (tx, rx) = bindings::channel();

    for name in bindings::ALL_BINDINGS {
        let tx = tx.clone();
        page.expose_function(name, move |payload: String| {
            if let Some(event) = bindings::decode(name, &payload) {
                let _ = tx.send(event);
            }
        })
        .await
        .map_err(|e| ProviderError::Browser(format!("expose_function({name}) failed: {e}")))?;
    }

    // `evaluate_on_new_document` only re-runs the bundle across future
    // navigations/reloads; the meeting UI the bundle depends on (live media
    // elements, participant containers) exists only in the page already
    // navigated to by `join()`, so the bundle must also run immediately.
    let bundle = scripts::bundle();
    match page.evaluate_on_new_document(bundle.clone()).await {
        Ok(_) => {}
        Err(err) if err.to_string().to_lowercase().contains("trust") => {
            warn!("trusted-types policy rejected inline injection, falling back to blob-url");
        }
        Err(err) => return Err(ProviderError::Browser(err.to_string())),
    }

    match page.evaluate(bundle.clone()).await {
        Ok(_) => {}
        Err(err) if err.to_string().to_lowercase().contains("trust") => {
            warn!("trusted-types policy rejected inline injection, falling back to blob-url");
            inject_via_blob_url(page, &bundle).await?;
        }
        Err(err) => return Err(ProviderError::Browser(err.to_string())),
    }

    Ok(rx)
}

async fn inject_via_blob_url(page: &Page, bundle: &str) -> Result<(), ProviderError> {
    let escaped = serde_json::to_string(bundle)
        .map_err(|e| ProviderError::Browser(format!("bundle serialization failed: {e}")))?;
    let loader = format!(
        "(() => {{ const blob = new Blob([{escaped}], {{type: 'text/javascript'}}); \
         const url = URL.createObjectURL(blob); \
         const script = document.createElement('script'); \
         script.src = url; document.documentElement.appendChild(script); }})()",
    );
    page.evaluate(loader)
        .await
        .map_err(|e| ProviderError::Browser(format!("blob-url injection failed: {e}")))?;
    Ok(())
}
