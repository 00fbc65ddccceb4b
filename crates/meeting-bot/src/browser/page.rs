//! `BrowserPage`: the narrow surface `Provider` implementations drive. Real
//! meeting UIs run behind a `chromiumoxide::Page`; tests drive a
//! `FakePage` instead — a trait seam over a concrete transport type,
//! the same way `ScriptRunner` keeps the registry testable without a
//! live Redis, just sitting at the CDP boundary instead.

use async_trait::async_trait;

use crate::errors::ProviderError;

/// Outcome of the in-page capture/detect/stream pipeline (C2-C4), reported
/// back through the `__bot_recording_resolved` / `__bot_recording_rejected`
/// CDP bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// The pipeline resolved naturally (page unload or explicit leave).
    Resolved,
    /// The pipeline rejected with a tagged reason, e.g.
    /// `TEAMS_BOT_REMOVED_BY_ADMIN` / `..._LEFT_ALONE_TIMEOUT` /
    /// `..._STARTUP_ALONE_TIMEOUT` / an opaque setup error.
    Rejected(String),
}

/// Operations a `Provider` needs from a live page. Selector arguments are
/// CSS selector lists (`Selectors` fields) joined with `,` by callers so a
/// single probe can check several alternatives at once.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigates to `url`.
    async fn goto(&self, url: &str) -> Result<(), ProviderError>;

    /// True if any element matching `selector` is present and visible.
    async fn is_visible(&self, selector: &str) -> Result<bool, ProviderError>;

    /// True if any element matching `selector` is visible and does not
    /// carry `aria-disabled="true"`.
    async fn is_visible_and_enabled(&self, selector: &str) -> Result<bool, ProviderError>;

    /// Clicks the first element matching `selector`. Returns `false` (not
    /// an error) if no element matched, so callers can treat a missing
    /// optional confirmation step as a no-op.
    async fn click(&self, selector: &str) -> Result<bool, ProviderError>;

    /// Types `text` into the first element matching `selector`, clearing
    /// any existing value first. Returns `false` if no element matched.
    async fn type_into(&self, selector: &str, text: &str) -> Result<bool, ProviderError>;

    /// Number of elements currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize, ProviderError>;

    /// Evaluates a page-side script and injects it as the bundle loader;
    /// idempotent by contract — installing the leave action twice has the
    /// same effect as once.
    async fn evaluate(&self, script: &str) -> Result<(), ProviderError>;

    /// Runs `start_script` (a call into `window.__botStartRecording`) and
    /// blocks until the in-page pipeline resolves or rejects. Real pages
    /// drive this off the CDP binding events installed alongside the
    /// bundle; `FakePage` returns a scripted outcome.
    async fn run_recording(&self, start_script: &str) -> Result<RecordingOutcome, ProviderError>;

    /// Like `run_recording`, but first asks `registry` for a transcription
    /// server and keeps reallocating on reconnect failures for the
    /// lifetime of the recording. The default passthrough still performs the
    /// initial allocation — so the registry's "one slot per bot" invariant
    /// holds even against `FakePage` — but drops the URL rather than wiring
    /// it into a real reconnect loop; only a CDP-backed page can do that.
    async fn run_recording_with_registry(
        &self,
        start_script: &str,
        registry: std::sync::Arc<dyn crate::session::ServerUrlSource>,
    ) -> Result<RecordingOutcome, ProviderError> {
        let _ = registry.allocate().await;
        self.run_recording(start_script).await
    }

    /// Escape hatch for the registry-reconnection bridge (`crate::session`),
    /// which needs the CDP binding event stream only a real
    /// `chromiumoxide`-backed page exposes. `FakePage` and any other test
    /// double keep the default `None` — reconnection is exercised at the
    /// registry and JS-bundle layers instead.
    fn as_chrome_page(&self) -> Option<&crate::browser::ChromePage> {
        None
    }
}

#[cfg(any(test, feature = "test-util"))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub mod fake {
    //! In-memory `BrowserPage` used by controller and provider tests to
    //! drive the six literal end-to-end scenarios without a real browser.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{BrowserPage, RecordingOutcome};
    use crate::errors::ProviderError;

    /// Scripted state a test arranges before exercising a provider or the
    /// controller against it.
    pub struct FakePage {
        visible: Mutex<HashMap<String, bool>>,
        enabled: Mutex<HashMap<String, bool>>,
        counts: Mutex<HashMap<String, usize>>,
        clicks: Mutex<Vec<String>>,
        evaluations: Mutex<Vec<String>>,
        recording_outcome: Mutex<RecordingOutcome>,
        recording_delay: Mutex<Option<std::time::Duration>>,
    }

    impl Default for FakePage {
        fn default() -> Self {
            Self {
                visible: Mutex::default(),
                enabled: Mutex::default(),
                counts: Mutex::default(),
                clicks: Mutex::default(),
                evaluations: Mutex::default(),
                recording_outcome: Mutex::new(RecordingOutcome::Resolved),
                recording_delay: Mutex::default(),
            }
        }
    }

    impl FakePage {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_visible(&self, selector: &str, visible: bool) {
            self.visible.lock().expect("visible lock").insert(selector.to_string(), visible);
        }

        pub fn set_enabled(&self, selector: &str, enabled: bool) {
            self.enabled.lock().expect("enabled lock").insert(selector.to_string(), enabled);
        }

        pub fn set_count(&self, selector: &str, count: usize) {
            self.counts.lock().expect("counts lock").insert(selector.to_string(), count);
        }

        #[must_use]
        pub fn clicks(&self) -> Vec<String> {
            self.clicks.lock().expect("clicks lock").clone()
        }

        #[must_use]
        pub fn evaluations(&self) -> Vec<String> {
            self.evaluations.lock().expect("evaluations lock").clone()
        }

        /// Arranges the outcome the next `run_recording` call returns.
        pub fn set_recording_outcome(&self, outcome: RecordingOutcome) {
            *self.recording_outcome.lock().expect("recording outcome lock") = outcome;
        }

        /// Flips `selector` visible after `delay`, for tests that need to
        /// race the removal monitor's poll loop against something else
        /// (e.g. a recording future) rather than having it true from the
        /// start.
        pub fn set_removal_delay(self: &Arc<Self>, delay: std::time::Duration, selector: &'static str) {
            let page = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                page.set_visible(selector, true);
            });
        }

        /// Holds `run_recording` open for `delay` before it resolves, so
        /// tests can arrange for something else (removal, a stop signal) to
        /// win the recording race instead of an instantly-resolving fake.
        pub fn set_recording_delay(&self, delay: std::time::Duration) {
            *self.recording_delay.lock().expect("recording delay lock") = Some(delay);
        }

        /// Checks whether any of the comma-joined alternatives in a
        /// selector list is present in `map`.
        fn any_matches(map: &Mutex<HashMap<String, bool>>, selector_list: &str) -> bool {
            let map = map.lock().expect("selector map lock");
            selector_list
                .split(',')
                .map(str::trim)
                .any(|selector| *map.get(selector).unwrap_or(&false))
        }
    }

    #[async_trait]
    impl BrowserPage for FakePage {
        async fn goto(&self, _url: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn is_visible(&self, selector: &str) -> Result<bool, ProviderError> {
            Ok(Self::any_matches(&self.visible, selector))
        }

        async fn is_visible_and_enabled(&self, selector: &str) -> Result<bool, ProviderError> {
            let visible = Self::any_matches(&self.visible, selector);
            let enabled = Self::any_matches(&self.enabled, selector);
            Ok(visible && enabled)
        }

        async fn click(&self, selector: &str) -> Result<bool, ProviderError> {
            self.clicks.lock().expect("clicks lock").push(selector.to_string());
            let counts = self.counts.lock().expect("counts lock");
            Ok(selector
                .split(',')
                .map(str::trim)
                .any(|s| *counts.get(s).unwrap_or(&1) > 0))
        }

        async fn type_into(&self, selector: &str, _text: &str) -> Result<bool, ProviderError> {
            Ok(self.is_visible(selector).await?)
        }

        async fn count(&self, selector: &str) -> Result<usize, ProviderError> {
            let counts = self.counts.lock().expect("counts lock");
            Ok(selector
                .split(',')
                .map(str::trim)
                .map(|s| *counts.get(s).unwrap_or(&0))
                .max()
                .unwrap_or(0))
        }

        async fn evaluate(&self, script: &str) -> Result<(), ProviderError> {
            self.evaluations.lock().expect("evaluations lock").push(script.to_string());
            Ok(())
        }

        async fn run_recording(&self, start_script: &str) -> Result<RecordingOutcome, ProviderError> {
            self.evaluations.lock().expect("evaluations lock").push(start_script.to_string());
            let delay = *self.recording_delay.lock().expect("recording delay lock");
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.recording_outcome.lock().expect("recording outcome lock").clone())
        }
    }
}
