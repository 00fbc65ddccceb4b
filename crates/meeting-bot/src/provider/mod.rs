//! Provider strategy pack (C1): per-platform join/admission/removal/leave
//! behavior, driven through the `BrowserPage` seam so real chromiumoxide
//! pages and `FakePage` test doubles share one trait surface. Selectors are
//! pure data; no provider-specific behavior lives outside
//! `TeamsProvider`/`GoogleMeetProvider`.

pub mod google_meet;
pub mod teams;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::browser::{BrowserPage, RecordingOutcome};
use crate::config::BotConfig;
use crate::errors::ProviderError;
use crate::session::ServerUrlSource;

pub use google_meet::GoogleMeetProvider;
pub use teams::TeamsProvider;

const LOBBY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const ADMISSION_PROBE_INTERVAL: Duration = Duration::from_millis(500);
pub const REMOVAL_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Whether the speaker-indicator element is visible while speaking (most
/// providers) or visible while silent (polarity flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    VisibleWhenSpeaking,
    VisibleWhenSilent,
}

impl Polarity {
    #[must_use]
    pub fn inverts_visibility(self) -> bool {
        matches!(self, Polarity::VisibleWhenSilent)
    }
}

/// Pure-data selector table. Each field is a comma-joined CSS selector
/// list so a single probe can check several alternatives at once.
#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub waiting_room: &'static str,
    pub admission_indicator: &'static str,
    pub rejection_indicator: &'static str,
    pub removal_indicator: &'static str,
    pub primary_leave: &'static str,
    pub secondary_leave: &'static str,
    pub participant_container: &'static str,
    pub speaker_indicator: &'static str,
    pub speaking_class: &'static str,
    pub id_attributes: &'static [&'static str],
    pub name_selectors: &'static [&'static str],
    pub speaker_polarity: Polarity,
    pub name_input: &'static str,
    pub mic_toggle: &'static str,
    pub camera_toggle: &'static str,
    pub join_button: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted,
    Rejected { reason: String },
    TimedOut,
}

/// Handle returned by `start_removal_monitor`; holds the background task
/// and lets the controller stop it once the recording race concludes.
pub struct RemovalMonitorHandle {
    task: tokio::task::JoinHandle<()>,
}

impl RemovalMonitorHandle {
    #[must_use]
    pub fn new(task: tokio::task::JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Six operations C6 composes to run one meeting through to completion.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Uppercased tag prepended to reconnect/removal reason tokens, e.g.
    /// `TEAMS_` / `GOOGLE_MEET_`.
    fn reason_prefix(&self) -> &'static str;

    fn selectors(&self) -> &Selectors;

    async fn join(&self, page: &dyn BrowserPage, config: &BotConfig) -> Result<(), ProviderError>;

    async fn wait_for_admission(
        &self,
        page: &dyn BrowserPage,
        timeout: Duration,
        on_lobby_observed: &(dyn Fn() + Send + Sync),
    ) -> Result<AdmissionOutcome, ProviderError>;

    async fn prepare(&self, page: &dyn BrowserPage, config: &BotConfig) -> Result<(), ProviderError>;

    async fn start_recording(
        &self,
        page: &dyn BrowserPage,
        config: &BotConfig,
        registry: &Arc<dyn ServerUrlSource>,
    ) -> Result<RecordingOutcome, ProviderError>;

    async fn start_removal_monitor(
        &self,
        page: std::sync::Arc<dyn BrowserPage>,
        on_removal: tokio::sync::oneshot::Sender<()>,
    ) -> Result<RemovalMonitorHandle, ProviderError>;

    async fn leave(&self, page: &dyn BrowserPage, reason: Option<&str>) -> Result<bool, ProviderError>;
}

/// Shared admission polling loop used by both providers: poll lobby
/// indicators at 2s cadence; on lobby disappearance check rejection first
/// (definitive), then admission (single robust probe).
#[instrument(skip(page, selectors, on_lobby_observed))]
pub(crate) async fn poll_for_admission(
    page: &dyn BrowserPage,
    selectors: &Selectors,
    timeout: Duration,
    on_lobby_observed: &(dyn Fn() + Send + Sync),
) -> Result<AdmissionOutcome, ProviderError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut lobby_reported = false;

    loop {
        if page.is_visible_and_enabled(selectors.admission_indicator).await? && !page.is_visible(selectors.waiting_room).await? {
            return Ok(AdmissionOutcome::Admitted);
        }

        if page.is_visible(selectors.waiting_room).await? {
            if !lobby_reported {
                lobby_reported = true;
                on_lobby_observed();
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(AdmissionOutcome::TimedOut);
            }
            sleep(LOBBY_POLL_INTERVAL.min(remaining(deadline))).await;
            continue;
        }

        if page.is_visible(selectors.rejection_indicator).await? {
            return Ok(AdmissionOutcome::Rejected {
                reason: "rejection indicator observed".to_string(),
            });
        }

        if page.is_visible_and_enabled(selectors.admission_indicator).await? {
            return Ok(AdmissionOutcome::Admitted);
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(AdmissionOutcome::TimedOut);
        }
        sleep(ADMISSION_PROBE_INTERVAL.min(remaining(deadline))).await;
    }
}

fn remaining(deadline: tokio::time::Instant) -> Duration {
    deadline.saturating_duration_since(tokio::time::Instant::now())
}

/// Shared removal polling loop (~1.5s cadence), spawned by
/// `start_removal_monitor`. Fires `on_removal` exactly once, idempotently.
pub(crate) fn spawn_removal_monitor(
    page: std::sync::Arc<dyn BrowserPage>,
    removal_indicator: &'static str,
    on_removal: tokio::sync::oneshot::Sender<()>,
) -> RemovalMonitorHandle {
    let task = tokio::spawn(async move {
        let mut sender = Some(on_removal);
        loop {
            sleep(REMOVAL_POLL_INTERVAL).await;
            match page.is_visible(removal_indicator).await {
                Ok(true) => {
                    if let Some(tx) = sender.take() {
                        let _ = tx.send(());
                    }
                    return;
                }
                Ok(false) => {}
                Err(err) => {
                    debug!(error = %err, "removal probe error, continuing to poll");
                }
            }
        }
    });
    RemovalMonitorHandle::new(task)
}

/// Shared pre-join UX: navigate, fill the display name, mute mic/camera
/// best-effort, click the join control. Fails with
/// `JoinUiUnreachable` only if the name input or join control itself cannot
/// be reached; muting is tolerated to fail silently (no indicator that a
/// provider always renders those toggles).
pub(crate) async fn generic_join(
    selectors: &Selectors,
    page: &dyn BrowserPage,
    config: &BotConfig,
) -> Result<(), ProviderError> {
    let meeting_url = config
        .meeting_url
        .as_deref()
        .ok_or_else(|| ProviderError::Navigation("meeting url missing".to_string()))?;
    page.goto(meeting_url).await?;

    if !page.type_into(selectors.name_input, &config.bot_name).await? {
        return Err(ProviderError::JoinUiUnreachable(format!(
            "name input ({}) not reachable",
            selectors.name_input
        )));
    }

    let _ = page.click(selectors.mic_toggle).await;
    let _ = page.click(selectors.camera_toggle).await;

    if !page.click(selectors.join_button).await? {
        return Err(ProviderError::JoinUiUnreachable(format!(
            "join button ({}) not reachable",
            selectors.join_button
        )));
    }
    Ok(())
}

/// Shared admission wait: delegates straight to `poll_for_admission`, the
/// one piece of this operation that isn't provider-specific.
pub(crate) async fn generic_wait_for_admission(
    selectors: &Selectors,
    page: &dyn BrowserPage,
    timeout: Duration,
    on_lobby_observed: &(dyn Fn() + Send + Sync),
) -> Result<AdmissionOutcome, ProviderError> {
    poll_for_admission(page, selectors, timeout, on_lobby_observed).await
}

/// Shared prepare step: installs the capture/detect/stream bundle (idempotent
/// — `ChromePage::install_bundle` is a no-op to call twice beyond replacing
/// the event receiver) and pushes the selector table into the page so
/// `start_recording`'s `__botStartRecording` call can read it back.
pub(crate) async fn generic_prepare(
    page: &dyn BrowserPage,
    _config: &BotConfig,
) -> Result<(), ProviderError> {
    if let Some(chrome_page) = page.as_chrome_page() {
        chrome_page.install_bundle().await?;
    }
    Ok(())
}

/// Shared recording start: builds the in-page config/selector snapshot and
/// invokes `window.__botStartRecording`, then blocks until the bundle
/// resolves or rejects. When no
/// transcription-server override is configured, the registry is asked for the initial
/// server through `run_recording_with_registry`; an
/// override bypasses the registry entirely, matching `requestServerUrl`'s
/// preference for `config.transcriptionServerUrl` in the bundle.
pub(crate) async fn generic_start_recording(
    selectors: &Selectors,
    reason_prefix: &str,
    page: &dyn BrowserPage,
    config: &BotConfig,
    registry: &Arc<dyn ServerUrlSource>,
) -> Result<RecordingOutcome, ProviderError> {
    let start_script = build_start_recording_script(selectors, reason_prefix, config)?;
    if config.transcription_server_url.is_some() {
        page.run_recording(&start_script).await
    } else {
        page.run_recording_with_registry(&start_script, Arc::clone(registry)).await
    }
}

/// Shared leave: click primary leave, then best-effort secondary
/// confirmation. Returns `false` (not an error) when the primary control is
/// already gone: invoking `leave()` multiple times is safe, and
/// subsequent calls return `false`.
pub(crate) async fn generic_leave(
    selectors: &Selectors,
    page: &dyn BrowserPage,
    _reason: Option<&str>,
) -> Result<bool, ProviderError> {
    let clicked = page.click(selectors.primary_leave).await?;
    if clicked {
        let _ = page.click(selectors.secondary_leave).await;
    }
    Ok(clicked)
}

/// Serializes `selectors`, the relevant `config` fields, and `reason_prefix`
/// into a call to `window.__botStartRecording`, matching the camelCase field
/// names `bundle.js`/`transcription_session.js`/`speaker_detector.js` read
/// (`config.platform`, `config.meetingId`, `selectors.participantContainer`,
/// etc).
fn build_start_recording_script(
    selectors: &Selectors,
    reason_prefix: &str,
    config: &BotConfig,
) -> Result<String, ProviderError> {
    use common::secret::ExposeSecret;

    let selectors_json = serde_json::json!({
        "participantContainer": selectors.participant_container,
        "speakerIndicator": selectors.speaker_indicator,
        "speakingClass": selectors.speaking_class,
        "idAttributes": selectors.id_attributes,
        "nameSelectors": selectors.name_selectors,
        "speakerPolarityInverted": selectors.speaker_polarity.inverts_visibility(),
    });

    let config_json = serde_json::json!({
        "language": config.language,
        "task": config.task,
        "platform": config.platform.as_str(),
        "token": config.token.expose_secret(),
        "meetingId": config.native_meeting_id,
        "meetingUrl": config.meeting_url,
        "transcriptionServerUrl": config.transcription_server_url,
        "startupAloneTimeoutMs": config.automatic_leave.no_one_joined_timeout_ms,
        "everyoneLeftTimeoutMs": config.automatic_leave.everyone_left_timeout_ms,
    });

    let config_str = serde_json::to_string(&config_json)
        .map_err(|e| ProviderError::Browser(format!("config serialization failed: {e}")))?;
    let selectors_str = serde_json::to_string(&selectors_json)
        .map_err(|e| ProviderError::Browser(format!("selector serialization failed: {e}")))?;
    let reason_prefix_str = serde_json::to_string(reason_prefix)
        .map_err(|e| ProviderError::Browser(format!("reason prefix serialization failed: {e}")))?;

    Ok(format!(
        "window.__botStartRecording({config_str}, {selectors_str}, {reason_prefix_str})"
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::browser::page::fake::FakePage;

    #[tokio::test(start_paused = true)]
    async fn poll_for_admission_returns_admitted_immediately() {
        let page = FakePage::new();
        page.set_visible(teams::SELECTORS.admission_indicator, true);
        page.set_enabled(teams::SELECTORS.admission_indicator, true);

        let outcome = poll_for_admission(&page, &teams::SELECTORS, Duration::from_secs(5), &|| {}).await.expect("ok");
        assert_eq!(outcome, AdmissionOutcome::Admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_for_admission_times_out_when_lobby_persists() {
        let page = FakePage::new();
        page.set_visible(teams::SELECTORS.waiting_room, true);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            poll_for_admission(&page, &teams::SELECTORS, Duration::from_millis(10), &|| {}),
        )
        .await
        .expect("completes")
        .expect("ok");
        assert_eq!(result, AdmissionOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_for_admission_detects_rejection_after_lobby() {
        let page = FakePage::new();
        page.set_visible(teams::SELECTORS.waiting_room, false);
        page.set_visible(teams::SELECTORS.rejection_indicator, true);

        let outcome = poll_for_admission(&page, &teams::SELECTORS, Duration::from_secs(5), &|| {}).await.expect("ok");
        assert!(matches!(outcome, AdmissionOutcome::Rejected { .. }));
    }

    #[test]
    fn polarity_invert_only_for_visible_when_silent() {
        assert!(!Polarity::VisibleWhenSpeaking.inverts_visibility());
        assert!(Polarity::VisibleWhenSilent.inverts_visibility());
    }
}
