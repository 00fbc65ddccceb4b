//! Google Meet strategy: selector table plus thin wiring over the shared
//! `generic_*` helpers in the parent module. The platform asymmetry lives
//! here: Meet's voice-level ring is visible
//! while the participant is silent and hides while speaking, the inverse of
//! Teams — encoded as `Polarity::VisibleWhenSilent`, never hardcoded in the
//! detector.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{
    generic_join, generic_leave, generic_prepare, generic_start_recording, generic_wait_for_admission,
    spawn_removal_monitor, AdmissionOutcome, Polarity, Provider, RemovalMonitorHandle, Selectors,
};
use crate::browser::{BrowserPage, RecordingOutcome};
use crate::config::BotConfig;
use crate::errors::ProviderError;

pub const SELECTORS: Selectors = Selectors {
    waiting_room: "[jsname='r4nke'], div[aria-label*='waiting for the host']",
    admission_indicator: "[aria-label='Leave call'], div[jscontroller='soHxub']",
    rejection_indicator: "div[jsname='WjoOrc'], div[aria-label*='denied']",
    removal_indicator: "div[jsname='WjoOrc'], div[aria-label*='removed you']",
    primary_leave: "[aria-label='Leave call']",
    secondary_leave: "button[aria-label='Leave call now'], div[jsname='JfR8Gd'] button",
    participant_container: "div[data-participant-id], div[jsname='HBfwi']",
    speaker_indicator: "div[jsname='BOHaEe'], div[class*='speaking-indicator']",
    speaking_class: "wESKGf",
    id_attributes: &["data-participant-id", "data-requested-participant-id"],
    name_selectors: &["[data-self-name]", "span.zWGUib", "div[jsname='YTKHs']"],
    speaker_polarity: Polarity::VisibleWhenSilent,
    name_input: "input[aria-label='Your name'], input[jsname='YPqjbf']",
    mic_toggle: "[aria-label*='microphone'][data-is-muted='false']",
    camera_toggle: "[aria-label*='camera'][data-is-muted='false']",
    join_button: "[jsname='Qx7uuf'], button[aria-label='Ask to join'], button[aria-label='Join now']",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleMeetProvider;

impl GoogleMeetProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for GoogleMeetProvider {
    fn reason_prefix(&self) -> &'static str {
        "GOOGLE_MEET_"
    }

    fn selectors(&self) -> &Selectors {
        &SELECTORS
    }

    async fn join(&self, page: &dyn BrowserPage, config: &BotConfig) -> Result<(), ProviderError> {
        generic_join(&SELECTORS, page, config).await
    }

    async fn wait_for_admission(
        &self,
        page: &dyn BrowserPage,
        timeout: Duration,
        on_lobby_observed: &(dyn Fn() + Send + Sync),
    ) -> Result<AdmissionOutcome, ProviderError> {
        generic_wait_for_admission(&SELECTORS, page, timeout, on_lobby_observed).await
    }

    async fn prepare(&self, page: &dyn BrowserPage, config: &BotConfig) -> Result<(), ProviderError> {
        generic_prepare(page, config).await
    }

    async fn start_recording(
        &self,
        page: &dyn BrowserPage,
        config: &BotConfig,
        registry: &Arc<dyn crate::session::ServerUrlSource>,
    ) -> Result<RecordingOutcome, ProviderError> {
        generic_start_recording(&SELECTORS, self.reason_prefix(), page, config, registry).await
    }

    async fn start_removal_monitor(
        &self,
        page: Arc<dyn BrowserPage>,
        on_removal: oneshot::Sender<()>,
    ) -> Result<RemovalMonitorHandle, ProviderError> {
        Ok(spawn_removal_monitor(page, SELECTORS.removal_indicator, on_removal))
    }

    async fn leave(&self, page: &dyn BrowserPage, reason: Option<&str>) -> Result<bool, ProviderError> {
        generic_leave(&SELECTORS, page, reason).await
    }
}
