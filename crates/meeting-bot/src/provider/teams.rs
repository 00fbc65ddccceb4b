//! Microsoft Teams strategy: selector table plus thin wiring over the
//! shared `generic_*` helpers in the parent module. Selectors are
//! pure data — nothing provider-specific lives here beyond
//! the table and the reconnect policy choice documented in `DESIGN.md`.

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

/// Teams DOM probes. The voice-level indicator here is visible while the
/// participant is speaking (no polarity inversion), unlike Google Meet.
pub const SELECTORS: Selectors = Selectors {
    waiting_room: "#pre-join-lobby-screen, [data-tid='lobby-screen']",
    admission_indicator: "#hangup-button, [data-tid='call-hangup']",
    rejection_indicator: "[data-tid='lobby-denied-screen'], #denied-from-lobby",
    removal_indicator: "[data-tid='meeting-removed-dialog'], #removed-from-meeting",
    primary_leave: "#hangup-button, [data-tid='call-hangup']",
    secondary_leave: "[data-tid='prompt-suppressor'] button, [data-tid='leave-confirm']",
    participant_container: "[data-tid='participant-list-item'], [data-cid='roster-participant']",
    speaker_indicator: "[data-tid='voice-level-indicator']",
    speaking_class: "vdi-frame-occlusion-indicator-speaking",
    id_attributes: &["data-tid", "data-cid", "data-object-id"],
    name_selectors: &["[data-tid='roster-name']", ".ui-participant-name", "span[title]"],
    speaker_polarity: Polarity::VisibleWhenSpeaking,
    name_input: "#display-name-input, input[data-tid='prejoin-display-name-input']",
    mic_toggle: "#microphone-button[aria-pressed='true'], [data-tid='toggle-mute']",
    camera_toggle: "#video-button[aria-pressed='true'], [data-tid='toggle-video']",
    join_button: "#prejoin-join-button, button[data-tid='prejoin-join-button']",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TeamsProvider;

impl TeamsProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for TeamsProvider {
    fn reason_prefix(&self) -> &'static str {
        "TEAMS_"
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::browser::page::fake::FakePage;

    #[tokio::test]
    async fn join_fails_without_meeting_url() {
        let provider = TeamsProvider::new();
        let page = FakePage::new();
        let mut config = test_config();
        config.meeting_url = None;
        let err = provider.join(&page, &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Navigation(_)));
    }

    #[tokio::test]
    async fn join_fills_name_and_clicks_join() {
        let provider = TeamsProvider::new();
        let page = FakePage::new();
        page.set_visible(SELECTORS.name_input, true);
        page.set_count(SELECTORS.join_button, 1);

        provider.join(&page, &test_config()).await.expect("join ok");
        assert!(page.clicks().iter().any(|c| c == SELECTORS.join_button));
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let provider = TeamsProvider::new();
        let page = FakePage::new();
        page.set_count(SELECTORS.primary_leave, 1);
        assert!(provider.leave(&page, None).await.expect("leave ok"));

        page.set_count(SELECTORS.primary_leave, 0);
        assert!(!provider.leave(&page, None).await.expect("leave ok"));
    }

    fn test_config() -> BotConfig {
        use common::secret::SecretString;
        use crate::config::{AutomaticLeaveConfig, Platform};

        BotConfig {
            platform: Platform::Teams,
            meeting_url: Some("https://teams.microsoft.com/meet/abc".to_string()),
            bot_name: "Notetaker".to_string(),
            connection_id: "conn-1".to_string(),
            native_meeting_id: "meeting-1".to_string(),
            token: SecretString::from("secret-token".to_string()),
            language: None,
            task: "transcribe".to_string(),
            automatic_leave: AutomaticLeaveConfig::default(),
            control_bus_url: SecretString::from("redis://localhost".to_string()),
            bot_manager_callback_url: "http://localhost/callback".to_string(),
            container_name: "bot-1".to_string(),
            transcription_server_url: None,
            max_clients: 10,
        }
    }
}
