//! Meeting flow controller (C6): the single-threaded, eight-phase
//! orchestrator that composes the provider pack (C1), the registry bridge
//! (C5), the removal/admission monitors (C7), and graceful leave (C10) into
//! exactly one `ExitOutcome` per bot run. Implemented as a plain async
//! function rather than a mailbox actor: nothing sends this one messages; the
//! control channel and monitors communicate through a shared
//! `CancellationToken` and a removal oneshot instead.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::browser::BrowserPage;
use crate::callbacks::{LifecycleCallbackClient, LifecycleStatus};
use crate::config::BotConfig;
use crate::errors::{ErrorDetail, ExitOutcome};
use crate::provider::{AdmissionOutcome, Provider};
use crate::session::ServerUrlSource;

/// Collaborators a single bot run is composed from. Grouped into one struct
/// so `run`'s signature stays readable as the collaborator count grows.
pub struct ControllerDeps {
    pub page: Arc<dyn BrowserPage>,
    pub provider: Arc<dyn Provider>,
    pub registry: Arc<dyn ServerUrlSource>,
    pub callbacks: LifecycleCallbackClient,
    pub stop_token: CancellationToken,
}

/// Runs one bot through to completion and returns the single `ExitOutcome`
/// every exit path converges on.
#[instrument(skip(config, deps), fields(platform = %config.platform, connection_id = %config.connection_id))]
pub async fn run(config: BotConfig, deps: ControllerDeps) -> ExitOutcome {
    let ControllerDeps {
        page,
        provider,
        registry,
        callbacks,
        stop_token,
    } = deps;

    callbacks.notify(LifecycleStatus::Joining, None, None).await;

    // Phase 1: validate config.
    if config.meeting_url.is_none() {
        return finish(&callbacks, &registry, ExitOutcome::MissingMeetingUrl).await;
    }

    // Phase 2: join.
    if let Err(err) = provider.join(page.as_ref(), &config).await {
        let detail = ErrorDetail::new("JoinError", err.to_string());
        return finish(&callbacks, &registry, ExitOutcome::JoinMeetingError(detail)).await;
    }

    // Phase 3: stop-signal guard (pre-admission).
    if stop_token.is_cancelled() {
        return finish(&callbacks, &registry, ExitOutcome::StopRequestedPreAdmission).await;
    }

    // Phase 4: prepare() concurrently with waitForAdmission(). `awaiting_admission`
    // fires unconditionally here so joining -> awaiting_admission -> active is
    // always emitted, even on immediate admission.
    callbacks.notify(LifecycleStatus::AwaitingAdmission, None, None).await;

    let admission_timeout = config.automatic_leave.waiting_room_timeout();
    let (prepare_result, admission_result) = tokio::join!(
        provider.prepare(page.as_ref(), &config),
        provider.wait_for_admission(page.as_ref(), admission_timeout, &|| {})
    );

    if let Err(err) = prepare_result {
        let detail = ErrorDetail::new("PrepareError", err.to_string());
        return finish(&callbacks, &registry, ExitOutcome::PostJoinSetupError(detail)).await;
    }

    let admission = match admission_result {
        Ok(outcome) => outcome,
        Err(err) => {
            let detail = ErrorDetail::new("AdmissionProbeError", err.to_string());
            return finish(&callbacks, &registry, ExitOutcome::JoinMeetingError(detail)).await;
        }
    };

    match admission {
        AdmissionOutcome::Rejected { reason } => {
            info!(reason = %reason, "admission rejected by host, not in meeting, skipping leave");
            return finish(&callbacks, &registry, ExitOutcome::AdmissionRejectedByAdmin).await;
        }
        AdmissionOutcome::TimedOut => {
            // Best-effort: cancel the outstanding join request via the
            // in-page leave action before exiting.
            let _ = provider.leave(page.as_ref(), Some("admission_timeout")).await;
            return finish(&callbacks, &registry, ExitOutcome::AdmissionTimeout).await;
        }
        AdmissionOutcome::Admitted => {}
    }

    // Phase 5: active callback.
    callbacks.notify(LifecycleStatus::Active, None, None).await;

    // Phase 6: removal monitor.
    let (removal_tx, removal_rx) = tokio::sync::oneshot::channel();
    let monitor = match provider.start_removal_monitor(Arc::clone(&page), removal_tx).await {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "failed to start removal monitor, continuing without it");
            None
        }
    };

    // Phase 7: race startRecording() against removal and the stop signal.
    let outcome = race_recording(
        provider.as_ref(),
        page.as_ref(),
        &config,
        &registry,
        stop_token.clone(),
        removal_rx,
    )
    .await;

    if let Some(monitor) = monitor {
        monitor.stop();
    }

    // Phase 8: graceful leave, always.
    let left = provider.leave(page.as_ref(), Some(outcome.tag().as_str())).await;
    if let Err(err) = &left {
        warn!(error = %err, "provider leave failed");
    }

    finish(&callbacks, &registry, outcome).await
}

/// Races `start_recording()` against removal and the stop signal. A stop
/// signal triggers the in-page leave action (which settles the recording
/// future itself, sending `session_control:LEAVING_MEETING` first) and
/// then lets `start_recording` resolve naturally rather than synthesizing
/// an outcome. Removal also triggers the in-page leave action first, so a
/// still-OPEN session socket gets the same `LEAVING_MEETING` notice before
/// the synthesized `RemovedByAdmin` outcome is returned.
async fn race_recording(
    provider: &dyn Provider,
    page: &dyn BrowserPage,
    config: &BotConfig,
    registry: &Arc<dyn crate::session::ServerUrlSource>,
    stop_token: CancellationToken,
    mut removal_rx: tokio::sync::oneshot::Receiver<()>,
) -> ExitOutcome {
    let recording_fut = provider.start_recording(page, config, registry);
    tokio::pin!(recording_fut);
    let mut leave_triggered = false;

    loop {
        tokio::select! {
            result = &mut recording_fut => {
                return match result {
                    Ok(crate::browser::RecordingOutcome::Resolved) => ExitOutcome::NormalCompletion,
                    Ok(crate::browser::RecordingOutcome::Rejected(reason)) => {
                        ExitOutcome::from_recording_rejection(&reason)
                    }
                    Err(err) => {
                        ExitOutcome::PostJoinSetupError(ErrorDetail::new("RecordingError", err.to_string()))
                    }
                };
            }
            _ = &mut removal_rx => {
                if let Err(err) = page.evaluate("window.__botPerformLeaveAction()").await {
                    warn!(error = %err, "failed to trigger in-page leave action on removal");
                }
                return ExitOutcome::RemovedByAdmin;
            }
            () = stop_token.cancelled(), if !leave_triggered => {
                leave_triggered = true;
                if let Err(err) = page.evaluate("window.__botPerformLeaveAction()").await {
                    warn!(error = %err, "failed to trigger in-page leave action on stop signal");
                }
            }
        }
    }
}

/// Releases the registry slot and emits the terminal `leaving`/`exited`
/// callbacks. Shared tail for every phase's return path.
async fn finish(
    callbacks: &LifecycleCallbackClient,
    registry: &Arc<dyn ServerUrlSource>,
    outcome: ExitOutcome,
) -> ExitOutcome {
    callbacks.notify(LifecycleStatus::Leaving, None, None).await;
    registry.release().await;
    callbacks.notify_exited(&outcome.tag(), outcome.error_detail()).await;
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::browser::page::fake::FakePage;
    use crate::browser::RecordingOutcome;
    use crate::config::{AutomaticLeaveConfig, Platform};
    use crate::provider::{Polarity, RemovalMonitorHandle, Selectors};
    use crate::session::fake::FakeUrlSource;
    use async_trait::async_trait;
    use common::secret::SecretString;
    use std::time::Duration;

    const TEST_SELECTORS: Selectors = Selectors {
        waiting_room: ".waiting",
        admission_indicator: ".admitted",
        rejection_indicator: ".rejected",
        removal_indicator: ".removed",
        primary_leave: ".leave",
        secondary_leave: ".confirm-leave",
        participant_container: ".participant",
        speaker_indicator: ".speaking",
        speaking_class: "is-speaking",
        id_attributes: &["data-id"],
        name_selectors: &[".name"],
        speaker_polarity: Polarity::VisibleWhenSpeaking,
        name_input: ".name-input",
        mic_toggle: ".mic",
        camera_toggle: ".camera",
        join_button: ".join",
    };

    struct ScriptedProvider {
        admission: AdmissionOutcome,
        recording: Result<RecordingOutcome, crate::errors::ProviderError>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn reason_prefix(&self) -> &'static str {
            "TEST_"
        }

        fn selectors(&self) -> &Selectors {
            &TEST_SELECTORS
        }

        async fn join(&self, _page: &dyn BrowserPage, _config: &BotConfig) -> Result<(), crate::errors::ProviderError> {
            Ok(())
        }

        async fn wait_for_admission(
            &self,
            _page: &dyn BrowserPage,
            _timeout: Duration,
            _on_lobby_observed: &(dyn Fn() + Send + Sync),
        ) -> Result<AdmissionOutcome, crate::errors::ProviderError> {
            Ok(self.admission.clone())
        }

        async fn prepare(&self, _page: &dyn BrowserPage, _config: &BotConfig) -> Result<(), crate::errors::ProviderError> {
            Ok(())
        }

        async fn start_recording(
            &self,
            _page: &dyn BrowserPage,
            _config: &BotConfig,
            _registry: &Arc<dyn crate::session::ServerUrlSource>,
        ) -> Result<RecordingOutcome, crate::errors::ProviderError> {
            match &self.recording {
                Ok(outcome) => Ok(outcome.clone()),
                Err(_) => Err(crate::errors::ProviderError::Browser("scripted failure".to_string())),
            }
        }

        async fn start_removal_monitor(
            &self,
            _page: Arc<dyn BrowserPage>,
            _on_removal: tokio::sync::oneshot::Sender<()>,
        ) -> Result<RemovalMonitorHandle, crate::errors::ProviderError> {
            let task = tokio::spawn(async {});
            Ok(RemovalMonitorHandle::new(task))
        }

        async fn leave(&self, _page: &dyn BrowserPage, _reason: Option<&str>) -> Result<bool, crate::errors::ProviderError> {
            Ok(true)
        }
    }

    fn test_config() -> BotConfig {
        BotConfig {
            platform: Platform::GoogleMeet,
            meeting_url: Some("https://meet.example.com/abc".to_string()),
            bot_name: "Notetaker".to_string(),
            connection_id: "conn-1".to_string(),
            native_meeting_id: "meeting-1".to_string(),
            token: SecretString::from("secret".to_string()),
            language: None,
            task: "transcribe".to_string(),
            automatic_leave: AutomaticLeaveConfig {
                waiting_room_timeout_ms: 50,
                no_one_joined_timeout_ms: 60_000,
                everyone_left_timeout_ms: 10_000,
            },
            control_bus_url: SecretString::from("redis://localhost".to_string()),
            bot_manager_callback_url: "http://localhost:0".to_string(),
            container_name: "bot-1".to_string(),
            transcription_server_url: None,
            max_clients: 10,
        }
    }

    fn deps(provider: ScriptedProvider) -> ControllerDeps {
        ControllerDeps {
            page: Arc::new(FakePage::new()),
            provider: Arc::new(provider),
            registry: Arc::new(FakeUrlSource::new("wss://server-a")),
            callbacks: LifecycleCallbackClient::new(
                "http://127.0.0.1:0".to_string(),
                "conn-1".to_string(),
                "bot-1".to_string(),
            )
            .expect("client builds"),
            stop_token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn missing_meeting_url_exits_immediately() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::Admitted,
            recording: Ok(RecordingOutcome::Resolved),
        };
        let mut config = test_config();
        config.meeting_url = None;

        let outcome = run(config, deps(provider)).await;
        assert!(matches!(outcome, ExitOutcome::MissingMeetingUrl));
    }

    #[tokio::test]
    async fn stop_requested_pre_admission() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::Admitted,
            recording: Ok(RecordingOutcome::Resolved),
        };
        let d = deps(provider);
        d.stop_token.cancel();

        let outcome = run(test_config(), d).await;
        assert!(matches!(outcome, ExitOutcome::StopRequestedPreAdmission));
    }

    #[tokio::test]
    async fn admission_rejected_skips_leave_and_exits_zero() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::Rejected {
                reason: "host declined".to_string(),
            },
            recording: Ok(RecordingOutcome::Resolved),
        };

        let outcome = run(test_config(), deps(provider)).await;
        assert!(matches!(outcome, ExitOutcome::AdmissionRejectedByAdmin));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn admission_timeout_invokes_leave() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::TimedOut,
            recording: Ok(RecordingOutcome::Resolved),
        };

        let outcome = run(test_config(), deps(provider)).await;
        assert!(matches!(outcome, ExitOutcome::AdmissionTimeout));
    }

    #[tokio::test]
    async fn normal_completion_on_clean_recording() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::Admitted,
            recording: Ok(RecordingOutcome::Resolved),
        };

        let outcome = run(test_config(), deps(provider)).await;
        assert!(matches!(outcome, ExitOutcome::NormalCompletion));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn removal_rejection_maps_to_removed_by_admin() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::Admitted,
            recording: Ok(RecordingOutcome::Rejected("TEST_BOT_REMOVED_BY_ADMIN".to_string())),
        };

        let outcome = run(test_config(), deps(provider)).await;
        assert!(matches!(outcome, ExitOutcome::RemovedByAdmin));
    }

    #[tokio::test]
    async fn unknown_rejection_is_post_join_setup_error() {
        let provider = ScriptedProvider {
            admission: AdmissionOutcome::Admitted,
            recording: Ok(RecordingOutcome::Rejected("TEST_WEIRD_THING".to_string())),
        };

        let outcome = run(test_config(), deps(provider)).await;
        assert!(matches!(outcome, ExitOutcome::PostJoinSetupError(_)));
        assert_eq!(outcome.exit_code(), 1);
    }
}
