//! Error taxonomy and the single `ExitOutcome` sink every bot run converges
//! on: a `thiserror` enum per concern plus one method that maps the terminal
//! variant to a process exit code.

use thiserror::Error;

/// Errors raised by a `Provider` while driving the meeting UI (join,
/// admission, recording, removal detection, leave).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("join control unreachable: {0}")]
    JoinUiUnreachable(String),

    #[error("navigation to meeting url failed: {0}")]
    Navigation(String),

    #[error("admission probe failed: {0}")]
    AdmissionProbe(String),

    #[error("in-page script evaluation failed: {0}")]
    ScriptEvaluation(String),

    #[error("in-page recording pipeline rejected: {0}")]
    RecordingRejected(String),

    #[error("browser automation error: {0}")]
    Browser(String),
}

/// Errors from the transcription-session half that runs in the page.
/// These never propagate to the controller — they drive the
/// reconnect loop inside the JS bundle. The Rust-side variant exists so the
/// host can still log a structured reason when a binding reports one.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect watchdog (5s) expired before OPEN_UNREADY")]
    ConnectTimeout,

    #[error("websocket closed: {0}")]
    Closed(String),

    #[error("server reported error: {0}")]
    ServerError(String),
}

/// Errors from the shared server registry (C5). These surface as `None`
/// from `allocate`, which callers treat as "retry later", never as a bot
/// failure in their own right.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The controller's own top-level error, for failures that occur before any
/// provider operation can run.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("meeting url missing from bot config")]
    MissingMeetingUrl,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Structured detail attached to error-class exit outcomes, posted to the
/// manager as part of the final `/exited` callback.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorDetail {
    pub error_message: String,
    pub error_name: String,
    pub context: Option<String>,
}

impl ErrorDetail {
    #[must_use]
    pub fn new(error_name: &str, error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            error_name: error_name.to_string(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// The single tagged reason a bot run terminated with. Exactly one is
/// produced per run; the controller's "first signal
/// wins" sink guarantees that invariant structurally.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    AdmissionRejectedByAdmin,
    AdmissionTimeout,
    RemovedByAdmin,
    LeftAloneTimeout,
    StartupAloneTimeout,
    NormalCompletion,
    StopRequestedPreAdmission,
    MissingMeetingUrl,
    JoinMeetingError(ErrorDetail),
    PostJoinSetupError(ErrorDetail),
    /// `teams_error` and `google_meet_error` are
    /// distinct tags, one per platform, rather than a single generic
    /// `platform_error` — `platform` carries the lowercase platform tag
    /// (`Platform::as_str()`) so `tag()` can render `<platform>_error`.
    PlatformError { platform: String, detail: ErrorDetail },
}

impl ExitOutcome {
    /// The tag string sent as `reason` in the final `/exited` callback and
    /// used to derive `<PROVIDER>_*` transcription-server reason tokens.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            ExitOutcome::AdmissionRejectedByAdmin => "admission_rejected_by_admin".to_string(),
            ExitOutcome::AdmissionTimeout => "admission_timeout".to_string(),
            ExitOutcome::RemovedByAdmin => "removed_by_admin".to_string(),
            ExitOutcome::LeftAloneTimeout => "left_alone_timeout".to_string(),
            ExitOutcome::StartupAloneTimeout => "startup_alone_timeout".to_string(),
            ExitOutcome::NormalCompletion => "normal_completion".to_string(),
            ExitOutcome::StopRequestedPreAdmission => "stop_requested_pre_admission".to_string(),
            ExitOutcome::MissingMeetingUrl => "missing_meeting_url".to_string(),
            ExitOutcome::JoinMeetingError(_) => "join_meeting_error".to_string(),
            ExitOutcome::PostJoinSetupError(_) => "post_join_setup_error".to_string(),
            ExitOutcome::PlatformError { platform, .. } => format!("{platform}_error"),
        }
    }

    /// 0 for benign terminal outcomes, 1 for error outcomes.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::AdmissionRejectedByAdmin
            | ExitOutcome::AdmissionTimeout
            | ExitOutcome::RemovedByAdmin
            | ExitOutcome::LeftAloneTimeout
            | ExitOutcome::StartupAloneTimeout
            | ExitOutcome::NormalCompletion
            | ExitOutcome::StopRequestedPreAdmission => 0,
            ExitOutcome::MissingMeetingUrl
            | ExitOutcome::JoinMeetingError(_)
            | ExitOutcome::PostJoinSetupError(_)
            | ExitOutcome::PlatformError { .. } => 1,
        }
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&ErrorDetail> {
        match self {
            ExitOutcome::JoinMeetingError(d) | ExitOutcome::PostJoinSetupError(d) => Some(d),
            ExitOutcome::PlatformError { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Maps an in-page recording rejection tag (e.g.
    /// `TEAMS_BOT_REMOVED_BY_ADMIN`) onto the matching `ExitOutcome`.
    /// Anything unrecognized is a setup error.
    #[must_use]
    pub fn from_recording_rejection(reason: &str) -> ExitOutcome {
        if reason.ends_with("BOT_REMOVED_BY_ADMIN") {
            ExitOutcome::RemovedByAdmin
        } else if reason.ends_with("LEFT_ALONE_TIMEOUT") {
            ExitOutcome::LeftAloneTimeout
        } else if reason.ends_with("STARTUP_ALONE_TIMEOUT") {
            ExitOutcome::StartupAloneTimeout
        } else {
            ExitOutcome::PostJoinSetupError(ErrorDetail::new(
                "RecordingRejected",
                reason.to_string(),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_benign_vs_error_split() {
        let benign = [
            ExitOutcome::AdmissionRejectedByAdmin,
            ExitOutcome::AdmissionTimeout,
            ExitOutcome::RemovedByAdmin,
            ExitOutcome::LeftAloneTimeout,
            ExitOutcome::StartupAloneTimeout,
            ExitOutcome::NormalCompletion,
            ExitOutcome::StopRequestedPreAdmission,
        ];
        for outcome in benign {
            assert_eq!(outcome.exit_code(), 0, "{} should exit 0", outcome.tag());
        }

        let detail = ErrorDetail::new("Test", "boom");
        let errors = [
            ExitOutcome::MissingMeetingUrl,
            ExitOutcome::JoinMeetingError(detail.clone()),
            ExitOutcome::PostJoinSetupError(detail.clone()),
            ExitOutcome::PlatformError {
                platform: "teams".to_string(),
                detail,
            },
        ];
        for outcome in errors {
            assert_eq!(outcome.exit_code(), 1, "{} should exit 1", outcome.tag());
        }
    }

    #[test]
    fn recording_rejection_maps_removal() {
        let outcome = ExitOutcome::from_recording_rejection("TEAMS_BOT_REMOVED_BY_ADMIN");
        assert_eq!(outcome.tag(), "removed_by_admin");
    }

    #[test]
    fn recording_rejection_maps_left_alone() {
        let outcome = ExitOutcome::from_recording_rejection("GOOGLE_MEET_LEFT_ALONE_TIMEOUT");
        assert_eq!(outcome.tag(), "left_alone_timeout");
    }

    #[test]
    fn recording_rejection_maps_startup_alone() {
        let outcome = ExitOutcome::from_recording_rejection("TEAMS_STARTUP_ALONE_TIMEOUT");
        assert_eq!(outcome.tag(), "startup_alone_timeout");
    }

    #[test]
    fn recording_rejection_unknown_is_setup_error() {
        let outcome = ExitOutcome::from_recording_rejection("TEAMS_SOMETHING_WEIRD");
        assert_eq!(outcome.tag(), "post_join_setup_error");
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn error_detail_carries_context() {
        let detail = ErrorDetail::new("JoinError", "no join button").with_context("teams");
        assert_eq!(detail.context.as_deref(), Some("teams"));
    }

    #[test]
    fn platform_error_tag_is_per_platform() {
        let detail = ErrorDetail::new("Internal", "boom");
        let teams = ExitOutcome::PlatformError {
            platform: "teams".to_string(),
            detail: detail.clone(),
        };
        let meet = ExitOutcome::PlatformError {
            platform: "google_meet".to_string(),
            detail,
        };
        assert_eq!(teams.tag(), "teams_error");
        assert_eq!(meet.tag(), "google_meet_error");
    }
}
