//! Lifecycle callback client (C9): POSTs status transitions to the bot
//! manager over a `reqwest::Client` with bounded timeouts, one method per
//! endpoint, and errors swallowed at the call site rather than propagated —
//! every callback failure is a warning that never alters the bot's own
//! lifecycle.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::errors::ErrorDetail;

/// Bound on every callback request so a wedged manager endpoint can never
/// stall the bot's own lifecycle.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Joining,
    AwaitingAdmission,
    Active,
    Leaving,
    Exited,
}

impl LifecycleStatus {
    fn path_suffix(self) -> &'static str {
        match self {
            LifecycleStatus::Joining => "joining",
            LifecycleStatus::AwaitingAdmission => "awaiting_admission",
            LifecycleStatus::Active => "started",
            LifecycleStatus::Leaving => "leaving",
            LifecycleStatus::Exited => "exited",
        }
    }

    fn status_tag(self) -> &'static str {
        match self {
            LifecycleStatus::Joining => "joining",
            LifecycleStatus::AwaitingAdmission => "awaiting_admission",
            LifecycleStatus::Active => "active",
            LifecycleStatus::Leaving => "leaving",
            LifecycleStatus::Exited => "exited",
        }
    }
}

#[derive(Debug, Serialize)]
struct CallbackBody<'a> {
    connection_id: &'a str,
    container_id: &'a str,
    status: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_details: Option<&'a ErrorDetail>,
}

/// Lifecycle callback client (C9).
#[derive(Clone)]
pub struct LifecycleCallbackClient {
    client: reqwest::Client,
    base_url: String,
    connection_id: String,
    container_id: String,
}

impl LifecycleCallbackClient {
    /// # Errors
    /// Returns an error only if the underlying `reqwest::Client` cannot be
    /// built (e.g. TLS backend initialization failure).
    pub fn new(
        base_url: String,
        connection_id: String,
        container_id: String,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            base_url,
            connection_id,
            container_id,
        })
    }

    /// Fires a lifecycle transition. All failures are logged at `warn` and
    /// swallowed — callbacks never fail the bot.
    #[instrument(skip(self), fields(connection_id = %self.connection_id, status = status.status_tag()))]
    pub async fn notify(&self, status: LifecycleStatus, reason: Option<&str>, error: Option<&ErrorDetail>) {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), status.path_suffix());
        let body = CallbackBody {
            connection_id: &self.connection_id,
            container_id: &self.container_id,
            status: status.status_tag(),
            timestamp: Utc::now().to_rfc3339(),
            reason,
            error_details: error,
        };

        let result = self.client.post(&url).json(&body).send().await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    status_code = %response.status(),
                    url = %url,
                    "lifecycle callback rejected by manager"
                );
            }
            Err(err) => {
                warn!(error = %err, url = %url, "lifecycle callback request failed");
            }
        }
    }

    /// Convenience for the one callback carrying an `ExitOutcome` tag.
    pub async fn notify_exited(&self, reason: &str, error: Option<&ErrorDetail>) {
        self.notify(LifecycleStatus::Exited, Some(reason), error).await;
    }
}
