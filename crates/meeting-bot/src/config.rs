//! Bot configuration.
//!
//! Loaded from a single JSON payload delivered via environment variable or
//! file path, split into `from_vars`/`from_env` so config loading stays
//! unit-testable without touching the process environment. Sensitive
//! fields are wrapped in `SecretString` so `Debug` never leaks them into
//! logs.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default admission wait before giving up (5 minutes).
pub const DEFAULT_WAITING_ROOM_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Default window before any co-participant has ever been seen (20 minutes).
pub const DEFAULT_NO_ONE_JOINED_TIMEOUT_MS: u64 = 20 * 60 * 1000;

/// Default window after the bot has been left alone (10 seconds).
pub const DEFAULT_EVERYONE_LEFT_TIMEOUT_MS: u64 = 10 * 1000;

/// Default per-server capacity bound (`WL_MAX_CLIENTS`).
pub const DEFAULT_MAX_CLIENTS: u32 = 10;

/// Environment variable carrying the full bot config as a JSON payload.
pub const CONFIG_JSON_VAR: &str = "BOT_CONFIG_JSON";

/// Environment variable carrying a path to a file holding the JSON payload.
pub const CONFIG_FILE_VAR: &str = "BOT_CONFIG_FILE";

/// Environment variable overriding the transcription server URL.
pub const WHISPER_LIVE_URL_VAR: &str = "WHISPER_LIVE_URL";

/// Environment variable overriding per-server capacity.
pub const WL_MAX_CLIENTS_VAR: &str = "WL_MAX_CLIENTS";

/// Meeting platform tag. `Other` keeps an unrecognized tag a recoverable
/// config error rather than a panic when new providers land ahead of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    GoogleMeet,
    Teams,
    Other(String),
}

impl Serialize for Platform {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "google_meet" => Platform::GoogleMeet,
            "teams" => Platform::Teams,
            _ => Platform::Other(tag),
        })
    }
}

impl Platform {
    /// Uppercase prefix used for transcription-server reason tokens and
    /// provider-tagged errors, e.g. `TEAMS_BOT_REMOVED_BY_ADMIN`.
    #[must_use]
    pub fn reason_prefix(&self) -> String {
        match self {
            Platform::GoogleMeet => "GOOGLE_MEET_".to_string(),
            Platform::Teams => "TEAMS_".to_string(),
            Platform::Other(tag) => format!("{}_", tag.to_uppercase()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Platform::GoogleMeet => "google_meet",
            Platform::Teams => "teams",
            Platform::Other(tag) => tag.as_str(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Automatic-leave timeouts, all in milliseconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomaticLeaveConfig {
    pub waiting_room_timeout_ms: u64,
    pub no_one_joined_timeout_ms: u64,
    pub everyone_left_timeout_ms: u64,
}

impl AutomaticLeaveConfig {
    #[must_use]
    pub fn waiting_room_timeout(&self) -> Duration {
        Duration::from_millis(self.waiting_room_timeout_ms)
    }

    #[must_use]
    pub fn everyone_left_timeout(&self) -> Duration {
        Duration::from_millis(self.everyone_left_timeout_ms)
    }

    /// Folds `noOneJoinedTimeout` into the startup-alone
    /// window. The raw field is still parsed and kept (see `BotConfig`) so a
    /// future split doesn't require a config migration.
    #[must_use]
    pub fn startup_alone_timeout(&self) -> Duration {
        Duration::from_millis(self.no_one_joined_timeout_ms)
    }
}

impl Default for AutomaticLeaveConfig {
    fn default() -> Self {
        Self {
            waiting_room_timeout_ms: DEFAULT_WAITING_ROOM_TIMEOUT_MS,
            no_one_joined_timeout_ms: DEFAULT_NO_ONE_JOINED_TIMEOUT_MS,
            everyone_left_timeout_ms: DEFAULT_EVERYONE_LEFT_TIMEOUT_MS,
        }
    }
}

/// Immutable-after-start configuration for a single bot run.
#[derive(Clone)]
pub struct BotConfig {
    pub platform: Platform,
    pub meeting_url: Option<String>,
    pub bot_name: String,
    pub connection_id: String,
    pub native_meeting_id: String,
    pub token: SecretString,
    pub language: Option<String>,
    pub task: String,
    pub automatic_leave: AutomaticLeaveConfig,
    pub control_bus_url: SecretString,
    pub bot_manager_callback_url: String,
    pub container_name: String,
    pub transcription_server_url: Option<String>,
    pub max_clients: u32,
}

/// Custom Debug that redacts secrets (control-bus URL, auth token).
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("platform", &self.platform)
            .field("meeting_url", &self.meeting_url)
            .field("bot_name", &self.bot_name)
            .field("connection_id", &self.connection_id)
            .field("native_meeting_id", &self.native_meeting_id)
            .field("token", &"[REDACTED]")
            .field("language", &self.language)
            .field("task", &self.task)
            .field("automatic_leave", &self.automatic_leave)
            .field("control_bus_url", &"[REDACTED]")
            .field("bot_manager_callback_url", &self.bot_manager_callback_url)
            .field("container_name", &self.container_name)
            .field(
                "transcription_server_url",
                &self.transcription_server_url,
            )
            .field("max_clients", &self.max_clients)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("neither {CONFIG_JSON_VAR} nor {CONFIG_FILE_VAR} is set")]
    NoConfigSource,

    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Wire shape of the JSON payload, deserialized then lowered into
/// `BotConfig` so secrets get wrapped and defaults get applied in one place.
#[derive(Debug, Deserialize)]
struct RawBotConfig {
    platform: Platform,
    #[serde(rename = "meetingUrl")]
    meeting_url: Option<String>,
    #[serde(rename = "botName")]
    bot_name: String,
    #[serde(rename = "connectionId")]
    connection_id: String,
    #[serde(rename = "nativeMeetingId")]
    native_meeting_id: String,
    token: String,
    language: Option<String>,
    #[serde(default = "default_task")]
    task: String,
    #[serde(rename = "redisUrl")]
    redis_url: String,
    #[serde(rename = "botManagerCallbackUrl")]
    bot_manager_callback_url: String,
    container_name: String,
    #[serde(rename = "automaticLeave", default)]
    automatic_leave: RawAutomaticLeave,
}

fn default_task() -> String {
    "transcribe".to_string()
}

#[derive(Debug, Deserialize)]
struct RawAutomaticLeave {
    #[serde(rename = "waitingRoomTimeout")]
    waiting_room_timeout: Option<u64>,
    #[serde(rename = "noOneJoinedTimeout")]
    no_one_joined_timeout: Option<u64>,
    #[serde(rename = "everyoneLeftTimeout")]
    everyone_left_timeout: Option<u64>,
}

impl Default for RawAutomaticLeave {
    fn default() -> Self {
        Self {
            waiting_room_timeout: None,
            no_one_joined_timeout: None,
            everyone_left_timeout: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from the process environment: `BOT_CONFIG_JSON`
    /// takes precedence, falling back to the file named by `BOT_CONFIG_FILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load configuration from a `HashMap` (for testing) without touching
    /// the real process environment.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let json = if let Some(inline) = vars.get(CONFIG_JSON_VAR) {
            inline.clone()
        } else if let Some(path) = vars.get(CONFIG_FILE_VAR) {
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
                path: path.clone(),
                source,
            })?
        } else {
            return Err(ConfigError::NoConfigSource);
        };

        Self::from_json_str(&json, vars)
    }

    fn from_json_str(json: &str, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw: RawBotConfig = serde_json::from_str(json)?;

        let automatic_leave = AutomaticLeaveConfig {
            waiting_room_timeout_ms: raw
                .automatic_leave
                .waiting_room_timeout
                .unwrap_or(DEFAULT_WAITING_ROOM_TIMEOUT_MS),
            no_one_joined_timeout_ms: raw
                .automatic_leave
                .no_one_joined_timeout
                .unwrap_or(DEFAULT_NO_ONE_JOINED_TIMEOUT_MS),
            everyone_left_timeout_ms: raw
                .automatic_leave
                .everyone_left_timeout
                .unwrap_or(DEFAULT_EVERYONE_LEFT_TIMEOUT_MS),
        };

        let transcription_server_url = vars.get(WHISPER_LIVE_URL_VAR).cloned();

        let max_clients = vars
            .get(WL_MAX_CLIENTS_VAR)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_CLIENTS);

        Ok(BotConfig {
            platform: raw.platform,
            meeting_url: raw.meeting_url,
            bot_name: raw.bot_name,
            connection_id: raw.connection_id,
            native_meeting_id: raw.native_meeting_id,
            token: SecretString::from(raw.token),
            language: raw.language,
            task: raw.task,
            automatic_leave,
            control_bus_url: SecretString::from(raw.redis_url),
            bot_manager_callback_url: raw.bot_manager_callback_url,
            container_name: raw.container_name,
            transcription_server_url,
            max_clients,
        })
    }

    /// Exposes the auth token for wire framing. Kept as a single narrow
    /// accessor so call sites don't sprinkle `expose_secret()` everywhere.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    #[must_use]
    pub fn control_bus_url(&self) -> &str {
        self.control_bus_url.expose_secret()
    }
}
