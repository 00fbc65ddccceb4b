//! CDP bindings the injected bundle calls into. Each binding is exposed via
//! `Page::expose_function` and forwards a decoded payload onto an
//! `mpsc::UnboundedSender<BindingEvent>`, the same decoupling the reference
//! workspace uses between its transport layer and `ConnectionActor` message
//! enum — the controller only ever reads `BindingEvent`s, never touches CDP
//! directly.

use common::types::ParticipantId;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::types::SpeakerEvent;

/// Binding names the bundle invokes. Kept as constants so the JS source and
/// the Rust installer can't drift independently.
pub const LOG: &str = "__bot_log";
pub const SPEAKER_EVENT: &str = "__bot_speaker_event";
pub const RECORDING_RESOLVED: &str = "__bot_recording_resolved";
pub const RECORDING_REJECTED: &str = "__bot_recording_rejected";
pub const PARTICIPANT_COUNT: &str = "__bot_participant_count";

pub const ALL_BINDINGS: [&str; 5] = [
    LOG,
    SPEAKER_EVENT,
    RECORDING_RESOLVED,
    RECORDING_REJECTED,
    PARTICIPANT_COUNT,
];

/// Events surfaced from the page, decoded from each binding's JSON payload.
#[derive(Debug, Clone)]
pub enum BindingEvent {
    Log { level: String, tag: String, message: String },
    Speaker(SpeakerEvent),
    RecordingResolved,
    RecordingRejected(String),
    ParticipantCount(u32),
}

#[derive(Deserialize)]
struct LogPayload {
    level: String,
    tag: String,
    message: String,
}

#[derive(Deserialize)]
struct SpeakerPayload {
    kind: String,
    participant_name: String,
    participant_id: String,
    relative_ms: i64,
}

impl SpeakerPayload {
    fn stable_participant_id(&self) -> ParticipantId {
        ParticipantId::from_stable_key(&self.participant_id)
    }
}

#[derive(Deserialize)]
struct ParticipantCountPayload {
    count: u32,
}

/// Decodes a binding's raw JSON argument string into a `BindingEvent`,
/// logging and dropping anything malformed rather than propagating — a
/// corrupt binding payload is page-side noise, never a controller failure.
#[must_use]
pub fn decode(binding: &str, raw: &str) -> Option<BindingEvent> {
    match binding {
        LOG => match serde_json::from_str::<LogPayload>(raw) {
            Ok(payload) => {
                emit_log(&payload);
                Some(BindingEvent::Log {
                    level: payload.level,
                    tag: payload.tag,
                    message: payload.message,
                })
            }
            Err(err) => {
                warn!(error = %err, "malformed __bot_log payload");
                None
            }
        },
        SPEAKER_EVENT => match serde_json::from_str::<SpeakerPayload>(raw) {
            Ok(payload) => {
                let kind = match payload.kind.as_str() {
                    "SPEAKER_START" => crate::types::SpeakerEventKind::SpeakerStart,
                    _ => crate::types::SpeakerEventKind::SpeakerEnd,
                };
                let participant_id = payload.stable_participant_id();
                Some(BindingEvent::Speaker(SpeakerEvent {
                    kind,
                    participant_name: payload.participant_name,
                    participant_id,
                    relative_ms: payload.relative_ms,
                }))
            }
            Err(err) => {
                warn!(error = %err, "malformed speaker event payload");
                None
            }
        },
        RECORDING_RESOLVED => Some(BindingEvent::RecordingResolved),
        RECORDING_REJECTED => Some(BindingEvent::RecordingRejected(raw.trim_matches('"').to_string())),
        PARTICIPANT_COUNT => match serde_json::from_str::<ParticipantCountPayload>(raw) {
            Ok(payload) => Some(BindingEvent::ParticipantCount(payload.count)),
            Err(err) => {
                warn!(error = %err, "malformed participant count payload");
                None
            }
        },
        other => {
            trace!(binding = other, "unknown binding call ignored");
            None
        }
    }
}

fn emit_log(payload: &LogPayload) {
    match payload.level.as_str() {
        "error" => warn!(tag = %payload.tag, "{}", payload.message),
        "debug" => debug!(tag = %payload.tag, "{}", payload.message),
        _ => info!(tag = %payload.tag, "{}", payload.message),
    }
}

/// Channel pair a page driver wires each binding callback through.
#[must_use]
pub fn channel() -> (mpsc::UnboundedSender<BindingEvent>, mpsc::UnboundedReceiver<BindingEvent>) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_log_payload() {
        let event = decode(LOG, r#"{"level":"info","tag":"audio","message":"started"}"#);
        assert!(matches!(event, Some(BindingEvent::Log { .. })));
    }

    #[test]
    fn decodes_speaker_start() {
        let event = decode(
            SPEAKER_EVENT,
            r#"{"kind":"SPEAKER_START","participant_name":"Ada","participant_id":"p-1","relative_ms":120}"#,
        );
        match event {
            Some(BindingEvent::Speaker(ev)) => {
                assert_eq!(ev.kind, crate::types::SpeakerEventKind::SpeakerStart);
                assert_eq!(ev.relative_ms, 120);
            }
            other => panic!("expected speaker event, got {other:?}"),
        }
    }

    #[test]
    fn speaker_id_is_stable_across_events() {
        let first = decode(
            SPEAKER_EVENT,
            r#"{"kind":"SPEAKER_START","participant_name":"Ada","participant_id":"p-1","relative_ms":120}"#,
        );
        let second = decode(
            SPEAKER_EVENT,
            r#"{"kind":"SPEAKER_END","participant_name":"Ada","participant_id":"p-1","relative_ms":900}"#,
        );
        match (first, second) {
            (Some(BindingEvent::Speaker(a)), Some(BindingEvent::Speaker(b))) => {
                assert_eq!(a.participant_id, b.participant_id);
            }
            other => panic!("expected two speaker events, got {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_decodes_to_none() {
        assert!(decode(LOG, "not json").is_none());
    }

    #[test]
    fn unknown_binding_decodes_to_none() {
        assert!(decode("__bot_unknown", "{}").is_none());
    }

    #[test]
    fn all_bindings_list_matches_constants() {
        assert_eq!(ALL_BINDINGS.len(), 5);
        assert!(ALL_BINDINGS.contains(&LOG));
        assert!(ALL_BINDINGS.contains(&PARTICIPANT_COUNT));
    }
}
