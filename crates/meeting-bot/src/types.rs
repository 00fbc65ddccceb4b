//! Wire-adjacent data types shared between the host controller and the
//! in-page capture pipeline. Only `SpeakerEvent`/`SpeakerEventKind` ever
//! cross the CDP binding boundary into Rust — T0, audio framing, and
//! inbound transcription-server messages are handled entirely inside the
//! page (`browser/scripts/transcription_session.js`,
//! `browser/scripts/audio_pipeline.js`) and never reach the host, so they
//! have no Rust-side mirror type.

use common::types::ParticipantId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeakerEventKind {
    SpeakerStart,
    SpeakerEnd,
}

/// A speaker-attribution event, reported relative to the session's T0.
/// Dropped (not queued) page-side until T0 exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerEvent {
    pub kind: SpeakerEventKind,
    pub participant_name: String,
    pub participant_id: ParticipantId,
    pub relative_ms: i64,
}
