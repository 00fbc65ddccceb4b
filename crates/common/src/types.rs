//! Common data types shared across the meeting bot.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a meeting participant, as observed in the page DOM.
///
/// Synthesized once per participant node (see `ParticipantRecord`) and kept
/// for the node's lifetime. Never derived from a display name: names are not
/// unique and must not be used as an identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

/// Fixed namespace used to derive stable participant ids from a page-side
/// key, so the same DOM-observed identity maps to the same `ParticipantId`
/// across repeated events without a lookup table.
const PARTICIPANT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x3a, 0x1d, 0x44, 0x9b, 0x2e, 0x4f, 0x51, 0x9a, 0x77, 0x2d, 0x8e, 0x51, 0xc0, 0x0f, 0x9a,
]);

impl ParticipantId {
    /// Create a new random participant id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable id from a page-side key (a DOM attribute value or a
    /// generated per-node id persisted on the node). The same key always
    /// maps to the same `ParticipantId`, so repeated detector ticks for the
    /// same participant never mint a new identity.
    #[must_use]
    pub fn from_stable_key(key: &str) -> Self {
        Self(Uuid::new_v5(&PARTICIPANT_ID_NAMESPACE, key.as_bytes()))
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier minted fresh for each transcription-server connection.
///
/// Changes on every reconnect; never reused across a session boundary so
/// the transcription server can tell successive attempts apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Mint a new session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn participant_ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }

    #[test]
    fn stable_key_derivation_is_deterministic() {
        let a = ParticipantId::from_stable_key("dom-node-42");
        let b = ParticipantId::from_stable_key("dom-node-42");
        let c = ParticipantId::from_stable_key("dom-node-43");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn ids_round_trip_through_json() {
        let id = ParticipantId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: ParticipantId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, back);
    }
}
