//! Embeds the in-page capture/detect/stream bundle as Rust constants, the
//! same way `redis/lua_scripts.rs` embeds its Lua scripts as `pub
//! const` string literals with accompanying content tests.

pub const AUDIO_PIPELINE: &str = include_str!("scripts/audio_pipeline.js");
pub const SPEAKER_DETECTOR: &str = include_str!("scripts/speaker_detector.js");
pub const TRANSCRIPTION_SESSION: &str = include_str!("scripts/transcription_session.js");
pub const BUNDLE_LOADER: &str = include_str!("scripts/bundle.js");

/// Concatenates the page scripts in dependency order: pipeline and detector
/// define globals the loader wires together, so the loader must load last.
#[must_use]
pub fn bundle() -> String {
    [AUDIO_PIPELINE, SPEAKER_DETECTOR, TRANSCRIPTION_SESSION, BUNDLE_LOADER].join("\n;\n")
}
