//! Platform-agnostic meeting bot: joins a hosted video call, captures audio
//! and speaker activity through an injected in-page pipeline, streams both
//! to a transcription service, and exits with one well-defined reason.
//!
//! Module layout mirrors the component table: `provider` (C1), `browser`
//! (C2-C4 page-side bundle plus the CDP driver), `redis` (C5), `controller`
//! (C6), `control_channel` (C8), `callbacks` (C9), and graceful leave folded
//! into `controller`'s final phase (C10). `session` is the host half of C4:
//! the registry-reconnection bridge the page polls through.

pub mod browser;
pub mod callbacks;
pub mod config;
pub mod control_channel;
pub mod controller;
pub mod errors;
pub mod provider;
pub mod redis;
pub mod session;
pub mod types;
