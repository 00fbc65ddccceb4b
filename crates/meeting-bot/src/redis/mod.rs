//! Server registry client (C5) over a shared ranked Redis sorted set.
//!
//! - `lua_scripts` — the atomic allocate/release/fail scripts.
//! - `client` — `ServerRegistryClient` plus the `ScriptRunner` seam used to
//!   fake Redis out in tests.

pub mod client;
pub mod lua_scripts;

pub use client::{RedisScriptRunner, ScriptRunner, ServerRegistryClient};
