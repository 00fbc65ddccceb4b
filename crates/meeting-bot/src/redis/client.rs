//! Server registry client (C5): atomic least-loaded allocation over a
//! shared ranked Redis sorted set. A cheaply-cloneable client wrapping a
//! `MultiplexedConnection` plus precompiled `redis::Script`s, with a
//! fakeable script-runner trait underneath so registry semantics (allocate,
//! release, fail) are unit tested without a live Redis.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tracing::{debug, instrument, warn};

use crate::errors::RegistryError;
use crate::redis::lua_scripts;

/// Registry key: a sorted set of `server_url -> load score`.
pub const RANKING_KEY: &str = "wl:rank";

/// Seam that `ServerRegistryClient` drives; a real impl runs the Lua
/// scripts over Redis, a fake impl in tests holds an in-memory map.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn allocate(&self, key: &str, max_clients: u32) -> Result<Option<String>, RegistryError>;
    async fn release(&self, key: &str, url: &str) -> Result<(), RegistryError>;
    async fn fail(&self, key: &str, url: &str) -> Result<(), RegistryError>;
}

/// Redis-backed `ScriptRunner`. Cheaply cloneable: the underlying
/// `MultiplexedConnection` is designed for concurrent use without locking.
#[derive(Clone)]
pub struct RedisScriptRunner {
    connection: MultiplexedConnection,
    allocate_script: Script,
    release_script: Script,
    fail_script: Script,
}

impl RedisScriptRunner {
    /// # Errors
    /// Returns `RegistryError::Redis` if the connection cannot be opened.
    pub async fn connect(redis_url: &str) -> Result<Self, RegistryError> {
        let client = Client::open(redis_url)
            .map_err(|e| RegistryError::Redis(format!("failed to open redis client: {e}")))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RegistryError::Redis(format!("failed to connect to redis: {e}")))?;

        Ok(Self {
            connection,
            allocate_script: Script::new(lua_scripts::ALLOCATE),
            release_script: Script::new(lua_scripts::RELEASE),
            fail_script: Script::new(lua_scripts::FAIL),
        })
    }
}

#[async_trait]
impl ScriptRunner for RedisScriptRunner {
    async fn allocate(&self, key: &str, max_clients: u32) -> Result<Option<String>, RegistryError> {
        let mut conn = self.connection.clone();
        // A Lua `false` return converts to a RESP nil reply, which
        // `Option<String>` decodes as `None` — no server qualified.
        self.allocate_script
            .key(key)
            .arg(max_clients)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RegistryError::Redis(format!("allocate failed: {e}")))
    }

    async fn release(&self, key: &str, url: &str) -> Result<(), RegistryError> {
        let mut conn = self.connection.clone();
        let _: i64 = self
            .release_script
            .key(key)
            .arg(url)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RegistryError::Redis(format!("release failed: {e}")))?;
        Ok(())
    }

    async fn fail(&self, key: &str, url: &str) -> Result<(), RegistryError> {
        let mut conn = self.connection.clone();
        let _: i64 = self
            .fail_script
            .key(key)
            .arg(url)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RegistryError::Redis(format!("fail failed: {e}")))?;
        Ok(())
    }
}

/// Server registry client (C5). A bot holds at most one slot at any time;
/// `fail_then_allocate` is the reconnect path: fail the prior URL, then
/// allocate fresh, so reconnects never double-count a dead server.
#[derive(Clone)]
pub struct ServerRegistryClient<R: ScriptRunner> {
    runner: R,
    max_clients: u32,
}

impl<R: ScriptRunner> ServerRegistryClient<R> {
    #[must_use]
    pub fn new(runner: R, max_clients: u32) -> Self {
        Self { runner, max_clients }
    }

    /// Scan ascending by score, atomically increment the first entry under
    /// `max_clients`. Registry errors surface as `None` (retry after 5s),
    /// never as a bot failure.
    #[instrument(skip(self))]
    pub async fn allocate(&self) -> Option<String> {
        match self.runner.allocate(RANKING_KEY, self.max_clients).await {
            Ok(Some(url)) => {
                debug!(server_url = %url, "allocated transcription server");
                Some(url)
            }
            Ok(None) => {
                debug!("no transcription server under capacity");
                None
            }
            Err(err) => {
                warn!(error = %err, "registry allocate failed, treating as no candidate");
                None
            }
        }
    }

    /// Decrement a server's score. Guaranteed on all exit paths (leave,
    /// error, removal, alone-timeout) by the graceful-leave step (C10).
    #[instrument(skip(self))]
    pub async fn release(&self, url: &str) {
        if let Err(err) = self.runner.release(RANKING_KEY, url).await {
            warn!(error = %err, server_url = %url, "registry release failed");
        }
    }

    /// Remove a server from the ranking, then allocate a fresh one. Used
    /// by the stubborn reconnect policy, which fails the prior URL before
    /// requesting the next candidate.
    #[instrument(skip(self))]
    pub async fn fail_then_allocate(&self, failed_url: &str) -> Option<String> {
        if let Err(err) = self.runner.fail(RANKING_KEY, failed_url).await {
            warn!(error = %err, server_url = %failed_url, "registry fail failed");
        }
        self.allocate().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory `ScriptRunner` reproducing the Lua scripts' semantics, so
    /// registry allocate/release/fail logic is tested without a live
    /// Redis.
    struct FakeRunner {
        scores: Mutex<HashMap<String, i64>>,
    }

    impl FakeRunner {
        fn new(entries: &[(&str, i64)]) -> Self {
            Self {
                scores: Mutex::new(
                    entries
                        .iter()
                        .map(|(url, score)| ((*url).to_string(), *score))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ScriptRunner for FakeRunner {
        async fn allocate(
            &self,
            _key: &str,
            max_clients: u32,
        ) -> Result<Option<String>, RegistryError> {
            let mut scores = self.scores.lock().await;
            let mut ordered: Vec<(&String, &i64)> = scores.iter().collect();
            ordered.sort_by_key(|(_, score)| **score);
            let candidate = ordered
                .into_iter()
                .find(|(_, score)| **score < i64::from(max_clients))
                .map(|(url, _)| url.clone());

            if let Some(url) = &candidate {
                *scores.get_mut(url).expect("url present") += 1;
            }
            Ok(candidate)
        }

        async fn release(&self, _key: &str, url: &str) -> Result<(), RegistryError> {
            let mut scores = self.scores.lock().await;
            if let Some(score) = scores.get_mut(url) {
                *score = (*score - 1).max(0);
            }
            Ok(())
        }

        async fn fail(&self, _key: &str, url: &str) -> Result<(), RegistryError> {
            self.scores.lock().await.remove(url);
            Ok(())
        }
    }

    #[tokio::test]
    async fn allocate_picks_least_loaded_under_cap() {
        let runner = FakeRunner::new(&[("a", 3), ("b", 1), ("c", 9)]);
        let registry = ServerRegistryClient::new(runner, 10);
        assert_eq!(registry.allocate().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn allocate_skips_servers_at_capacity() {
        let runner = FakeRunner::new(&[("a", 10), ("b", 10)]);
        let registry = ServerRegistryClient::new(runner, 10);
        assert_eq!(registry.allocate().await, None);
    }

    #[tokio::test]
    async fn release_decrements_and_clamps_at_zero() {
        let runner = FakeRunner::new(&[("a", 0)]);
        let registry = ServerRegistryClient::new(runner, 10);
        registry.release("a").await;
        assert_eq!(registry.allocate().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn fail_then_allocate_removes_server_before_reallocating() {
        let runner = FakeRunner::new(&[("a", 1), ("b", 5)]);
        let registry = ServerRegistryClient::new(runner, 10);
        // "a" fails; the next allocation must not return "a" again even
        // though its pre-fail score was lower than "b"'s.
        let next = registry.fail_then_allocate("a").await;
        assert_eq!(next.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn allocate_returns_none_when_registry_empty() {
        let runner = FakeRunner::new(&[]);
        let registry = ServerRegistryClient::new(runner, 10);
        assert_eq!(registry.allocate().await, None);
    }
}
