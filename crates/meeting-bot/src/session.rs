//! Transcription session, host half (C4): bridges the shared server
//! registry (C5) to the in-page WebSocket session. The page owns the
//! WebSocket, the state machine, and the reconnection policy entirely
//! (`browser/scripts/transcription_session.js`); this module only ever
//! hands it server URLs and tracks which one is currently held so the slot
//! can be released on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::redis::{ScriptRunner, ServerRegistryClient};

/// Narrow seam `ChromePage::run_recording_with_registry` drives: "give me a
/// server" and "this one failed, give me another". Implemented for
/// `SessionRegistryBridge` so the controller only ever depends on the trait
/// object, not a concrete registry type.
#[async_trait]
pub trait ServerUrlSource: Send + Sync {
    /// Allocates a fresh server, tracking it as the currently-held slot.
    async fn allocate(&self) -> Option<String>;

    /// Reports `url` as failed: removes it from the ranking and allocates a
    /// replacement in one step, matching the registry's `fail()` then
    /// `allocate()` contract.
    async fn fail(&self, url: &str) -> Option<String>;

    /// Releases whatever slot is currently held, if any. Guaranteed to run
    /// on every exit path by graceful leave (C10).
    async fn release(&self);
}

/// Wraps a `ServerRegistryClient` with the one piece of state the bridge
/// needs beyond what the registry itself tracks: which URL *this* bot run
/// currently holds, so graceful leave can release exactly that slot and
/// nothing else.
pub struct SessionRegistryBridge<R: ScriptRunner> {
    registry: ServerRegistryClient<R>,
    current_url: Mutex<Option<String>>,
}

impl<R: ScriptRunner> SessionRegistryBridge<R> {
    #[must_use]
    pub fn new(registry: ServerRegistryClient<R>) -> Self {
        Self {
            registry,
            current_url: Mutex::new(None),
        }
    }

    /// The server URL currently held, if any.
    pub async fn current_url(&self) -> Option<String> {
        self.current_url.lock().await.clone()
    }

    /// Releases the currently-held slot, if any, and clears it. Safe to call
    /// on a bridge that never successfully allocated (a no-op): graceful
    /// leave calls this unconditionally on every exit path.
    #[instrument(skip(self))]
    pub async fn release(&self) {
        let mut guard = self.current_url.lock().await;
        if let Some(url) = guard.take() {
            self.registry.release(&url).await;
        }
    }
}

#[async_trait]
impl<R: ScriptRunner + 'static> ServerUrlSource for SessionRegistryBridge<R> {
    async fn allocate(&self) -> Option<String> {
        let url = self.registry.allocate().await;
        *self.current_url.lock().await = url.clone();
        url
    }

    async fn fail(&self, url: &str) -> Option<String> {
        let next = self.registry.fail_then_allocate(url).await;
        *self.current_url.lock().await = next.clone();
        next
    }

    async fn release(&self) {
        SessionRegistryBridge::release(self).await;
    }
}

/// Convenience constructor so call sites that only have a trait object
/// don't need to name `SessionRegistryBridge<R>` directly.
#[must_use]
pub fn bridge<R: ScriptRunner + 'static>(registry: ServerRegistryClient<R>) -> Arc<SessionRegistryBridge<R>> {
    Arc::new(SessionRegistryBridge::new(registry))
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! In-memory `ServerUrlSource` for controller tests that don't need
    //! real registry semantics, just a URL to hand back.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::ServerUrlSource;

    pub struct FakeUrlSource {
        url: Mutex<Option<String>>,
    }

    impl FakeUrlSource {
        #[must_use]
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                url: Mutex::new(Some(url.into())),
            }
        }

        #[must_use]
        pub fn empty() -> Self {
            Self { url: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl ServerUrlSource for FakeUrlSource {
        async fn allocate(&self) -> Option<String> {
            self.url.lock().expect("url lock").clone()
        }

        async fn fail(&self, _url: &str) -> Option<String> {
            self.url.lock().expect("url lock").clone()
        }

        async fn release(&self) {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::RegistryError;
    use std::collections::HashMap;
    use tokio::sync::Mutex as TokioMutex;

    struct FakeRunner {
        scores: TokioMutex<HashMap<String, i64>>,
    }

    impl FakeRunner {
        fn new(entries: &[(&str, i64)]) -> Self {
            Self {
                scores: TokioMutex::new(entries.iter().map(|(u, s)| ((*u).to_string(), *s)).collect()),
            }
        }
    }

    #[async_trait]
    impl ScriptRunner for FakeRunner {
        async fn allocate(&self, _key: &str, max_clients: u32) -> Result<Option<String>, RegistryError> {
            let mut scores = self.scores.lock().await;
            let mut ordered: Vec<(String, i64)> = scores.iter().map(|(k, v)| (k.clone(), *v)).collect();
            ordered.sort_by_key(|(_, s)| *s);
            let candidate = ordered
                .into_iter()
                .find(|(_, s)| *s < i64::from(max_clients))
                .map(|(u, _)| u);
            if let Some(url) = &candidate {
                *scores.get_mut(url).expect("present") += 1;
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
    async fn allocate_tracks_current_url() {
        let bridge = SessionRegistryBridge::new(ServerRegistryClient::new(FakeRunner::new(&[("a", 0)]), 10));
        let url = bridge.allocate().await;
        assert_eq!(url.as_deref(), Some("a"));
        assert_eq!(bridge.current_url().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn fail_rotates_current_url() {
        let bridge = SessionRegistryBridge::new(ServerRegistryClient::new(
            FakeRunner::new(&[("a", 0), ("b", 0)]),
            10,
        ));
        bridge.allocate().await;
        let next = bridge.fail("a").await;
        assert_eq!(next.as_deref(), Some("b"));
        assert_eq!(bridge.current_url().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn release_clears_current_url_and_is_idempotent() {
        let bridge = SessionRegistryBridge::new(ServerRegistryClient::new(FakeRunner::new(&[("a", 0)]), 10));
        bridge.allocate().await;
        bridge.release().await;
        assert_eq!(bridge.current_url().await, None);
        // Calling release again with nothing held must not panic or error.
        bridge.release().await;
    }

    #[tokio::test]
    async fn release_without_ever_allocating_is_a_no_op() {
        let bridge = SessionRegistryBridge::new(ServerRegistryClient::new(FakeRunner::new(&[]), 10));
        bridge.release().await;
        assert_eq!(bridge.current_url().await, None);
    }
}
