use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use moka::future::Cache;

use super::{ErrorCounters, Session, SessionKey};
use crate::device::DeviceCapability;
use crate::error::ApiError;

/// Sessions cached by key.
///
/// Idle sessions are evicted after `time_to_idle`; evicted sessions are
/// dropped without an explicit disconnect, use
/// [`invalidate`](Self::invalidate) for an orderly teardown. All sessions
/// created through the pool report into the pool's [`ErrorCounters`].
pub struct SessionPool<D: DeviceCapability + 'static> {
    cache: Cache<SessionKey, Arc<Session<D>>>,
    counters: Arc<ErrorCounters>,
}

impl<D: DeviceCapability + 'static> Default for SessionPool<D> {
    fn default() -> Self {
        // Up to 100 sessions, evicted after 5 minutes without use.
        Self::new(100, Duration::from_secs(5 * 60))
    }
}

impl<D: DeviceCapability + 'static> SessionPool<D> {
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(time_to_idle)
            .build();
        Self {
            cache,
            counters: Arc::new(ErrorCounters::new()),
        }
    }

    pub fn counters(&self) -> &Arc<ErrorCounters> {
        &self.counters
    }

    /// Returns the session for `key`, creating it with `init` on a miss.
    ///
    /// Concurrent callers for the same key share a single `init` run. A
    /// failed `init` caches nothing.
    pub async fn get_or_insert_with<F, Fut>(
        &self,
        key: SessionKey,
        init: F,
    ) -> Result<Arc<Session<D>>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session<D>, ApiError>>,
    {
        let counters = Arc::clone(&self.counters);
        let session_key = key.clone();
        self.cache
            .try_get_with(key, async move {
                debug!("Creating session: {}", session_key);
                let session = init().await?;
                Ok::<_, ApiError>(Arc::new(
                    session.with_key(session_key).with_counters(counters),
                ))
            })
            .await
            .map_err(|e: Arc<ApiError>| e.as_ref().clone())
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<Session<D>>> {
        let session = self.cache.get(key).await;
        if session.is_some() {
            debug!("Cache hit: {}", key);
        }
        session
    }

    /// Removes the session for `key` and disconnects it.
    pub async fn invalidate(&self, key: &SessionKey) {
        let Some(session) = self.cache.remove(key).await else {
            return;
        };
        if let Err(e) = session.disconnect().await {
            warn!("Session {} did not disconnect cleanly: {}", key, e);
        }
    }

    /// Number of cached sessions.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
