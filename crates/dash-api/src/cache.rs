//! Tag-invalidated response cache in front of a `ConsoleApi`.
//!
//! List responses are cached per endpoint and request body for a bounded
//! time. Mutations invalidate the tags whose data they change, so the next
//! list call goes to the server again. Requests marked `refetch` skip the
//! lookup and replace the entry. Empty pages and log polls are never cached.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cursor::ListRequest;
use crate::error::ApiError;
use crate::service::ConsoleApi;
use crate::types::{
    DeleteVolumesRequest, Event, Instance, ListKind, LogPollRequest, LogPollResponse, Run,
    StopRunsRequest, Volume,
};

/// Invalidation tag attached to cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheTag {
    Runs,
    Instances,
    Events,
    Volumes,
    Logs,
}

impl From<ListKind> for CacheTag {
    fn from(kind: ListKind) -> Self {
        match kind {
            ListKind::Runs => Self::Runs,
            ListKind::Instances => Self::Instances,
            ListKind::Events => Self::Events,
            ListKind::Volumes => Self::Volumes,
        }
    }
}

/// Tags a mutation invalidates.
///
/// Stopping runs changes run and instance status and records events.
pub fn stop_runs_invalidates() -> &'static [CacheTag] {
    &[CacheTag::Runs, CacheTag::Instances, CacheTag::Events]
}

pub fn delete_volumes_invalidates() -> &'static [CacheTag] {
    &[CacheTag::Volumes, CacheTag::Events]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a response may be served without asking the server.
    pub ttl: Duration,
    /// Entries kept at most; the oldest is evicted first.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_entries: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub evictions: u64,
}

struct Entry {
    value: Value,
    stored_at: Instant,
}

type CacheKey = (CacheTag, String);

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    stats: CacheStats,
}

/// Caching wrapper around any `ConsoleApi`.
pub struct CachedConsoleApi {
    inner: Arc<dyn ConsoleApi>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl CachedConsoleApi {
    pub fn new(inner: Arc<dyn ConsoleApi>) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    pub fn with_config(inner: Arc<dyn ConsoleApi>, config: CacheConfig) -> Self {
        Self {
            inner,
            config: CacheConfig {
                max_entries: config.max_entries.max(1),
                ..config
            },
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Drop every cached response carrying one of `tags`.
    pub fn invalidate(&self, tags: &[CacheTag]) {
        let wanted: BTreeSet<CacheTag> = tags.iter().copied().collect();
        self.with_state(|state| {
            let before = state.entries.len();
            state.entries.retain(|(tag, _), _| !wanted.contains(tag));
            let removed = before - state.entries.len();
            state.stats.invalidations = state.stats.invalidations.saturating_add(1);
            debug!(?tags, removed, "cache invalidated");
        });
    }

    pub fn stats(&self) -> CacheStats {
        self.with_state(|state| state.stats)
    }

    pub fn len(&self) -> usize {
        self.with_state(|state| state.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> R {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn lookup<R: DeserializeOwned>(&self, key: &CacheKey) -> Option<R> {
        let ttl = self.config.ttl;
        let cached = self.with_state(|state| {
            let value = match state.entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() < ttl => Some(entry.value.clone()),
                Some(_) => {
                    state.entries.remove(key);
                    None
                }
                None => None,
            };
            if value.is_some() {
                state.stats.hits = state.stats.hits.saturating_add(1);
            } else {
                state.stats.misses = state.stats.misses.saturating_add(1);
            }
            value
        })?;
        match serde_json::from_value(cached) {
            Ok(value) => Some(value),
            Err(err) => {
                // a shape mismatch means the entry is unusable, refetch
                trace!(error = %err, "dropping undecodable cache entry");
                self.with_state(|state| state.entries.remove(key));
                None
            }
        }
    }

    fn store<R: Serialize>(&self, key: CacheKey, value: &R) {
        let Ok(json) = serde_json::to_value(value) else {
            return;
        };
        let max_entries = self.config.max_entries;
        self.with_state(|state| {
            state.entries.insert(
                key,
                Entry {
                    value: json,
                    stored_at: Instant::now(),
                },
            );
            while state.entries.len() > max_entries {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(key, _)| key.clone());
                let Some(oldest) = oldest else { break };
                state.entries.remove(&oldest);
                state.stats.evictions = state.stats.evictions.saturating_add(1);
            }
        });
    }

    async fn cached_list<R, F>(&self, kind: ListKind, req: &ListRequest, fetch: F) -> Result<Vec<R>, ApiError>
    where
        R: Serialize + DeserializeOwned + Send,
        F: std::future::Future<Output = Result<Vec<R>, ApiError>> + Send,
    {
        let key = (CacheTag::from(kind), req.to_body(kind).to_string());
        if !req.refetch {
            if let Some(hit) = self.lookup::<Vec<R>>(&key) {
                return Ok(hit);
            }
        }
        let fresh = fetch.await?;
        if fresh.is_empty() {
            // the end of a list is where new items show up
            self.with_state(|state| state.entries.remove(&key));
        } else {
            self.store(key, &fresh);
        }
        Ok(fresh)
    }
}

#[async_trait]
impl ConsoleApi for CachedConsoleApi {
    async fn list_runs(&self, req: &ListRequest) -> Result<Vec<Run>, ApiError> {
        self.cached_list(ListKind::Runs, req, self.inner.list_runs(req))
            .await
    }

    async fn list_instances(&self, req: &ListRequest) -> Result<Vec<Instance>, ApiError> {
        self.cached_list(ListKind::Instances, req, self.inner.list_instances(req))
            .await
    }

    async fn list_events(&self, req: &ListRequest) -> Result<Vec<Event>, ApiError> {
        self.cached_list(ListKind::Events, req, self.inner.list_events(req))
            .await
    }

    async fn list_volumes(&self, req: &ListRequest) -> Result<Vec<Volume>, ApiError> {
        self.cached_list(ListKind::Volumes, req, self.inner.list_volumes(req))
            .await
    }

    async fn poll_logs(
        &self,
        project: &str,
        req: &LogPollRequest,
    ) -> Result<LogPollResponse, ApiError> {
        self.inner.poll_logs(project, req).await
    }

    async fn stop_runs(&self, project: &str, req: &StopRunsRequest) -> Result<(), ApiError> {
        self.inner.stop_runs(project, req).await?;
        self.invalidate(stop_runs_invalidates());
        Ok(())
    }

    async fn delete_volumes(
        &self,
        project: &str,
        req: &DeleteVolumesRequest,
    ) -> Result<(), ApiError> {
        self.inner.delete_volumes(project, req).await?;
        self.invalidate(delete_volumes_invalidates());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cursor::ListFilter;
    use crate::mock::{test_run, test_runs, test_volume, MockConsoleApi};

    #[tokio::test]
    async fn repeated_list_is_served_from_cache() {
        let mock = Arc::new(MockConsoleApi::new().with_runs(test_runs("main", 3)));
        let cached = CachedConsoleApi::new(mock.clone());
        let req = ListRequest::first(ListFilter::project("main"), 10);

        let first = cached.list_runs(&req).await.unwrap();
        let second = cached.list_runs(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(
            cached.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                invalidations: 0,
                evictions: 0,
            }
        );
    }

    #[tokio::test]
    async fn refetch_bypasses_and_replaces_the_entry() {
        let mock = Arc::new(MockConsoleApi::new().with_runs(test_runs("main", 1)));
        let cached = CachedConsoleApi::new(mock.clone());
        let req = ListRequest::first(ListFilter::project("main"), 10);

        assert_eq!(cached.list_runs(&req).await.unwrap().len(), 1);
        mock.push_runs([test_run("r100", "main", 100)]);

        assert_eq!(cached.list_runs(&req.refetched()).await.unwrap().len(), 2);
        assert_eq!(cached.list_runs(&req).await.unwrap().len(), 2);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let mock = Arc::new(MockConsoleApi::new().with_runs(test_runs("main", 1)));
        let cached = CachedConsoleApi::with_config(
            mock.clone(),
            CacheConfig {
                ttl: Duration::from_secs(5),
                max_entries: 8,
            },
        );
        let req = ListRequest::first(ListFilter::default(), 10);

        cached.list_runs(&req).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        cached.list_runs(&req).await.unwrap();
        assert_eq!(mock.call_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cached.list_runs(&req).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_entry_is_evicted_past_capacity() {
        let mock = Arc::new(MockConsoleApi::new().with_runs(test_runs("main", 3)));
        let cached = CachedConsoleApi::with_config(
            mock.clone(),
            CacheConfig {
                ttl: Duration::from_secs(60),
                max_entries: 2,
            },
        );
        for limit in 1..=3 {
            cached
                .list_runs(&ListRequest::first(ListFilter::default(), limit))
                .await
                .unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(cached.len(), 2);
        assert_eq!(cached.stats().evictions, 1);

        cached
            .list_runs(&ListRequest::first(ListFilter::default(), 1))
            .await
            .unwrap();
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn empty_pages_are_not_cached() {
        let mock = Arc::new(MockConsoleApi::new());
        let cached = CachedConsoleApi::new(mock.clone());
        let req = ListRequest::first(ListFilter::default(), 10);

        assert!(cached.list_runs(&req).await.unwrap().is_empty());
        assert!(cached.is_empty());
        mock.push_runs([test_run("r000", "main", 0)]);
        assert_eq!(cached.list_runs(&req).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_runs_keeps_volume_lists_cached() {
        let mock = Arc::new(
            MockConsoleApi::new()
                .with_runs(test_runs("main", 2))
                .with_volumes(vec![test_volume("v1", "main", 0)]),
        );
        let cached = CachedConsoleApi::new(mock.clone());
        let req = ListRequest::first(ListFilter::project("main"), 10);

        cached.list_runs(&req).await.unwrap();
        cached.list_volumes(&req).await.unwrap();
        assert_eq!(cached.len(), 2);

        cached
            .stop_runs(
                "main",
                &StopRunsRequest {
                    runs_names: vec!["run-r000".into()],
                    abort: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(cached.len(), 1);

        let runs = cached.list_runs(&req).await.unwrap();
        assert!(runs.iter().any(|run| run.status.is_finished()));
        cached.list_volumes(&req).await.unwrap();
        assert_eq!(mock.list_requests(ListKind::Runs).len(), 2);
        assert_eq!(mock.list_requests(ListKind::Volumes).len(), 1);
        assert_eq!(
            stop_runs_invalidates(),
            &[CacheTag::Runs, CacheTag::Instances, CacheTag::Events]
        );
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let mock = Arc::new(MockConsoleApi::new().with_runs(test_runs("main", 1)));
        mock.fail_next(ApiError::transport("down"));
        let cached = CachedConsoleApi::new(mock.clone());
        let req = ListRequest::first(ListFilter::default(), 10);

        assert!(cached.list_runs(&req).await.is_err());
        assert!(cached.is_empty());
        assert_eq!(cached.list_runs(&req).await.unwrap().len(), 1);
    }
}
