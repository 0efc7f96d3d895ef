//! Time-bounded workgroup metadata cache
//!
//! One instance is built per client and shared by reference between sessions.
//! Concurrent misses for the same name collapse into a single remote lookup
//! whose outcome every waiter observes. Failed lookups are never stored.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::api::{QueryService, Workgroup};
use crate::error::RemoteError;

/// Entries live this long after the lookup that produced them completes
pub const WORKGROUP_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

const MAX_CACHED_WORKGROUPS: u64 = 1024;

pub struct WorkgroupCache {
    entries: Cache<String, Workgroup>,
    ttl: Duration,
}

impl WorkgroupCache {
    pub fn new() -> Self {
        Self::with_ttl(WORKGROUP_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_CACHED_WORKGROUPS)
            .time_to_live(ttl)
            .build();
        Self { entries, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached workgroup, or a fresh lookup when absent or expired.
    ///
    /// Waiters on the same in-flight lookup share its error through the `Arc`.
    /// The cache makes no decision about disabled workgroups.
    pub async fn resolve(
        &self,
        service: &dyn QueryService,
        name: &str,
    ) -> Result<Workgroup, Arc<RemoteError>> {
        self.entries
            .try_get_with(name.to_string(), async {
                debug!(target: "workgroup", workgroup = name, "looking up workgroup");
                service.get_workgroup(name).await
            })
            .await
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.get(name).await.is_some()
    }

    pub async fn invalidate(&self, name: &str) {
        self.entries.invalidate(name).await;
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for WorkgroupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::scripted::ScriptedService;

    #[tokio::test]
    async fn test_hit_skips_remote_lookup() {
        let service = ScriptedService::new();
        service.with_workgroup(Workgroup::enabled("analytics"));
        let cache = WorkgroupCache::new();

        let first = cache.resolve(&service, "analytics").await.unwrap();
        let second = cache.resolve(&service, "analytics").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.workgroup_lookups("analytics"), 1);
        assert!(cache.contains("analytics").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_lookup() {
        let service = Arc::new(ScriptedService::new());
        service
            .with_workgroup(Workgroup::enabled("analytics"))
            .with_workgroup_latency(Duration::from_millis(100));
        let cache = Arc::new(WorkgroupCache::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.resolve(service.as_ref(), "analytics").await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(service.workgroup_lookups("analytics"), 1);
        assert!(results.iter().all(|wg| *wg == results[0]));
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_error() {
        let service = ScriptedService::new();
        service
            .with_workgroup_error("ghost", RemoteError::new("access denied"))
            .with_workgroup_latency(Duration::from_millis(50));
        let cache = WorkgroupCache::new();

        let (a, b) = tokio::join!(cache.resolve(&service, "ghost"), cache.resolve(&service, "ghost"));
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.message, "access denied");
        assert_eq!(service.workgroup_lookups("ghost"), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let service = ScriptedService::new();
        let cache = WorkgroupCache::new();

        assert!(cache.resolve(&service, "etl").await.is_err());
        service.with_workgroup(Workgroup::enabled("etl"));
        assert!(cache.resolve(&service, "etl").await.is_ok());
        assert_eq!(service.workgroup_lookups("etl"), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_fetched_again_once() {
        let service = ScriptedService::new();
        service.with_workgroup(Workgroup::enabled("analytics"));
        let cache = WorkgroupCache::with_ttl(Duration::from_millis(100));

        cache.resolve(&service, "analytics").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        cache.resolve(&service, "analytics").await.unwrap();
        cache.resolve(&service, "analytics").await.unwrap();
        assert_eq!(service.workgroup_lookups("analytics"), 2);
    }

    #[tokio::test]
    async fn test_disabled_workgroup_is_cached_as_is() {
        let service = ScriptedService::new();
        service.with_workgroup(Workgroup::disabled("old"));
        let cache = WorkgroupCache::new();

        let wg = cache.resolve(&service, "old").await.unwrap();
        assert!(!wg.is_enabled());
        cache.invalidate("old").await;
        cache.resolve(&service, "old").await.unwrap();
        assert_eq!(service.workgroup_lookups("old"), 2);
    }
}
