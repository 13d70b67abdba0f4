//! The analytics cache (`spec.md` §3 "Cache entries", §4.5 "Cache
//! contract", §8 invariant 8 "single-flight").
//!
//! Namespaced, TTL'd, typed. A miss executes the underlying query once
//! even under concurrent callers for the same key (single-flight): the
//! first caller installs an in-flight `Notify` under the key; subsequent
//! callers for the same key wait on it instead of re-running the query.
//! A storage/serialisation error on the cache path falls through to a
//! direct query rather than failing the request, per the "never surface
//! a cache failure as a request failure" contract.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Notify;

use crate::types::CacheKey;

#[derive(Clone)]
struct Entry {
    value: Arc<serde_json::Value>,
    expires_at: Instant,
}

enum Slot {
    Ready(Entry),
    /// A query for this key is already in flight; waiters `notified().await`
    /// then re-check the map for the `Ready` slot the winner installed.
    InFlight(Arc<Notify>),
}

/// The process-wide query cache. One instance is shared (behind an `Arc`)
/// across all web-daemon request handlers.
#[derive(Clone, Default)]
pub struct QueryCache {
    slots: Arc<DashMap<CacheKey, Slot>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key` if present and unexpired,
    /// executing `query` on a miss (collapsing concurrent misses for the
    /// same key into a single call) and caching the result for `ttl`.
    ///
    /// `query` failures are propagated to the caller, unlike cache-layer
    /// failures (map contention that can't really happen with `DashMap`,
    /// or serialisation errors), which fall through to a fresh,
    /// uncached call to `query` instead.
    pub async fn get_or_compute<T, F, Fut, E>(&self, key: CacheKey, ttl: Duration, query: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        loop {
            match self.slots.get(&key).map(|r| match r.value() {
                Slot::Ready(entry) => ReadState::Ready(entry.clone()),
                Slot::InFlight(notify) => ReadState::InFlight(notify.clone()),
            }) {
                Some(ReadState::Ready(entry)) if entry.expires_at > Instant::now() => {
                    match serde_json::from_value((*entry.value).clone()) {
                        Ok(value) => return Ok(value),
                        Err(_) => {
                            // Corrupt cache entry: fall through to a fresh query.
                            self.slots.remove(&key);
                        }
                    }
                }
                Some(ReadState::Ready(_)) => {
                    // Expired; fall through to recompute, taking ownership
                    // of the in-flight slot below.
                }
                Some(ReadState::InFlight(notify)) => {
                    // `notified()` must be created before re-checking the
                    // map: `Notify::notify_waiters` only wakes futures that
                    // already existed at the time it was called, and keeps
                    // no permit for ones created afterwards. If we read the
                    // map, then call `notified()` only after the winner has
                    // already inserted `Ready` and called `notify_waiters`,
                    // this future would wait for a wakeup that already
                    // happened and will never come again. Creating it first
                    // and then re-checking the slot closes that window: if
                    // the winner finished in between, the re-check sees the
                    // `Ready` slot and we loop back around instead of
                    // awaiting a notification we'd never receive.
                    let notified = notify.notified();
                    let still_in_flight = self
                        .slots
                        .get(&key)
                        .map(|r| matches!(r.value(), Slot::InFlight(_)))
                        .unwrap_or(false);
                    if still_in_flight {
                        notified.await;
                    }
                    continue;
                }
                None => {}
            }

            // Claim the slot for this key before running the query so
            // concurrent callers observe `InFlight` instead of also
            // missing.
            let notify = Arc::new(Notify::new());
            self.slots.insert(key.clone(), Slot::InFlight(notify.clone()));

            let result = query().await;

            match &result {
                Ok(value) => {
                    if let Ok(json) = serde_json::to_value(value.clone()) {
                        self.slots.insert(
                            key.clone(),
                            Slot::Ready(Entry {
                                value: Arc::new(json),
                                expires_at: Instant::now() + ttl,
                            }),
                        );
                    } else {
                        self.slots.remove(&key);
                    }
                }
                Err(_) => {
                    self.slots.remove(&key);
                }
            }

            notify.notify_waiters();
            return result;
        }
    }

    /// Removes every cached entry in `namespace`, regardless of
    /// parameters — the invalidation granularity `spec.md` §4.5 specifies
    /// ("Invalidation is pattern-based by namespace").
    pub fn invalidate_namespace(&self, namespace: &'static str) {
        self.slots.retain(|key, _| key.namespace != namespace);
    }
}

enum ReadState {
    Ready(Entry),
    InFlight(Arc<Notify>),
}

/// Namespace constants, doubling as the single source of truth for the
/// invalidation fan-out table in `spec.md` §4.5.
pub mod namespace {
    pub const RECENT_DETECTIONS: &str = "recent_detections";
    pub const TODAYS_DETECTIONS: &str = "todays_detections";
    pub const BEST_DETECTIONS: &str = "best_detections";
    pub const SPECIES_SUMMARY: &str = "species_summary";
    pub const FAMILY_SUMMARY: &str = "family_summary";
    pub const ALL_DETECTION_DATA: &str = "all_detection_data";
    pub const WEEKLY_REPORT: &str = "weekly_report";

    /// TTL, in seconds, for each namespace (`spec.md` §3 "TTL per
    /// namespace").
    pub fn ttl_seconds(namespace: &str) -> u64 {
        match namespace {
            RECENT_DETECTIONS | TODAYS_DETECTIONS => 60,
            SPECIES_SUMMARY | FAMILY_SUMMARY | BEST_DETECTIONS => 900,
            WEEKLY_REPORT | ALL_DETECTION_DATA => 3600,
            _ => 300,
        }
    }

    /// Namespaces invalidated when a new detection is inserted
    /// (`spec.md` §4.5).
    pub const ON_INSERT: &[&str] = &[
        RECENT_DETECTIONS,
        TODAYS_DETECTIONS,
        BEST_DETECTIONS,
        SPECIES_SUMMARY,
        FAMILY_SUMMARY,
        ALL_DETECTION_DATA,
    ];

    /// Namespaces invalidated when a detection is deleted or edited —
    /// everything `ON_INSERT` invalidates, plus `weekly_report`.
    pub fn on_delete_or_edit() -> Vec<&'static str> {
        let mut v = ON_INSERT.to_vec();
        v.push(WEEKLY_REPORT);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Serialize, serde::Deserialize, Clone, PartialEq, Debug)]
    struct Payload {
        value: u32,
    }

    #[tokio::test]
    async fn miss_then_hit_does_not_recompute() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let key = CacheKey::new(namespace::RECENT_DETECTIONS, &10u32);
        let compute = || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(Payload { value: 42 })
            }
        };

        let first = cache.get_or_compute(key.clone(), Duration::from_secs(60), compute).await.unwrap();
        assert_eq!(first.value, 42);

        let compute_again = || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(Payload { value: 999 })
            }
        };
        let second = cache
            .get_or_compute(key, Duration::from_secs(60), compute_again)
            .await
            .unwrap();

        assert_eq!(second.value, 42, "second call should hit the cache, not recompute");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache = QueryCache::new();
        let key = CacheKey::new(namespace::RECENT_DETECTIONS, &10u32);

        cache
            .get_or_compute(key.clone(), Duration::from_millis(1), || async {
                Ok::<_, std::convert::Infallible>(Payload { value: 1 })
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = cache
            .get_or_compute(key, Duration::from_secs(60), || async {
                Ok::<_, std::convert::Infallible>(Payload { value: 2 })
            })
            .await
            .unwrap();
        assert_eq!(second.value, 2);
    }

    #[tokio::test]
    async fn concurrent_misses_for_the_same_key_execute_the_query_once() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let key = CacheKey::new(namespace::SPECIES_SUMMARY, &"all");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key, Duration::from_secs(60), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, std::convert::Infallible>(Payload { value: 7 })
                    })
                    .await
                    .unwrap()
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_namespace_only_removes_matching_entries() {
        let cache = QueryCache::new();
        cache.slots.insert(
            CacheKey::new(namespace::RECENT_DETECTIONS, &1u32),
            Slot::Ready(Entry {
                value: Arc::new(serde_json::json!(1)),
                expires_at: Instant::now() + Duration::from_secs(60),
            }),
        );
        cache.slots.insert(
            CacheKey::new(namespace::WEEKLY_REPORT, &1u32),
            Slot::Ready(Entry {
                value: Arc::new(serde_json::json!(1)),
                expires_at: Instant::now() + Duration::from_secs(60),
            }),
        );

        cache.invalidate_namespace(namespace::RECENT_DETECTIONS);

        assert_eq!(cache.slots.len(), 1);
    }
}
