use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::{panic_message, CacheError, ResourceProvider, Result};

/// When the eviction sweep starts reclaiming unpinned entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBudget {
    /// Maximum number of resident entries, pinned ones included.
    Entries(usize),
    /// Maximum combined weight of unpinned entries, as reported by the weigher.
    Weight(u64),
}

/// Point-in-time counters of a cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub resident: usize,
    pub pinned: usize,
    pub pending: usize,
    pub detached: usize,
    pub total_weight: u64,
    pub evictable_weight: u64,
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub evictions: u64,
}

type Weigher<K, R> = Box<dyn Fn(&K, &R) -> u64 + Send + Sync>;
type Disposer<K, R> = Box<dyn Fn(&K, &R) + Send + Sync>;

pub struct ResourceCacheBuilder<K, R> {
    name: String,
    provider: Box<dyn ResourceProvider<K, R>>,
    budget: CacheBudget,
    weigher: Option<Weigher<K, R>>,
    disposer: Option<Disposer<K, R>>,
}

impl<K, R> ResourceCacheBuilder<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn budget(mut self, budget: CacheBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Weight of a built resource. Without a weigher every entry weighs 1.
    pub fn weigher(mut self, weigher: impl Fn(&K, &R) -> u64 + Send + Sync + 'static) -> Self {
        self.weigher = Some(Box::new(weigher));
        self
    }

    /// Teardown run exactly once per built resource, after its last handle is
    /// released and it has been evicted, invalidated or the cache closed.
    pub fn disposer(mut self, disposer: impl Fn(&K, &R) + Send + Sync + 'static) -> Self {
        self.disposer = Some(Box::new(disposer));
        self
    }

    pub fn build(self) -> ResourceCache<K, R> {
        ResourceCache {
            shared: Arc::new(Shared {
                name: self.name,
                provider: self.provider,
                budget: self.budget,
                weigher: self.weigher,
                disposer: self.disposer,
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    detached: HashMap::new(),
                    next_id: 0,
                    release_clock: 0,
                    closed: false,
                    hits: 0,
                    misses: 0,
                    builds: 0,
                    evictions: 0,
                }),
            }),
        }
    }
}

/// Keyed cache of lazily built, reference-counted resources.
///
/// Cloning yields another view of the same cache.
pub struct ResourceCache<K, R> {
    shared: Arc<Shared<K, R>>,
}

impl<K, R> Clone for ResourceCache<K, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<K, R> {
    name: String,
    provider: Box<dyn ResourceProvider<K, R>>,
    budget: CacheBudget,
    weigher: Option<Weigher<K, R>>,
    disposer: Option<Disposer<K, R>>,
    state: Mutex<State<K, R>>,
}

struct State<K, R> {
    entries: HashMap<K, Entry<R>>,
    /// Invalidated entries that were still pinned, keyed by entry id.
    detached: HashMap<u64, Detached<K, R>>,
    next_id: u64,
    release_clock: u64,
    closed: bool,
    hits: u64,
    misses: u64,
    builds: u64,
    evictions: u64,
}

struct Entry<R> {
    id: u64,
    slot: Slot<R>,
    refcount: usize,
    weight: u64,
    last_release: u64,
}

enum Slot<R> {
    Pending(Arc<BuildSlot<R>>),
    Ready(Arc<R>),
}

impl<R> Slot<R> {
    fn share(&self) -> Self {
        match self {
            Slot::Pending(build) => Slot::Pending(Arc::clone(build)),
            Slot::Ready(resource) => Slot::Ready(Arc::clone(resource)),
        }
    }
}

struct Detached<K, R> {
    key: K,
    resource: Arc<R>,
    refcount: usize,
}

/// Rendezvous between the single builder of a key and the callers waiting on it.
struct BuildSlot<R> {
    outcome: Mutex<Option<Result<Arc<R>>>>,
    done: Condvar,
}

impl<R> BuildSlot<R> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Result<Arc<R>>) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Result<Arc<R>> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut outcome);
        }
    }
}

type Disposal<K, R> = Vec<(K, Arc<R>)>;

impl<K, R> ResourceCache<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn builder(name: impl Into<String>, provider: impl ResourceProvider<K, R> + 'static) -> ResourceCacheBuilder<K, R> {
        ResourceCacheBuilder {
            name: name.into(),
            provider: Box::new(provider),
            budget: CacheBudget::Entries(usize::MAX),
            weigher: None,
            disposer: None,
        }
    }

    /// Cache holding at most `capacity` resident entries.
    pub fn with_capacity(
        name: impl Into<String>,
        capacity: usize,
        provider: impl ResourceProvider<K, R> + 'static,
        disposer: impl Fn(&K, &R) + Send + Sync + 'static,
    ) -> Self {
        Self::builder(name, provider)
            .budget(CacheBudget::Entries(capacity))
            .disposer(disposer)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns a pinned handle to the resource for `key`, building it if needed.
    ///
    /// Concurrent calls for an absent key share a single provider invocation.
    /// A failed build is not cached; the next call retries it.
    pub fn get(&self, key: &K) -> Result<ResourceHandle<K, R>> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            return Err(CacheError::Closed {
                name: shared.name.clone(),
            });
        }

        let attached = state.entries.get_mut(key).map(|entry| {
            entry.refcount += 1;
            (entry.id, entry.slot.share())
        });
        if let Some((id, slot)) = attached {
            state.hits += 1;
            drop(state);
            let resource = match slot {
                Slot::Ready(resource) => {
                    tracing::debug!(target = "verifier.cache", cache = %shared.name, ?key, "cache hit");
                    resource
                }
                Slot::Pending(build) => {
                    tracing::debug!(target = "verifier.cache", cache = %shared.name, ?key, "waiting for in-flight build");
                    build.wait()?
                }
            };
            return Ok(self.handle(key, id, resource));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.misses += 1;
        let slot = Arc::new(BuildSlot::new());
        state.entries.insert(
            key.clone(),
            Entry {
                id,
                slot: Slot::Pending(Arc::clone(&slot)),
                refcount: 1,
                weight: 0,
                last_release: 0,
            },
        );
        drop(state);

        tracing::debug!(target = "verifier.cache", cache = %shared.name, ?key, "building resource");
        let outcome = self.provide(key);

        let mut state = shared.state.lock();
        let mut disposal = Vec::new();
        match &outcome {
            Ok(resource) => {
                let weight = shared.weigh(key, resource);
                if let Some(entry) = state.entries.get_mut(key).filter(|e| e.id == id) {
                    entry.slot = Slot::Ready(Arc::clone(resource));
                    entry.weight = weight;
                }
                state.builds += 1;
                disposal = shared.sweep(&mut state);
            }
            Err(err) => {
                if state.entries.get(key).is_some_and(|e| e.id == id) {
                    state.entries.remove(key);
                }
                tracing::warn!(target = "verifier.cache", cache = %shared.name, ?key, error = %err, "resource build failed");
            }
        }
        drop(state);

        slot.complete(outcome.clone());
        shared.dispose(disposal);
        outcome.map(|resource| self.handle(key, id, resource))
    }

    fn provide(&self, key: &K) -> Result<Arc<R>> {
        match catch_unwind(AssertUnwindSafe(|| self.shared.provider.provide(key))) {
            Ok(result) => result.into_result().map(Arc::new),
            Err(panic) => Err(CacheError::ProviderFailed {
                message: format!("provider panicked: {}", panic_message(panic.as_ref())),
                cause: None,
            }),
        }
    }

    fn handle(&self, key: &K, id: u64, resource: Arc<R>) -> ResourceHandle<K, R> {
        ResourceHandle {
            shared: Arc::clone(&self.shared),
            key: key.clone(),
            id,
            resource,
            released: false,
        }
    }

    /// Drops the cached resource for `key` so the next [`get`](Self::get)
    /// builds it again. Outstanding handles stay valid; the old resource is
    /// disposed when the last of them is released.
    ///
    /// Returns `false` if nothing was cached or a build is still in flight.
    pub fn invalidate(&self, key: &K) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let Some(entry) = state.entries.get(key) else {
            return false;
        };
        if matches!(entry.slot, Slot::Pending(_)) {
            return false;
        }
        let Some(entry) = state.entries.remove(key) else {
            return false;
        };
        let Slot::Ready(resource) = entry.slot else {
            return false;
        };

        let mut disposal = Vec::new();
        if entry.refcount == 0 {
            disposal.push((key.clone(), resource));
        } else {
            state.detached.insert(
                entry.id,
                Detached {
                    key: key.clone(),
                    resource,
                    refcount: entry.refcount,
                },
            );
        }
        drop(state);

        tracing::debug!(target = "verifier.cache", cache = %shared.name, ?key, "invalidated entry");
        shared.dispose(disposal);
        true
    }

    /// Whether a built resource is resident for `key`.
    pub fn contains(&self, key: &K) -> bool {
        matches!(
            self.shared.state.lock().entries.get(key),
            Some(Entry {
                slot: Slot::Ready(_),
                ..
            })
        )
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = CacheStats {
            detached: state.detached.len(),
            hits: state.hits,
            misses: state.misses,
            builds: state.builds,
            evictions: state.evictions,
            ..CacheStats::default()
        };
        for entry in state.entries.values() {
            match entry.slot {
                Slot::Pending(_) => stats.pending += 1,
                Slot::Ready(_) => {
                    stats.resident += 1;
                    stats.total_weight += entry.weight;
                    if entry.refcount > 0 {
                        stats.pinned += 1;
                    } else {
                        stats.evictable_weight += entry.weight;
                    }
                }
            }
        }
        stats
    }

    /// Rejects further `get` calls and disposes every unpinned resource.
    /// Pinned resources are disposed as their last handle is released.
    pub fn close(&self) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            return Err(CacheError::AlreadyClosed {
                name: shared.name.clone(),
            });
        }
        state.closed = true;

        let idle: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, e)| e.refcount == 0 && matches!(e.slot, Slot::Ready(_)))
            .map(|(k, _)| k.clone())
            .collect();
        let mut disposal = Vec::with_capacity(idle.len());
        for key in idle {
            if let Some(Entry {
                slot: Slot::Ready(resource),
                ..
            }) = state.entries.remove(&key)
            {
                disposal.push((key, resource));
            }
        }
        let pinned = state.entries.len();
        drop(state);

        tracing::info!(
            target = "verifier.cache",
            cache = %shared.name,
            disposed = disposal.len(),
            pinned,
            "cache closed"
        );
        shared.dispose(disposal);
        Ok(())
    }
}

impl<K, R> Shared<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn weigh(&self, key: &K, resource: &R) -> u64 {
        match &self.weigher {
            Some(weigher) => weigher(key, resource),
            None => 1,
        }
    }

    fn over_budget(&self, state: &State<K, R>) -> bool {
        match self.budget {
            CacheBudget::Entries(max) => {
                let resident = state
                    .entries
                    .values()
                    .filter(|e| matches!(e.slot, Slot::Ready(_)))
                    .count();
                resident > max
            }
            CacheBudget::Weight(max) => {
                let evictable: u64 = state
                    .entries
                    .values()
                    .filter(|e| e.refcount == 0 && matches!(e.slot, Slot::Ready(_)))
                    .map(|e| e.weight)
                    .sum();
                evictable > max
            }
        }
    }

    /// Removes unpinned entries, least recently released first, until the
    /// budget holds or only pinned entries remain.
    fn sweep(&self, state: &mut State<K, R>) -> Disposal<K, R> {
        let mut disposal = Vec::new();
        while self.over_budget(state) {
            let victim = state
                .entries
                .iter()
                .filter(|(_, e)| e.refcount == 0 && matches!(e.slot, Slot::Ready(_)))
                .min_by_key(|(_, e)| e.last_release)
                .map(|(k, _)| k.clone());
            let Some(key) = victim else {
                break;
            };
            if let Some(Entry {
                slot: Slot::Ready(resource),
                ..
            }) = state.entries.remove(&key)
            {
                state.evictions += 1;
                tracing::debug!(target = "verifier.cache", cache = %self.name, ?key, "evicting entry");
                disposal.push((key, resource));
            }
        }
        disposal
    }

    fn release(&self, key: &K, id: u64) {
        let mut state = self.state.lock();
        let mut disposal = Vec::new();

        if let Some(entry) = state.entries.get_mut(key).filter(|e| e.id == id) {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                state.release_clock += 1;
                let clock = state.release_clock;
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.last_release = clock;
                }
                if state.closed {
                    if let Some(Entry {
                        slot: Slot::Ready(resource),
                        ..
                    }) = state.entries.remove(key)
                    {
                        disposal.push((key.clone(), resource));
                    }
                } else {
                    disposal = self.sweep(&mut state);
                }
            }
        } else if let Some(detached) = state.detached.get_mut(&id) {
            detached.refcount = detached.refcount.saturating_sub(1);
            if detached.refcount == 0 {
                if let Some(detached) = state.detached.remove(&id) {
                    disposal.push((detached.key, detached.resource));
                }
            }
        }
        drop(state);

        self.dispose(disposal);
    }

    fn dispose(&self, disposal: Disposal<K, R>) {
        let Some(disposer) = &self.disposer else {
            return;
        };
        for (key, resource) in disposal {
            let result = catch_unwind(AssertUnwindSafe(|| disposer(&key, &resource)));
            if let Err(panic) = result {
                tracing::error!(
                    target = "verifier.cache",
                    cache = %self.name,
                    ?key,
                    panic = %panic_message(panic.as_ref()),
                    "disposer panicked"
                );
            }
        }
    }
}

/// A pin on a cached resource. Releasing it (explicitly or by drop) makes the
/// entry evictable once no other handle remains.
pub struct ResourceHandle<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    shared: Arc<Shared<K, R>>,
    key: K,
    id: u64,
    resource: Arc<R>,
    released: bool,
}

impl<K, R> ResourceHandle<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release(&self.key, self.id);
        }
    }
}

impl<K, R> Deref for ResourceHandle<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<K, R> Debug for ResourceHandle<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("cache", &self.shared.name)
            .field("key", &self.key)
            .finish()
    }
}

impl<K, R> Drop for ResourceHandle<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProvideResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_cache(capacity: usize) -> (ResourceCache<u32, String>, Arc<Mutex<Vec<u32>>>) {
        let disposed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&disposed);
        let cache = ResourceCache::with_capacity(
            "test",
            capacity,
            |key: &u32| ProvideResult::Provided(format!("resource-{key}")),
            move |key: &u32, _: &String| sink.lock().push(*key),
        );
        (cache, disposed)
    }

    #[test]
    fn hit_returns_same_instance() {
        let (cache, _) = counting_cache(4);
        let first = cache.get(&1).unwrap();
        let second = cache.get(&1).unwrap();
        assert!(Arc::ptr_eq(first.resource(), second.resource()));
        assert_eq!(&*first, "resource-1");
        let stats = cache.stats();
        assert_eq!((stats.builds, stats.hits, stats.misses), (1, 1, 1));
    }

    #[test]
    fn capacity_evicts_oldest_released_first() {
        let (cache, disposed) = counting_cache(2);
        cache.get(&1).unwrap().release();
        cache.get(&2).unwrap().release();
        cache.get(&1).unwrap().release();
        cache.get(&3).unwrap().release();

        assert_eq!(*disposed.lock(), vec![2]);
        assert!(cache.contains(&1));
        assert!(cache.contains(&3));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn not_found_and_failures_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: ResourceCache<&'static str, u8> = ResourceCache::builder("flaky", move |key: &&'static str| {
            counter.fetch_add(1, Ordering::SeqCst);
            match *key {
                "missing" => ProvideResult::NotFound("no such key".to_string()),
                _ => ProvideResult::Failed {
                    message: "boom".to_string(),
                    cause: None,
                },
            }
        })
        .build();

        assert!(cache.get(&"missing").unwrap_err().is_not_found());
        assert!(cache.get(&"missing").unwrap_err().is_not_found());
        assert!(matches!(cache.get(&"broken"), Err(CacheError::ProviderFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().resident, 0);
    }

    #[test]
    fn provider_panic_is_reported_as_failure() {
        let cache: ResourceCache<u8, u8> = ResourceCache::builder("panicky", |_: &u8| -> ProvideResult<u8> {
            panic!("provider exploded")
        })
        .build();

        let err = cache.get(&0).unwrap_err();
        assert!(err.to_string().contains("provider exploded"), "{err}");
        assert_eq!(cache.stats().pending, 0);
    }

    #[test]
    fn provider_error_keeps_its_cause() {
        let cache: ResourceCache<u8, u8> = ResourceCache::builder("io", |_: &u8| -> ProvideResult<u8> {
            Err::<u8, _>(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")).into()
        })
        .build();

        let err = cache.get(&0).unwrap_err();
        assert_eq!(err.cause().map(|c| c.to_string()), Some("denied".to_string()));
    }

    #[test]
    fn close_twice_is_an_error_and_get_after_close_is_rejected() {
        let (cache, disposed) = counting_cache(4);
        cache.get(&1).unwrap().release();
        let pinned = cache.get(&2).unwrap();

        cache.close().unwrap();
        assert_eq!(*disposed.lock(), vec![1]);
        assert!(matches!(cache.close(), Err(CacheError::AlreadyClosed { .. })));
        assert!(matches!(cache.get(&3), Err(CacheError::Closed { .. })));

        assert_eq!(&*pinned, "resource-2");
        drop(pinned);
        assert_eq!(*disposed.lock(), vec![1, 2]);
    }

    #[test]
    fn invalidate_detaches_pinned_entries() {
        let (cache, disposed) = counting_cache(4);
        let old = cache.get(&7).unwrap();
        assert!(cache.invalidate(&7));
        assert!(disposed.lock().is_empty());

        let fresh = cache.get(&7).unwrap();
        assert!(!Arc::ptr_eq(old.resource(), fresh.resource()));
        assert_eq!(cache.stats().detached, 1);

        old.release();
        assert_eq!(*disposed.lock(), vec![7]);
        assert_eq!(cache.stats().detached, 0);
        assert!(!cache.invalidate(&8));
    }

    #[test]
    fn disposer_panic_does_not_poison_the_cache() {
        let cache: ResourceCache<u8, u8> = ResourceCache::builder("dispose", |k: &u8| ProvideResult::Provided(*k))
            .budget(CacheBudget::Entries(1))
            .disposer(|_, _| panic!("teardown failed"))
            .build();

        cache.get(&1).unwrap().release();
        cache.get(&2).unwrap().release();
        assert!(cache.get(&3).is_ok());
        assert_eq!(cache.stats().evictions, 2);
    }
}
