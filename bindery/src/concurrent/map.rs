// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// The fixed number of stripe locks.
const STRIPES: usize = 16;

/// Hard ceiling on bins per stripe; past this the map stops resizing and
/// buckets simply grow.
const MAX_BINS_PER_STRIPE: usize = 1 << 16;

/// A thread-safe hash map striped over a fixed set of locks.
///
/// The map is logically a single power-of-two bin array guarded by 16
/// stripe locks. Stripe `i` owns every bin congruent to `i` modulo 16;
/// because resizing doubles the bin count (always a multiple of 16), an
/// entry never changes stripe, and a resize can rehash each stripe's bins
/// in place while holding every stripe lock in index order.
///
/// Consistency guarantees are deliberately approximate, matching what the
/// inspection cache needs:
///
/// * [`len`](Self::len) may lag concurrent mutation;
/// * [`snapshot`](Self::snapshot) locks one stripe at a time — it may miss
///   entries inserted while it runs, but never yields the same key twice
///   and never fails;
/// * [`get_or_insert_with`](Self::get_or_insert_with) runs its producer at
///   most once per absent key, under the stripe lock.
pub struct ConcurrentMap<K, V> {
    stripes: Box<[Mutex<Stripe<K, V>>]>,
    /// Bins owned by each stripe. Only written during a resize, while every
    /// stripe lock is held, so reading it under any single stripe lock is
    /// consistent.
    bins_per_stripe: AtomicUsize,
    len: AtomicUsize,
    hasher: RandomState,
}

struct Stripe<K, V> {
    bins: Vec<Vec<Entry<K, V>>>,
}

struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        let stripes = (0..STRIPES)
            .map(|_| Mutex::new(Stripe { bins: vec![Vec::new()] }))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            stripes,
            bins_per_stripe: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            hasher: RandomState::new(),
        }
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns the approximate number of entries.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns true if the map was empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a clone of the value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        let hash = self.hash(key);
        let stripe = self.stripes[stripe_index(hash)].lock().expect("stripe poisoned");
        // Re-read the bin count under the lock: a resize may have completed
        // between hashing and locking.
        let bins = self.bins_per_stripe.load(Ordering::Acquire);
        let bucket = &stripe.bins[local_index(hash, bins)];
        bucket
            .iter()
            .find(|entry| entry.hash == hash && &entry.key == key)
            .map(|entry| entry.value.clone())
    }

    /// Inserts `value` for `key`, returning the previous value if there was
    /// one. New entries append at the bucket tail; updates overwrite in
    /// place.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let hash = self.hash(&key);
        let previous = {
            let mut stripe = self.stripes[stripe_index(hash)].lock().expect("stripe poisoned");
            let bins = self.bins_per_stripe.load(Ordering::Acquire);
            let bucket = &mut stripe.bins[local_index(hash, bins)];
            match bucket
                .iter_mut()
                .find(|entry| entry.hash == hash && entry.key == key)
            {
                Some(entry) => Some(std::mem::replace(&mut entry.value, value)),
                None => {
                    bucket.push(Entry { hash, key, value });
                    self.len.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
        };
        if previous.is_none() {
            self.maybe_resize();
        }
        previous
    }

    /// Returns the value for `key`, running `producer` to create one if the
    /// key is absent. The producer runs at most once, under the stripe
    /// lock, so concurrent callers for the same key observe a single value.
    pub fn get_or_insert_with(&self, key: K, producer: impl FnOnce() -> V) -> V {
        let hash = self.hash(&key);
        let value = {
            let mut stripe = self.stripes[stripe_index(hash)].lock().expect("stripe poisoned");
            let bins = self.bins_per_stripe.load(Ordering::Acquire);
            let bucket = &mut stripe.bins[local_index(hash, bins)];
            if let Some(entry) = bucket
                .iter()
                .find(|entry| entry.hash == hash && entry.key == key)
            {
                return entry.value.clone();
            }
            let value = producer();
            bucket.push(Entry {
                hash,
                key,
                value: value.clone(),
            });
            self.len.fetch_add(1, Ordering::Relaxed);
            value
        };
        self.maybe_resize();
        value
    }

    /// Takes a snapshot of the map, one stripe at a time.
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        let mut entries = Vec::with_capacity(self.len());
        for stripe in self.stripes.iter() {
            let stripe = stripe.lock().expect("stripe poisoned");
            for bucket in &stripe.bins {
                for entry in bucket {
                    entries.push((entry.key.clone(), entry.value.clone()));
                }
            }
        }
        entries
    }

    fn hash(&self, key: &K) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Doubles the bin array once `len` reaches the total bin count.
    fn maybe_resize(&self) {
        let bins = self.bins_per_stripe.load(Ordering::Acquire);
        if self.len.load(Ordering::Relaxed) < bins * STRIPES || bins >= MAX_BINS_PER_STRIPE {
            return;
        }

        // Acquire every stripe lock in index order.
        let mut guards = Vec::with_capacity(STRIPES);
        for stripe in self.stripes.iter() {
            guards.push(stripe.lock().expect("stripe poisoned"));
        }

        // Re-check: another thread may have resized while we were waiting.
        let old_bins = self.bins_per_stripe.load(Ordering::Acquire);
        if self.len.load(Ordering::Relaxed) < old_bins * STRIPES || old_bins >= MAX_BINS_PER_STRIPE
        {
            return;
        }
        let new_bins = old_bins * 2;

        for guard in guards.iter_mut() {
            guard.bins.resize_with(new_bins, Vec::new);
            // Doubling only moves entries whose hash bit at the new
            // position is set, so each old bin unzips into itself and its
            // sibling at `local + old_bins`.
            for local in 0..old_bins {
                let bucket = std::mem::take(&mut guard.bins[local]);
                for entry in bucket {
                    let target = local_index(entry.hash, new_bins);
                    debug_assert!(target == local || target == local + old_bins);
                    guard.bins[target].push(entry);
                }
            }
        }

        // Publish while every stripe is still held.
        self.bins_per_stripe.store(new_bins, Ordering::Release);
    }
}

impl<K, V> std::fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

fn stripe_index(hash: u64) -> usize {
    (hash as usize) & (STRIPES - 1)
}

/// The bin index within a stripe. The low four hash bits pick the stripe;
/// the bits above them pick the bin.
fn local_index(hash: u64, bins_per_stripe: usize) -> usize {
    ((hash as usize) >> 4) & (bins_per_stripe - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_get_overwrite() {
        let map = ConcurrentMap::new();
        assert_eq!(map.insert("a", 1), None);
        assert_eq!(map.insert("b", 2), None);
        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.insert("a", 3), Some(1));
        assert_eq!(map.get(&"a"), Some(3));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn resize_preserves_entries() {
        let map = ConcurrentMap::new();
        // Well past several doublings.
        for i in 0..10_000u32 {
            map.insert(i, i * 2);
        }
        assert_eq!(map.len(), 10_000);
        for i in 0..10_000u32 {
            assert_eq!(map.get(&i), Some(i * 2), "entry {} lost in resize", i);
        }
    }

    #[test]
    fn concurrent_inserts_from_many_threads() {
        let map = Arc::new(ConcurrentMap::new());
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in 0..1_000u32 {
                    map.insert(t * 1_000 + i, t);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 8_000);
        for t in 0..8u32 {
            assert_eq!(map.get(&(t * 1_000)), Some(t));
        }
    }

    #[test]
    fn get_or_insert_runs_producer_at_most_once() {
        let map = Arc::new(ConcurrentMap::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let map = Arc::clone(&map);
            let calls = Arc::clone(&calls);
            handles.push(thread::spawn(move || {
                map.get_or_insert_with("key", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    42
                })
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_never_duplicates_keys() {
        let map = Arc::new(ConcurrentMap::new());
        for i in 0..100u32 {
            map.insert(i, ());
        }

        let writer = {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 100..5_000u32 {
                    map.insert(i, ());
                }
            })
        };

        for _ in 0..10 {
            let snapshot = map.snapshot();
            let mut keys: Vec<_> = snapshot.iter().map(|(k, _)| *k).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), snapshot.len(), "snapshot yielded a key twice");
        }
        writer.join().unwrap();

        // Quiescent snapshot sees everything.
        assert_eq!(map.snapshot().len(), 5_000);
    }
}
