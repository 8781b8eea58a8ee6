//! ChainedMap: open-hashing table with a power-of-two bucket array and
//! arena-backed bucket chains.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::{DefaultKey, SlotMap};

/// Number of buckets a fresh map starts with (capped by the max capacity).
pub const INIT_CAPACITY: usize = 8;

/// Load factor above which an insert doubles the bucket array.
pub const MAX_LOAD_FACTOR: f64 = 0.5;

// Largest power of two representable in a usize; the "unbounded" ceiling.
const UNBOUNDED_CAPACITY: usize = 1 << (usize::BITS - 1);

/// Misconfiguration reported by the fallible constructors.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max capacity must be at least 1 bucket")]
    ZeroMaxCapacity,
}

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,
    pub(crate) next: Option<DefaultKey>,
}

#[derive(Copy, Clone, Debug, Default)]
struct Bucket {
    first: Option<DefaultKey>,
    len: usize,
}

enum Probe {
    Occupied(DefaultKey),
    Vacant { tail: Option<DefaultKey> },
}

/// Chained hash map whose entries live in a generational arena.
///
/// Each bucket heads a singly linked chain of entries. Links are arena keys,
/// so moving an entry to another bucket during a resize only rewrites keys;
/// the entry itself never moves or gets copied.
pub struct ChainedMap<K, V, S = DefaultHashBuilder> {
    hasher: S,
    buckets: Box<[Bucket]>,
    slots: SlotMap<DefaultKey, Entry<K, V>>, // freed slots are recycled by later inserts
    max_capacity: usize,
}

/// Borrowed view of one stored key/value pair.
pub struct EntryRef<'a, K, V> {
    key: &'a K,
    value: &'a V,
}

impl<'a, K, V> EntryRef<'a, K, V> {
    pub(crate) fn from_entry(entry: &'a Entry<K, V>) -> Self {
        Self {
            key: &entry.key,
            value: &entry.value,
        }
    }

    pub fn key(&self) -> &'a K {
        self.key
    }

    pub fn value(&self) -> &'a V {
        self.value
    }
}

impl<K, V> Clone for EntryRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for EntryRef<'_, K, V> {}

impl<K: PartialEq, V: PartialEq> PartialEq for EntryRef<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl<K: core::fmt::Debug, V: core::fmt::Debug> core::fmt::Debug for EntryRef<'_, K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("EntryRef")
            .field(self.key)
            .field(self.value)
            .finish()
    }
}

/// Outcome of `insert`. On a duplicate key this refers to the pair that was
/// already stored and `successful()` is false.
#[derive(Debug)]
pub struct InsertResult<'a, K, V> {
    key: &'a K,
    value: &'a mut V,
    inserted: bool,
}

impl<'a, K, V> InsertResult<'a, K, V> {
    pub fn successful(&self) -> bool {
        self.inserted
    }

    pub fn key(&self) -> &K {
        self.key
    }

    pub fn value(&self) -> &V {
        self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        self.value
    }
}

/// Outcome of `update`; always successful. `previous` holds the value that
/// was overwritten, if the key was already present.
#[derive(Debug)]
pub struct UpdateResult<'a, K, V> {
    key: &'a K,
    value: &'a mut V,
    previous: Option<V>,
}

impl<'a, K, V> UpdateResult<'a, K, V> {
    pub fn successful(&self) -> bool {
        true
    }

    pub fn key(&self) -> &K {
        self.key
    }

    pub fn value(&self) -> &V {
        self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        self.value
    }

    pub fn previous(&self) -> Option<&V> {
        self.previous.as_ref()
    }

    pub fn into_previous(self) -> Option<V> {
        self.previous
    }
}

/// Key/value pair unlinked by `remove`, handed back by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed<K, V> {
    key: K,
    value: V,
}

impl<K, V> Removed<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_key(self) -> K {
        self.key
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

/// Diagnostic snapshot produced by `ChainedMap::stats`. Depth figures are
/// taken over every bucket, empty ones included.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MapStats {
    pub count: usize,
    pub capacity: usize,
    pub max_capacity: usize,
    pub load_factor: f64,
    pub min_bucket_depth: usize,
    pub max_bucket_depth: usize,
    pub avg_bucket_depth: f64,
}

impl<K, V> ChainedMap<K, V>
where
    K: Eq + Hash,
{
    /// Unbounded map with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    /// Map whose bucket array never grows beyond `max_capacity` buckets
    /// (rounded down to a power of two).
    pub fn with_max_capacity(max_capacity: usize) -> Result<Self, ConfigError> {
        Self::with_max_capacity_and_hasher(max_capacity, Default::default())
    }
}

impl<K, V> Default for ChainedMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ChainedMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_ceiling(UNBOUNDED_CAPACITY, hasher)
    }

    pub fn with_max_capacity_and_hasher(max_capacity: usize, hasher: S) -> Result<Self, ConfigError> {
        if max_capacity == 0 {
            return Err(ConfigError::ZeroMaxCapacity);
        }
        Ok(Self::with_ceiling(prev_power_of_two(max_capacity), hasher))
    }

    fn with_ceiling(max_capacity: usize, hasher: S) -> Self {
        debug_assert!(max_capacity.is_power_of_two());
        Self {
            hasher,
            buckets: empty_buckets(INIT_CAPACITY.min(max_capacity)),
            slots: SlotMap::with_key(),
            max_capacity,
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        // capacity is always a power of two
        (hash as usize) & (self.buckets.len() - 1)
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Ceiling on the number of buckets.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    pub fn lookup<Q>(&self, q: &Q) -> Option<EntryRef<'_, K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.find_slot(hash, q)
            .map(|k| EntryRef::from_entry(&self.slots[k]))
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.find_slot(hash, q).is_some()
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let k = self.find_slot(hash, q)?;
        Some(&mut self.slots[k].value)
    }

    /// Insert a new pair at the tail of its bucket chain. An existing key is
    /// left untouched and reported through `successful() == false`.
    pub fn insert(&mut self, key: K, value: V) -> InsertResult<'_, K, V> {
        let hash = self.make_hash(&key);
        let (slot, inserted) = match self.probe(hash, &key) {
            Probe::Occupied(k) => (k, false),
            Probe::Vacant { tail } => {
                let k = self.link(hash, tail, key, value);
                self.grow_if_needed();
                (k, true)
            }
        };
        let entry = &mut self.slots[slot];
        InsertResult {
            key: &entry.key,
            value: &mut entry.value,
            inserted,
        }
    }

    /// Insert-or-overwrite.
    pub fn update(&mut self, key: K, value: V) -> UpdateResult<'_, K, V> {
        let hash = self.make_hash(&key);
        let (slot, previous) = match self.probe(hash, &key) {
            Probe::Occupied(k) => (k, Some(core::mem::replace(&mut self.slots[k].value, value))),
            Probe::Vacant { tail } => {
                let k = self.link(hash, tail, key, value);
                self.grow_if_needed();
                (k, None)
            }
        };
        let entry = &mut self.slots[slot];
        UpdateResult {
            key: &entry.key,
            value: &mut entry.value,
            previous,
        }
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<Removed<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let index = self.bucket_index(hash);
        let mut prev: Option<DefaultKey> = None;
        let mut cursor = self.buckets[index].first;
        while let Some(k) = cursor {
            let entry = &self.slots[k];
            if entry.hash == hash && entry.key.borrow() == q {
                let next = entry.next;
                match prev {
                    Some(p) => self.slots[p].next = next,
                    None => self.buckets[index].first = next,
                }
                self.buckets[index].len -= 1;
                let entry = self.slots.remove(k).expect("linked slot must be live");
                return Some(Removed {
                    key: entry.key,
                    value: entry.value,
                });
            }
            prev = Some(k);
            cursor = entry.next;
        }
        None
    }

    /// O(capacity) walk over the bucket array.
    pub fn stats(&self) -> MapStats {
        let (min, max) = self
            .buckets
            .iter()
            .fold((usize::MAX, 0), |(lo, hi), b| (lo.min(b.len), hi.max(b.len)));
        MapStats {
            count: self.len(),
            capacity: self.capacity(),
            max_capacity: self.max_capacity,
            load_factor: self.load_factor(),
            min_bucket_depth: min,
            max_bucket_depth: max,
            avg_bucket_depth: self.load_factor(),
        }
    }

    pub(crate) fn hash_of(&self, key: &K) -> u64 {
        self.make_hash(key)
    }

    pub(crate) fn chain_head(&self, hash: u64) -> Option<DefaultKey> {
        self.buckets[self.bucket_index(hash)].first
    }

    pub(crate) fn node(&self, k: DefaultKey) -> &Entry<K, V> {
        &self.slots[k]
    }

    /// Address of a chained entry, computed without reading the entry.
    pub(crate) fn node_address(&self, k: DefaultKey) -> *const Entry<K, V> {
        // SAFETY: chain links only ever hold keys of live slots; `remove`
        // unlinks an entry before freeing its slot, and `&self` rules out
        // concurrent removal.
        unsafe { self.slots.get_unchecked(k) as *const Entry<K, V> }
    }

    fn find_slot<Q>(&self, hash: u64, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        match self.probe(hash, q) {
            Probe::Occupied(k) => Some(k),
            Probe::Vacant { .. } => None,
        }
    }

    fn probe<Q>(&self, hash: u64, q: &Q) -> Probe
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut tail = None;
        let mut cursor = self.chain_head(hash);
        while let Some(k) = cursor {
            let entry = &self.slots[k];
            if entry.hash == hash && entry.key.borrow() == q {
                return Probe::Occupied(k);
            }
            tail = Some(k);
            cursor = entry.next;
        }
        Probe::Vacant { tail }
    }

    fn link(&mut self, hash: u64, tail: Option<DefaultKey>, key: K, value: V) -> DefaultKey {
        let k = self.slots.insert(Entry {
            key,
            value,
            hash,
            next: None,
        });
        let index = self.bucket_index(hash);
        match tail {
            Some(t) => self.slots[t].next = Some(k),
            None => self.buckets[index].first = Some(k),
        }
        self.buckets[index].len += 1;
        k
    }

    fn grow_if_needed(&mut self) {
        while self.load_factor() > MAX_LOAD_FACTOR {
            let Some(new_capacity) = self
                .capacity()
                .checked_mul(2)
                .filter(|&c| c <= self.max_capacity)
            else {
                // Logged only on the insert that first pushes the load over.
                let before = self.len().saturating_sub(1) as f64 / self.capacity() as f64;
                if before <= MAX_LOAD_FACTOR {
                    tracing::trace!(
                        capacity = self.capacity(),
                        items = self.len(),
                        "capacity ceiling reached, load factor degraded"
                    );
                }
                return;
            };
            self.rehash(new_capacity);
        }
    }

    // Re-links every entry into a fresh bucket array, preserving relative
    // chain order. Uses the stored hash, so `K: Hash` is not called.
    fn rehash(&mut self, new_capacity: usize) {
        let old_capacity = self.capacity();
        let old = core::mem::replace(&mut self.buckets, empty_buckets(new_capacity));
        let mut tails: Vec<Option<DefaultKey>> = vec![None; new_capacity];
        for bucket in old.iter() {
            let mut cursor = bucket.first;
            while let Some(k) = cursor {
                let entry = &mut self.slots[k];
                cursor = entry.next.take();
                let index = (entry.hash as usize) & (new_capacity - 1);
                match tails[index] {
                    Some(t) => self.slots[t].next = Some(k),
                    None => self.buckets[index].first = Some(k),
                }
                tails[index] = Some(k);
                self.buckets[index].len += 1;
            }
        }
        tracing::debug!(
            old_capacity,
            new_capacity,
            items = self.len(),
            "resized bucket array"
        );
    }

    /// Panics if any structural invariant is broken.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let capacity = self.capacity();
        assert!(capacity.is_power_of_two(), "capacity {capacity} not a power of two");
        assert!(capacity <= self.max_capacity);
        assert!(
            self.load_factor() <= MAX_LOAD_FACTOR || capacity == self.max_capacity,
            "load factor {} over target below the ceiling",
            self.load_factor()
        );
        let mut total = 0;
        for (index, bucket) in self.buckets.iter().enumerate() {
            let mut walked = 0;
            let mut cursor = bucket.first;
            while let Some(k) = cursor {
                let entry = &self.slots[k];
                assert_eq!(self.bucket_index(entry.hash), index, "entry chained into wrong bucket");
                assert_eq!(self.make_hash(&entry.key), entry.hash, "stale stored hash");
                walked += 1;
                cursor = entry.next;
            }
            assert_eq!(walked, bucket.len, "bucket counter disagrees with chain");
            total += walked;
        }
        assert_eq!(total, self.len(), "orphaned or double-linked entries");
    }
}

fn empty_buckets(capacity: usize) -> Box<[Bucket]> {
    vec![Bucket::default(); capacity].into_boxed_slice()
}

fn prev_power_of_two(n: usize) -> usize {
    debug_assert!(n > 0);
    1 << (usize::BITS - 1 - n.leading_zeros())
}
