//! Bulk lookups over a `ChainedMap`.
//!
//! `sequential_multilookup` walks one chain at a time and is the correctness
//! baseline. `interleaved_multilookup` runs one `LookupTask` per key through a
//! `Throttle`; each task suspends right after prefetching the next chain node,
//! so the memory stalls of up to `n_streams` walks overlap.
//!
//! Tasks complete in scheduler order, not spawn order. Every task therefore
//! writes into the result slot of its own input position, and the returned
//! vector is always in input-key order.

use crate::chained_map::{ChainedMap, EntryRef};
use crate::prefetch::prefetch_and_suspend;
use crate::scheduler::{Scheduler, Step, Task};
use crate::throttle::Throttle;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use slotmap::DefaultKey;
use std::cell::RefCell;
use std::rc::Rc;

/// Result of looking up one key in a bulk lookup.
pub struct Lookup<'m, K, V> {
    key: &'m K,
    entry: Option<EntryRef<'m, K, V>>,
}

impl<'m, K, V> Lookup<'m, K, V> {
    /// The key that was queried.
    pub fn key(&self) -> &'m K {
        self.key
    }

    pub fn is_found(&self) -> bool {
        self.entry.is_some()
    }

    pub fn entry(&self) -> Option<EntryRef<'m, K, V>> {
        self.entry
    }

    pub fn value(&self) -> Option<&'m V> {
        self.entry.map(|e| e.value())
    }
}

impl<K, V> Clone for Lookup<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Lookup<'_, K, V> {}

impl<K: PartialEq, V: PartialEq> PartialEq for Lookup<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.entry == other.entry
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Lookup<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("key", self.key)
            .field("value", &self.value())
            .finish()
    }
}

/// Continuation run once when a `LookupTask` reaches a terminal state.
pub trait Completion<'m, K, V> {
    fn complete(self, key: &'m K, entry: Option<EntryRef<'m, K, V>>);
}

impl<'m, K: 'm, V: 'm, F> Completion<'m, K, V> for F
where
    F: FnOnce(&'m K, Option<EntryRef<'m, K, V>>),
{
    fn complete(self, key: &'m K, entry: Option<EntryRef<'m, K, V>>) {
        self(key, entry)
    }
}

type Slots<'m, K, V> = Rc<RefCell<Vec<Option<Lookup<'m, K, V>>>>>;

/// Completion writing into one position of the interleaved driver's output.
pub struct ResultSlot<'m, K, V> {
    slots: Slots<'m, K, V>,
    index: usize,
}

impl<'m, K: 'm, V: 'm> Completion<'m, K, V> for ResultSlot<'m, K, V> {
    fn complete(self, key: &'m K, entry: Option<EntryRef<'m, K, V>>) {
        let prev = self.slots.borrow_mut()[self.index].replace(Lookup { key, entry });
        debug_assert!(prev.is_none(), "result slot {} written twice", self.index);
    }
}

/// Task type spawned by `ChainedMap::interleaved_multilookup`.
pub type InterleavedLookup<'m, K, V, S> = LookupTask<'m, K, V, S, ResultSlot<'m, K, V>>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Cursor {
    Start,
    Visiting(DefaultKey),
    Done,
}

/// One chain walk as a resumable state machine.
///
/// `Start` hashes the key and suspends on the chain head. Each later resume
/// inspects the node it prefetched, then either completes or suspends on the
/// next node. The completion runs exactly once; resuming afterwards panics.
pub struct LookupTask<'m, K, V, S, C> {
    map: &'m ChainedMap<K, V, S>,
    key: &'m K,
    hash: u64,
    cursor: Cursor,
    on_complete: Option<C>,
}

impl<'m, K, V, S, C> LookupTask<'m, K, V, S, C>
where
    K: Eq + Hash,
    S: BuildHasher,
    C: Completion<'m, K, V>,
{
    fn hop(&mut self, node: DefaultKey) -> Step {
        self.cursor = Cursor::Visiting(node);
        prefetch_and_suspend(self.map.node_address(node))
    }

    fn finish(&mut self, entry: Option<EntryRef<'m, K, V>>) -> Step {
        self.cursor = Cursor::Done;
        if let Some(on_complete) = self.on_complete.take() {
            on_complete.complete(self.key, entry);
        }
        Step::Complete
    }
}

impl<'m, K, V, S, C> Task for LookupTask<'m, K, V, S, C>
where
    K: Eq + Hash,
    S: BuildHasher,
    C: Completion<'m, K, V>,
{
    fn resume(&mut self) -> Step {
        match self.cursor {
            Cursor::Start => {
                self.hash = self.map.hash_of(self.key);
                match self.map.chain_head(self.hash) {
                    Some(first) => self.hop(first),
                    None => self.finish(None),
                }
            }
            Cursor::Visiting(node) => {
                let map = self.map;
                let entry = map.node(node);
                if entry.hash == self.hash && entry.key == *self.key {
                    return self.finish(Some(EntryRef::from_entry(entry)));
                }
                match entry.next {
                    Some(next) => self.hop(next),
                    None => self.finish(None),
                }
            }
            Cursor::Done => panic!("lookup task resumed after completion"),
        }
    }
}

impl<K, V, S> ChainedMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Build a resumable lookup of `key` that hands its outcome to
    /// `on_complete`. Nothing runs until a scheduler resumes the task.
    pub fn lookup_task<'m, C>(&'m self, key: &'m K, on_complete: C) -> LookupTask<'m, K, V, S, C>
    where
        C: Completion<'m, K, V>,
    {
        LookupTask {
            map: self,
            key,
            hash: 0,
            cursor: Cursor::Start,
            on_complete: Some(on_complete),
        }
    }

    /// Look up every key in order with plain `lookup`.
    pub fn sequential_multilookup<'m>(&'m self, keys: &'m [K]) -> Vec<Lookup<'m, K, V>> {
        keys.iter()
            .map(|key| Lookup {
                key,
                entry: self.lookup(key),
            })
            .collect()
    }

    /// Look up every key with up to `n_streams` chain walks interleaved on
    /// `scheduler`. Results come back in input order.
    ///
    /// `scheduler` must be empty and able to hold `n_streams` tasks.
    pub fn interleaved_multilookup<'m, Sch>(
        &'m self,
        keys: &'m [K],
        scheduler: &mut Sch,
        n_streams: usize,
    ) -> Vec<Lookup<'m, K, V>>
    where
        Sch: Scheduler<InterleavedLookup<'m, K, V, S>>,
    {
        tracing::debug!(keys = keys.len(), n_streams, "interleaved multilookup started");
        let slots: Slots<'m, K, V> = Rc::new(RefCell::new(vec![None; keys.len()]));
        let peak_in_flight = {
            let mut throttle = Throttle::new(scheduler, n_streams);
            for (index, key) in keys.iter().enumerate() {
                let slot = ResultSlot {
                    slots: Rc::clone(&slots),
                    index,
                };
                throttle.spawn(self.lookup_task(key, slot));
            }
            throttle.run();
            throttle.peak_in_flight()
        };
        tracing::debug!(keys = keys.len(), peak_in_flight, "interleaved multilookup finished");
        let results = slots.take();
        results
            .into_iter()
            .map(|r| r.expect("every spawned lookup completes exactly once"))
            .collect()
    }
}
