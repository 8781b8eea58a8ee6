//! isi-hashmap: a single-threaded chained hash map whose bulk lookups hide
//! memory latency by interleaving many chain walks on one thread.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: overlap the cache misses of independent lookups. Each lookup is a
//!   small state machine that prefetches the next chain node and then yields,
//!   so the CPU advances another lookup while the line is in flight
//!   (instruction-stream interleaving).
//! - Layers:
//!   - ChainedMap<K, V, S>: open-hashing table. Power-of-two bucket array,
//!     chains linked through a generational arena, doubling resize above a
//!     0.5 load factor up to a fixed ceiling.
//!   - Scheduler<T> / RingScheduler<T>: FIFO ready queue of suspended tasks
//!     with a fixed capacity.
//!   - prefetch: the suspension point. Issues the hint, reports
//!     `Step::Suspended`.
//!   - Throttle: admits tasks onto a scheduler while keeping at most
//!     `n_streams` of them in flight.
//!   - multilookup: `LookupTask` plus the sequential and interleaved drivers.
//!
//! Constraints
//! - Single-threaded: no atomics, no locks, no OS threads. Lookup tasks hold
//!   `&ChainedMap`, so the borrow checker rules out mutation while any
//!   bulk lookup is in progress.
//! - Lookup views (`EntryRef`, `InsertResult`, ...) borrow the map; they
//!   cannot outlive the next structural mutation.
//! - Expected outcomes are values: a miss is `None`, a duplicate insert is
//!   `successful() == false`. Only a zero max capacity is an error.
//! - Precondition violations panic: overflowing a `RingScheduler`, zero
//!   streams, resuming a finished task.
//!
//! Hasher and rehashing invariants
//! - Each entry stores its precomputed `u64` hash. Resizing re-buckets by the
//!   stored hash and never calls `K: Hash`; chain walks compare stored hashes
//!   before calling `K: Eq`.
//! - Bucket index is `hash & (capacity - 1)`; capacity and the max capacity
//!   are always powers of two (a requested max capacity is rounded down).
//!
//! Ordering
//! - Interleaved lookups complete in scheduler order, which differs from
//!   spawn order whenever chain lengths differ. The interleaved driver gives
//!   every task its own result slot, so output order is always input order.
//!   Callers wanting completion order can drive `ChainedMap::lookup_task`
//!   themselves.
//!
//! Notes and non-goals
//! - No iteration, no concurrent access, no persistence.
//! - Removed arena slots are recycled by later inserts; there is no other
//!   allocator customization.

pub mod chained_map;
mod chained_map_proptest;
pub mod multilookup;
pub mod prefetch;
pub mod scheduler;
pub mod throttle;

// Public surface
pub use chained_map::{
    ChainedMap, ConfigError, EntryRef, InsertResult, MapStats, Removed, UpdateResult,
    INIT_CAPACITY, MAX_LOAD_FACTOR,
};
pub use multilookup::{Completion, InterleavedLookup, Lookup, LookupTask};
pub use scheduler::{RingScheduler, Scheduler, Step, Task};
pub use throttle::Throttle;
