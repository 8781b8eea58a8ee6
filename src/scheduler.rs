//! Cooperative scheduling: resumable tasks and a FIFO ready queue.
//!
//! A task is an explicit state machine. Each `resume` advances it to its next
//! suspension point (or to completion). Nothing here spawns threads; the
//! caller's thread drives every task.

use core::fmt;

/// What a task reports after being resumed once.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Step {
    /// Parked at a suspension point; must be scheduled again.
    Suspended,
    /// Reached a terminal state; must not be resumed again.
    Complete,
}

/// A suspended computation that can be resumed by a scheduler loop.
pub trait Task {
    fn resume(&mut self) -> Step;
}

/// Ready queue contract shared by the throttle and bulk-lookup drivers.
///
/// Tasks are resumed in the order they became ready. A task scheduled while
/// another one runs goes behind everything already queued.
pub trait Scheduler<T> {
    /// Append `task` to the back of the ready queue.
    fn schedule(&mut self, task: T);

    /// Pop the task that has been ready the longest.
    fn remove_next_task(&mut self) -> Option<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resume tasks until the queue drains. Suspended tasks are re-queued
    /// at the back.
    fn run(&mut self)
    where
        T: Task,
    {
        while let Some(mut task) = self.remove_next_task() {
            if task.resume() == Step::Suspended {
                self.schedule(task);
            }
        }
    }
}

/// Fixed-capacity ring buffer scheduler.
///
/// Capacity must cover the maximum number of in-flight tasks; scheduling into
/// a full ring panics.
pub struct RingScheduler<T> {
    buffer: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> RingScheduler<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "scheduler capacity must be non-zero");
        Self {
            buffer: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl<T> Scheduler<T> for RingScheduler<T> {
    fn schedule(&mut self, task: T) {
        assert!(
            self.len < self.buffer.len(),
            "scheduler overflow: ready queue holds at most {} tasks",
            self.buffer.len()
        );
        let tail = (self.head + self.len) % self.buffer.len();
        self.buffer[tail] = Some(task);
        self.len += 1;
    }

    fn remove_next_task(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let task = self.buffer[self.head].take();
        self.head = (self.head + 1) % self.buffer.len();
        self.len -= 1;
        task
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl<T> fmt::Debug for RingScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingScheduler")
            .field("len", &self.len)
            .field("capacity", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    // Suspends `hops` times, logging its id on every resume.
    struct Hopper {
        id: u32,
        hops: usize,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl Task for Hopper {
        fn resume(&mut self) -> Step {
            self.log.borrow_mut().push(self.id);
            if self.hops == 0 {
                return Step::Complete;
            }
            self.hops -= 1;
            Step::Suspended
        }
    }

    #[test]
    fn fifo_order_with_wraparound() {
        let mut s = RingScheduler::with_capacity(3);
        for round in 0..5u32 {
            s.schedule(round * 10);
            s.schedule(round * 10 + 1);
            assert_eq!(s.len(), 2);
            assert_eq!(s.remove_next_task(), Some(round * 10));
            s.schedule(round * 10 + 2);
            assert_eq!(s.remove_next_task(), Some(round * 10 + 1));
            assert_eq!(s.remove_next_task(), Some(round * 10 + 2));
            assert!(s.is_empty());
        }
        assert_eq!(s.remove_next_task(), None);
    }

    #[test]
    #[should_panic(expected = "scheduler overflow")]
    fn overflow_is_a_hard_failure() {
        let mut s = RingScheduler::with_capacity(2);
        s.schedule(1);
        s.schedule(2);
        s.schedule(3);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn zero_capacity_rejected() {
        let _ = RingScheduler::<u8>::with_capacity(0);
    }

    /// Invariant: `run` round-robins suspended tasks in readiness order and
    /// drains the queue.
    #[test]
    fn run_round_robins_until_empty() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = RingScheduler::with_capacity(3);
        for (id, hops) in [(1, 2), (2, 0), (3, 1)] {
            s.schedule(Hopper {
                id,
                hops,
                log: Rc::clone(&log),
            });
        }
        s.run();
        assert!(s.is_empty());
        assert_eq!(*log.borrow(), vec![1, 2, 3, 1, 3, 1]);
    }
}
