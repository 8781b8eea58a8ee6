//! Throttle: bounds how many tasks are in flight on a scheduler at once.

use crate::scheduler::{Scheduler, Step, Task};
use core::marker::PhantomData;

/// Admits tasks onto a borrowed scheduler while keeping at most `limit` of
/// them outstanding.
///
/// The throttle is the only thing resuming tasks on its scheduler, which lets
/// it observe every completion. Dropping it drains the scheduler, so every
/// spawned task completes exactly once.
pub struct Throttle<'s, T, Sch>
where
    T: Task,
    Sch: Scheduler<T>,
{
    scheduler: &'s mut Sch,
    limit: usize,
    remaining: usize,
    peak_in_flight: usize,
    _task: PhantomData<fn(T)>,
}

impl<'s, T, Sch> Throttle<'s, T, Sch>
where
    T: Task,
    Sch: Scheduler<T>,
{
    pub fn new(scheduler: &'s mut Sch, n_streams: usize) -> Self {
        assert!(n_streams > 0, "throttle needs at least one stream");
        assert!(
            scheduler.is_empty(),
            "throttle must own every task on its scheduler"
        );
        Self {
            scheduler,
            limit: n_streams,
            remaining: n_streams,
            peak_in_flight: 0,
            _task: PhantomData,
        }
    }

    /// Admit `task`. With every stream busy, ready tasks are resumed in FIFO
    /// order until one of them completes and frees a slot.
    pub fn spawn(&mut self, task: T) {
        if self.remaining == 0 {
            tracing::trace!(limit = self.limit, "all streams busy");
            self.complete_one();
        }
        self.scheduler.schedule(task);
        self.remaining -= 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight());
    }

    /// Resume tasks until none remain.
    pub fn run(&mut self) {
        while let Some(task) = self.scheduler.remove_next_task() {
            self.resume(task);
        }
        debug_assert_eq!(self.remaining, self.limit);
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.remaining
    }

    /// Highest number of tasks outstanding at once so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    fn complete_one(&mut self) {
        loop {
            let task = self
                .scheduler
                .remove_next_task()
                .expect("in-flight tasks must be queued on the scheduler");
            if self.resume(task) {
                return;
            }
        }
    }

    // Returns true if the task reached a terminal state.
    fn resume(&mut self, mut task: T) -> bool {
        match task.resume() {
            Step::Suspended => {
                self.scheduler.schedule(task);
                false
            }
            Step::Complete => {
                self.on_task_complete();
                true
            }
        }
    }

    fn on_task_complete(&mut self) {
        debug_assert!(self.remaining < self.limit, "completion without a spawn");
        self.remaining += 1;
    }
}

impl<'s, T, Sch> Drop for Throttle<'s, T, Sch>
where
    T: Task,
    Sch: Scheduler<T>,
{
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.run();
        }
    }
}
