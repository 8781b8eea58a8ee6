//! Software prefetch hints and the suspension point built on top of them.
//!
//! `prefetch_and_suspend` is the only place a lookup task yields. It starts
//! pulling the next chain node toward the cache and reports the task as
//! suspended; the resume loop that receives `Step::Suspended` re-queues the
//! task at the back of the ready queue and resumes the next ready task. By
//! the time the suspended task comes around again its node should be cached.

use crate::scheduler::Step;

/// Hint the CPU to start loading the cache line holding `ptr`.
///
/// Never faults and never blocks; a no-op on targets without a prefetch
/// instruction.
#[inline(always)]
pub fn prefetch_read<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_NTA};
        _mm_prefetch::<_MM_HINT_NTA>(ptr as *const i8);
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!(
            "prfm pldl1keep, [{addr}]",
            addr = in(reg) ptr,
            options(nostack, preserves_flags),
        );
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = ptr;
    }
}

/// Issue a prefetch for `target` and suspend the calling task.
///
/// The caller records where to continue before returning this step; on its
/// next resume it reads `target`, which is by then expected to be cached.
#[inline]
pub fn prefetch_and_suspend<T>(target: *const T) -> Step {
    prefetch_read(target);
    Step::Suspended
}
