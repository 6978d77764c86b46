#![no_std]

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// One closed wall-clock sample of a region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BasicSample {
    pub time_ms: f64,
    pub num_allocs: u64,
    pub num_frees: u64,
}

/// One closed cycle-counted sample of a region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreciseSample {
    pub cycles: u64,
    pub num_allocs: u64,
    pub num_frees: u64,
}

/// Which timer an open region is being measured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingType {
    Basic,
    Precise,
}

impl fmt::Display for SamplingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingType::Basic => f.write_str("basic"),
            SamplingType::Precise => f.write_str("precise"),
        }
    }
}

/// Reads the CPU cycle counter.
///
/// `cpuid` is issued first: it is a serializing instruction, so `rdtsc` cannot
/// be executed ahead of the code being measured.
#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::{__cpuid, _rdtsc};
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::{__cpuid, _rdtsc};

    #[allow(unused_unsafe)]
    unsafe {
        let _ = __cpuid(0);
        _rdtsc()
    }
}

/// Reads the virtual counter after an instruction barrier.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    let cnt: u64;
    unsafe {
        core::arch::asm!(
            "isb",
            "mrs {cnt}, cntvct_el0",
            cnt = out(reg) cnt,
            options(nomem, nostack)
        );
    }
    cnt
}

/// Monotonic nanoseconds, for targets without a readable cycle counter.
#[cfg(all(
    unix,
    not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64"))
))]
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

#[cfg(not(any(
    unix,
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64"
)))]
compile_error!("no cycle counter available for this target");

/// Source of process-wide allocation and free counts.
///
/// Implementations are read concurrently from every sampled thread.
pub trait MemoryCounter: Sync {
    fn num_allocs(&self) -> u64;
    fn num_frees(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct AllocCounters {
    allocs: AtomicU64,
    frees: AtomicU64,
}

impl AllocCounters {
    pub const fn new() -> Self {
        AllocCounters {
            allocs: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_alloc(&self) {
        self.allocs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_free(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }
}

impl MemoryCounter for AllocCounters {
    #[inline]
    fn num_allocs(&self) -> u64 {
        self.allocs.load(Ordering::Relaxed)
    }

    #[inline]
    fn num_frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }
}

/// Counters fed by [`CountingAllocator`] when it is installed as the global allocator.
pub static ALLOC_COUNTERS: AllocCounters = AllocCounters::new();

/// Wraps an allocator and records every allocation and free it serves.
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: CountingAllocator<System> = CountingAllocator::new(System, &ALLOC_COUNTERS);
/// ```
pub struct CountingAllocator<A> {
    inner: A,
    counters: &'static AllocCounters,
}

impl<A> CountingAllocator<A> {
    pub const fn new(inner: A, counters: &'static AllocCounters) -> Self {
        CountingAllocator { inner, counters }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            self.counters.record_alloc();
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            self.counters.record_alloc();
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        self.counters.record_free();
    }

    // counted as a free of the old block plus an allocation of the new one
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            self.counters.record_free();
            self.counters.record_alloc();
        }
        new_ptr
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::alloc::System;

    #[test]
    fn counters_start_at_zero_and_count() {
        let counters = AllocCounters::new();
        assert_eq!(counters.num_allocs(), 0);
        assert_eq!(counters.num_frees(), 0);

        counters.record_alloc();
        counters.record_alloc();
        counters.record_free();
        assert_eq!(counters.num_allocs(), 2);
        assert_eq!(counters.num_frees(), 1);
    }

    #[test]
    fn counting_allocator_tracks_alloc_realloc_and_free() {
        static COUNTERS: AllocCounters = AllocCounters::new();
        let allocator = CountingAllocator::new(System, &COUNTERS);

        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            let ptr = allocator.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = allocator.realloc(ptr, layout, 128);
            assert!(!ptr.is_null());
            allocator.dealloc(ptr, Layout::from_size_align(128, 8).unwrap());
        }

        assert_eq!(COUNTERS.num_allocs(), 2);
        assert_eq!(COUNTERS.num_frees(), 2);
    }

    #[test]
    fn cycle_counter_advances() {
        let first = read_cycle_counter();
        let mut spin = 0u64;
        for i in 0..10_000u64 {
            spin = spin.wrapping_add(core::hint::black_box(i));
        }
        core::hint::black_box(spin);
        let second = read_cycle_counter();
        assert!(second >= first);
    }

    #[test]
    fn sampling_type_display() {
        assert_eq!(std::format!("{}", SamplingType::Basic), "basic");
        assert_eq!(std::format!("{}", SamplingType::Precise), "precise");
    }
}
