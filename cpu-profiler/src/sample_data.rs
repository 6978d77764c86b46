use crate::timer::{PreciseTimer, Timer};
use cpu_profiler_common::{BasicSample, MemoryCounter, PreciseSample};
use std::fmt;

/// A timer that can turn its accumulated value into a closed sample record.
pub trait Stopwatch: Default {
    type Sample: Copy + fmt::Debug;

    fn start(&mut self);
    fn stop(&mut self);
    fn reset(&mut self);
    fn to_sample(&self, num_allocs: u64, num_frees: u64) -> Self::Sample;
}

impl Stopwatch for Timer {
    type Sample = BasicSample;

    fn start(&mut self) {
        Timer::start(self)
    }

    fn stop(&mut self) {
        Timer::stop(self)
    }

    fn reset(&mut self) {
        Timer::reset(self)
    }

    fn to_sample(&self, num_allocs: u64, num_frees: u64) -> BasicSample {
        BasicSample {
            time_ms: self.time_ms(),
            num_allocs,
            num_frees,
        }
    }
}

impl Stopwatch for PreciseTimer {
    type Sample = PreciseSample;

    fn start(&mut self) {
        PreciseTimer::start(self)
    }

    fn stop(&mut self) {
        PreciseTimer::stop(self)
    }

    fn reset(&mut self) {
        PreciseTimer::reset(self)
    }

    fn to_sample(&self, num_allocs: u64, num_frees: u64) -> PreciseSample {
        PreciseSample {
            cycles: self.cycles(),
            num_allocs,
            num_frees,
        }
    }
}

/// Accumulates the closed samples of one region for one timer type.
///
/// Samples are kept in the order they were closed and are never modified once
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct SampleData<T: Stopwatch> {
    timer: T,
    alloc_baseline: u64,
    free_baseline: u64,
    samples: Vec<T::Sample>,
}

pub type BasicSampleData = SampleData<Timer>;
pub type PreciseSampleData = SampleData<PreciseTimer>;

impl<T: Stopwatch> SampleData<T> {
    pub fn begin_sample(&mut self, memory: &dyn MemoryCounter) {
        self.alloc_baseline = memory.num_allocs();
        self.free_baseline = memory.num_frees();

        self.timer.reset();
        self.timer.start();
    }

    pub fn end_sample(&mut self, memory: &dyn MemoryCounter) {
        self.timer.stop();

        let num_allocs = memory.num_allocs().saturating_sub(self.alloc_baseline);
        let num_frees = memory.num_frees().saturating_sub(self.free_baseline);

        self.samples.push(self.timer.to_sample(num_allocs, num_frees));
    }

    /// Keeps timing the last sample as if it had never been closed: the timer
    /// restarts without being reset and the recorded sample is dropped.
    pub fn resume_last_sample(&mut self) {
        self.timer.start();
        self.samples.pop();
    }

    pub fn samples(&self) -> &[T::Sample] {
        &self.samples
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }
}
