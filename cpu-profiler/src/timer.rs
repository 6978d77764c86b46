use cpu_profiler_common::read_cycle_counter;
use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed on the monotonic clock since the first call in this process.
#[inline]
pub fn now_ms() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

/// Wall-clock stopwatch. Every `start`/`stop` pair adds to the accumulated time
/// until `reset` is called.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    start_ms: f64,
    time_ms: f64,
}

impl Timer {
    #[inline]
    pub fn start(&mut self) {
        self.start_ms = now_ms();
    }

    #[inline]
    pub fn stop(&mut self) {
        self.time_ms += now_ms() - self.start_ms;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.time_ms = 0.0;
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }
}

/// Cycle-counting stopwatch with the same accumulate semantics as [`Timer`].
#[derive(Debug, Clone, Default)]
pub struct PreciseTimer {
    start_cycles: u64,
    cycles: u64,
}

impl PreciseTimer {
    #[inline]
    pub fn start(&mut self) {
        self.start_cycles = read_cycle_counter();
    }

    #[inline]
    pub fn stop(&mut self) {
        // the counter can appear to step back when the thread migrates between cores
        self.cycles += read_cycle_counter().saturating_sub(self.start_cycles);
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cycles = 0;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
