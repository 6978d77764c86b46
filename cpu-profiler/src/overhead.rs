//! Estimates how much the profiler's own instrumentation costs.
//!
//! Every measurement is repeated for a number of rounds and the cheapest round
//! is kept: the minimum is the run least disturbed by preemption and cache
//! misses, so it is the closest to the pure cost of the instrumentation.

use crate::config::CalibrationConfig;
use crate::profiler::ProfilerCpu;
use crate::timer::{PreciseTimer, Timer};
use cpu_profiler_common::SamplingType;
use itertools::Itertools;
use log::debug;

/// Calibrated cost model, fixed for the lifetime of a profiler.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverheadEstimate {
    /// One start/stop pair of a [`Timer`], in milliseconds.
    pub basic_timer_ms: f64,
    /// One start/stop pair of a [`PreciseTimer`], in cycles.
    pub precise_timer_cycles: u64,
    /// One basic begin/end sample pair, in milliseconds.
    pub basic_sampling_ms: f64,
    /// One basic begin/end sample pair, in cycles.
    pub basic_sampling_cycles: u64,
    /// One precise begin/end sample pair, in milliseconds.
    pub precise_sampling_ms: f64,
    /// One precise begin/end sample pair, in cycles.
    pub precise_sampling_cycles: u64,
}

/// Thread root opened by every calibration round.
const CALIBRATION_THREAD_NAME: &str = "Main";

impl OverheadEstimate {
    /// Runs the calibration workload against `profiler` on the calling thread.
    ///
    /// Each round resets the thread's sampling tree when it is done, so nothing
    /// recorded here shows up in later reports.
    pub(crate) fn measure(profiler: &ProfilerCpu, config: &CalibrationConfig) -> Self {
        let (basic_timer_ms, precise_timer_cycles) = measure_timers(config);

        let workload = CalibrationWorkload::new(config);
        let pairs = config.sample_pairs().max(1);

        let mut estimate = OverheadEstimate {
            basic_timer_ms,
            precise_timer_cycles,
            basic_sampling_ms: f64::MAX,
            basic_sampling_cycles: u64::MAX,
            precise_sampling_ms: f64::MAX,
            precise_sampling_cycles: u64::MAX,
        };

        for _ in 0..config.rounds {
            for sampling_type in [SamplingType::Basic, SamplingType::Precise] {
                let mut timer = Timer::default();
                timer.start();
                workload.run(profiler, sampling_type);
                timer.stop();
                profiler.reset();

                let mut precise_timer = PreciseTimer::default();
                precise_timer.start();
                workload.run(profiler, sampling_type);
                precise_timer.stop();
                profiler.reset();

                let ms = (timer.time_ms() / pairs as f64 - basic_timer_ms).max(0.0);
                let cycles = (precise_timer.cycles() / pairs).saturating_sub(precise_timer_cycles);

                let (best_ms, best_cycles) = match sampling_type {
                    SamplingType::Basic => (
                        &mut estimate.basic_sampling_ms,
                        &mut estimate.basic_sampling_cycles,
                    ),
                    SamplingType::Precise => (
                        &mut estimate.precise_sampling_ms,
                        &mut estimate.precise_sampling_cycles,
                    ),
                };
                *best_ms = best_ms.min(ms);
                *best_cycles = (*best_cycles).min(cycles);
            }
        }

        if config.rounds == 0 {
            estimate.basic_sampling_ms = 0.0;
            estimate.basic_sampling_cycles = 0;
            estimate.precise_sampling_ms = 0.0;
            estimate.precise_sampling_cycles = 0;
        }

        debug!("estimated profiler overhead: {:?}", estimate);
        estimate
    }
}

/// Cheapest average start/stop cost of each timer over all rounds.
fn measure_timers(config: &CalibrationConfig) -> (f64, u64) {
    let calls = config.timer_calls.max(1);
    let mut best_ms = f64::MAX;
    let mut best_cycles = u64::MAX;

    for _ in 0..config.rounds {
        let mut timer = Timer::default();
        for _ in 0..calls {
            timer.start();
            timer.stop();
        }
        best_ms = best_ms.min(timer.time_ms() / f64::from(calls));

        let mut precise_timer = PreciseTimer::default();
        for _ in 0..calls {
            precise_timer.start();
            precise_timer.stop();
        }
        best_cycles = best_cycles.min(precise_timer.cycles() / u64::from(calls));
    }

    if config.rounds == 0 {
        return (0.0, 0);
    }
    (best_ms, best_cycles)
}

/// The sample pairs issued by one calibration round.
///
/// Recurring names exercise the path where the block already exists, unique
/// names the path where it has to be created. Names are built up front so their
/// formatting is not counted.
struct CalibrationWorkload {
    reuse_rounds: u32,
    recurring: Vec<String>,
    unique: Vec<String>,
}

impl CalibrationWorkload {
    fn new(config: &CalibrationConfig) -> Self {
        CalibrationWorkload {
            reuse_rounds: config.reuse_rounds,
            recurring: (1..=config.reuse_names)
                .map(|i| format!("TestAvg{i}"))
                .collect_vec(),
            unique: (0..config.unique_samples)
                .map(|i| format!("TestAvg#{i}"))
                .collect_vec(),
        }
    }

    fn run(&self, profiler: &ProfilerCpu, sampling_type: SamplingType) {
        let sample = |name: &str| match sampling_type {
            SamplingType::Basic => {
                profiler.begin_sample(name);
                profiler.end_sample(name);
            }
            SamplingType::Precise => {
                profiler.begin_sample_precise(name);
                profiler.end_sample_precise(name);
            }
        };

        profiler.begin_thread(CALIBRATION_THREAD_NAME);
        for _ in 0..self.reuse_rounds {
            for name in &self.recurring {
                sample(name.as_str());
            }
        }
        for name in &self.unique {
            sample(name.as_str());
        }
        profiler.end_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CalibrationConfig {
        CalibrationConfig {
            rounds: 2,
            timer_calls: 50,
            reuse_rounds: 5,
            reuse_names: 3,
            unique_samples: 10,
        }
    }

    #[test]
    fn workload_names_cover_both_paths() {
        let workload = CalibrationWorkload::new(&CalibrationConfig::default());
        assert_eq!(workload.recurring.len(), 10);
        assert_eq!(workload.recurring[0], "TestAvg1");
        assert_eq!(workload.recurring[9], "TestAvg10");
        assert_eq!(workload.unique.len(), 500);
        assert_eq!(workload.unique[499], "TestAvg#499");
    }

    #[test]
    fn measure_leaves_no_samples_behind() {
        let profiler = ProfilerCpu::new(crate::ProfilerConfig::without_calibration());
        let estimate = OverheadEstimate::measure(&profiler, &small_config());

        assert!(estimate.basic_timer_ms >= 0.0);
        assert!(estimate.basic_sampling_ms >= 0.0);
        assert!(estimate.precise_sampling_ms >= 0.0);
        assert!(estimate.basic_sampling_ms < f64::MAX);
        assert!(estimate.precise_sampling_cycles < u64::MAX);

        assert!(!profiler.is_thread_active());
        let report = profiler.generate_report();
        assert!(report.basic_root().children.is_empty());
        assert_eq!(report.basic_root().data.num_calls, 0);
    }

    #[test]
    fn zero_rounds_measure_nothing() {
        let profiler = ProfilerCpu::new(crate::ProfilerConfig::without_calibration());
        let config = CalibrationConfig {
            rounds: 0,
            ..small_config()
        };
        assert_eq!(
            OverheadEstimate::measure(&profiler, &config),
            OverheadEstimate::default()
        );
    }
}
