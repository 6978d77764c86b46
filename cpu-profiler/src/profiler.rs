use crate::config::ProfilerConfig;
use crate::error::UsageError;
use crate::overhead::OverheadEstimate;
use crate::report::CpuProfilerReport;
use crate::thread_info::{ThreadInfo, UNKNOWN_THREAD_NAME};
use cpu_profiler_common::{MemoryCounter, SamplingType, ALLOC_COUNTERS};
use dashmap::DashMap;
use itertools::Itertools;
use log::{debug, warn};
use std::cell::RefCell;
use std::thread::{self, ThreadId};
use thread_local::ThreadLocal;

/// Hierarchical instrumenting profiler.
///
/// Every OS thread that touches the profiler gets its own lazily created
/// [`ThreadInfo`], so the sampling calls never contend with each other. Calls
/// always act on the calling thread's state, and reports only ever describe the
/// calling thread.
///
/// Misuse (mismatched begin/end calls and the like) is logged and otherwise
/// ignored; none of the sampling calls can fail.
pub struct ProfilerCpu {
    config: ProfilerConfig,
    threads: ThreadLocal<RefCell<ThreadInfo>>,
    /// Label each thread registered with, by the thread that owns the state.
    registry: DashMap<ThreadId, String>,
    memory: &'static dyn MemoryCounter,
    overhead: OverheadEstimate,
}

impl ProfilerCpu {
    /// Creates a profiler that reads the process-wide allocation counters.
    ///
    /// When `config.estimate_overhead` is set this runs the calibration workload
    /// on the calling thread before returning.
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_memory_counter(config, &ALLOC_COUNTERS)
    }

    pub fn with_memory_counter(config: ProfilerConfig, memory: &'static dyn MemoryCounter) -> Self {
        let mut profiler = ProfilerCpu {
            config,
            threads: ThreadLocal::new(),
            registry: DashMap::new(),
            memory,
            overhead: OverheadEstimate::default(),
        };
        if profiler.config.estimate_overhead {
            profiler.recalibrate();
        }
        profiler
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn overhead(&self) -> &OverheadEstimate {
        &self.overhead
    }

    /// Reruns the overhead calibration.
    ///
    /// Every thread's sampling state is discarded afterwards, including any
    /// profile the calling thread had recorded.
    pub fn recalibrate(&mut self) {
        let overhead = OverheadEstimate::measure(&*self, &self.config.calibration);
        self.overhead = overhead;
        self.threads.clear();
        self.registry.clear();
    }

    /// Starts sampling the calling thread under the root label `name`.
    ///
    /// The thread is listed under `name` by [`known_threads`](Self::known_threads)
    /// from then on, even if it was first seen under another label.
    pub fn begin_thread(&self, name: &str) {
        let memory = self.memory;
        if self
            .with_thread(name, |thread| thread.begin(name, memory))
            .is_some()
        {
            self.register(thread::current().id(), name);
        }
    }

    /// Stops sampling the calling thread, closing whatever is still open.
    pub fn end_thread(&self) {
        let memory = self.memory;
        if self.with_existing_thread(|thread| thread.end(memory)).is_none() {
            warn!("{}", UsageError::ThreadNotActive);
        }
    }

    /// Opens a wall-clock sampled region under the innermost open one.
    pub fn begin_sample(&self, name: &str) {
        self.begin(name, SamplingType::Basic);
    }

    pub fn end_sample(&self, name: &str) {
        self.end(name, SamplingType::Basic);
    }

    /// Opens a cycle-counted region under the innermost open one.
    pub fn begin_sample_precise(&self, name: &str) {
        self.begin(name, SamplingType::Precise);
    }

    pub fn end_sample_precise(&self, name: &str) {
        self.end(name, SamplingType::Precise);
    }

    /// Drops everything recorded on the calling thread.
    pub fn reset(&self) {
        let memory = self.memory;
        self.with_existing_thread(|thread| thread.reset(memory));
    }

    /// Aggregates the calling thread's profile, ending the thread first if it is
    /// still being sampled.
    ///
    /// A thread that never sampled anything gets an empty report.
    pub fn generate_report(&self) -> CpuProfilerReport {
        let memory = self.memory;
        let overhead = &self.overhead;
        self.with_existing_thread(|thread| {
            if thread.is_active() {
                if let Err(err) = thread.end(memory) {
                    warn!("{err}");
                }
            }
            Ok(thread
                .tree()
                .map(|tree| CpuProfilerReport::generate(tree, overhead))
                .unwrap_or_default())
        })
        .flatten()
        .unwrap_or_default()
    }

    pub fn is_thread_active(&self) -> bool {
        self.threads
            .get()
            .filter(|cell| !Self::is_stale(cell))
            .and_then(|cell| cell.try_borrow().ok().map(|thread| thread.is_active()))
            .unwrap_or(false)
    }

    /// Labels of every thread that has used this profiler, sorted.
    pub fn known_threads(&self) -> Vec<String> {
        self.registry
            .iter()
            .map(|entry| entry.value().clone())
            .sorted()
            .collect()
    }

    fn begin(&self, name: &str, sampling_type: SamplingType) {
        let memory = self.memory;
        self.with_thread(UNKNOWN_THREAD_NAME, |thread| {
            thread.begin_sample(name, sampling_type, memory)
        });
    }

    fn end(&self, name: &str, sampling_type: SamplingType) {
        let memory = self.memory;
        let validate = self.config.validate_nesting;
        let ended = self.with_existing_thread(|thread| {
            thread.end_sample(name, sampling_type, validate, memory)
        });
        if ended.is_none() {
            warn!("{}", UsageError::NoOpenSample { sampling_type });
        }
    }

    /// Runs `f` on the calling thread's state, registering the thread as
    /// `label` if this is the first time it shows up.
    ///
    /// `ThreadLocal` hands the slot of an exited thread to the next new thread;
    /// such a leftover state is replaced rather than inherited.
    fn with_thread<R>(
        &self,
        label: &str,
        f: impl FnOnce(&mut ThreadInfo) -> Result<R, UsageError>,
    ) -> Option<R> {
        let id = thread::current().id();
        let cell = self.threads.get_or(|| {
            self.register(id, label);
            RefCell::new(ThreadInfo::new())
        });
        if Self::is_stale(cell) {
            if let Ok(mut thread) = cell.try_borrow_mut() {
                debug!(
                    "discarding state left behind by exited thread {:?}",
                    thread.owner()
                );
                *thread = ThreadInfo::new();
            }
            self.register(id, label);
        }
        Self::apply(cell, f)
    }

    /// Like [`with_thread`](Self::with_thread) but returns `None` without
    /// creating anything when the calling thread has no state of its own yet.
    fn with_existing_thread<R>(
        &self,
        f: impl FnOnce(&mut ThreadInfo) -> Result<R, UsageError>,
    ) -> Option<Option<R>> {
        let cell = self.threads.get()?;
        if Self::is_stale(cell) {
            return None;
        }
        Some(Self::apply(cell, f))
    }

    /// Whether the slot still holds the state of a thread that has exited.
    /// A slot borrowed right now is in use by the calling thread, so it isn't.
    fn is_stale(cell: &RefCell<ThreadInfo>) -> bool {
        cell.try_borrow()
            .map(|thread| !thread.is_owned_by_current_thread())
            .unwrap_or(false)
    }

    fn register(&self, id: ThreadId, label: &str) {
        let unchanged = self
            .registry
            .get(&id)
            .is_some_and(|known| known.as_str() == label);
        if !unchanged {
            debug!("registering thread {id:?} as {label}");
            self.registry.insert(id, label.to_owned());
        }
    }

    fn apply<R>(
        cell: &RefCell<ThreadInfo>,
        f: impl FnOnce(&mut ThreadInfo) -> Result<R, UsageError>,
    ) -> Option<R> {
        let result = match cell.try_borrow_mut() {
            Ok(mut thread) => f(&mut *thread),
            Err(_) => Err(UsageError::ThreadStateBusy),
        };
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }
}

impl Drop for ProfilerCpu {
    fn drop(&mut self) {
        debug!(
            "releasing sampling state of {} thread(s)",
            self.threads.iter_mut().count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiler() -> ProfilerCpu {
        ProfilerCpu::new(ProfilerConfig::without_calibration())
    }

    #[test]
    fn profiler_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProfilerCpu>();
    }

    #[test]
    fn scenario_a_single_child() {
        let profiler = profiler();
        profiler.begin_thread("T");
        profiler.begin_sample("A");
        profiler.end_sample("A");
        profiler.end_thread();

        let report = profiler.generate_report();
        let root = report.basic_root();
        assert_eq!(root.name(), "T");
        assert_eq!(root.data.num_calls, 1);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name(), "A");
        assert_eq!(root.children[0].data.num_calls, 1);
    }

    #[test]
    fn report_without_state_is_empty() {
        let profiler = profiler();
        assert_eq!(profiler.generate_report(), CpuProfilerReport::default());
        assert!(profiler.known_threads().is_empty());
    }

    #[test]
    fn end_calls_without_state_create_nothing() {
        let profiler = profiler();
        profiler.end_sample("A");
        profiler.end_sample_precise("A");
        profiler.end_thread();
        profiler.reset();
        assert!(!profiler.is_thread_active());
        assert!(profiler.known_threads().is_empty());
    }

    #[test]
    fn report_ends_an_active_thread() {
        let profiler = profiler();
        profiler.begin_thread("T");
        profiler.begin_sample_precise("P");
        assert!(profiler.is_thread_active());

        let report = profiler.generate_report();
        assert!(!profiler.is_thread_active());
        assert_eq!(report.precise_root().find_child("P").unwrap().data.num_calls, 1);
        assert_eq!(report.basic_root().data.num_calls, 1);
    }

    #[test]
    fn implicit_thread_registers_as_unknown() {
        let profiler = profiler();
        profiler.begin_sample("A");
        profiler.end_sample("A");

        assert_eq!(profiler.known_threads(), [UNKNOWN_THREAD_NAME]);
        let report = profiler.generate_report();
        assert_eq!(report.basic_root().name(), UNKNOWN_THREAD_NAME);
    }

    #[test]
    fn begin_thread_relabels_an_implicit_thread() {
        let profiler = profiler();
        profiler.begin_sample("A");
        profiler.end_sample("A");
        profiler.end_thread();
        assert_eq!(profiler.known_threads(), [UNKNOWN_THREAD_NAME]);

        profiler.begin_thread("Main");
        assert_eq!(profiler.known_threads(), ["Main"]);

        // a rejected begin keeps the label
        profiler.begin_thread("Other");
        assert_eq!(profiler.known_threads(), ["Main"]);

        let report = profiler.generate_report();
        assert_eq!(report.basic_root().name(), "Main");
        assert_eq!(report.basic_root().find_child("A").unwrap().data.num_calls, 1);
    }

    #[test]
    fn recalibrate_discards_thread_state() {
        let mut config = ProfilerConfig::without_calibration();
        config.calibration.rounds = 1;
        config.calibration.timer_calls = 10;
        config.calibration.reuse_rounds = 2;
        config.calibration.unique_samples = 5;
        let mut profiler = ProfilerCpu::new(config);

        profiler.begin_thread("T");
        profiler.begin_sample("A");
        profiler.recalibrate();

        assert!(!profiler.is_thread_active());
        assert!(profiler.known_threads().is_empty());
        assert_eq!(profiler.generate_report(), CpuProfilerReport::default());
    }
}
