use crate::profiler::ProfilerCpu;
use cpu_profiler_common::SamplingType;
use std::marker::PhantomData;

/// Ends the region it was created for when dropped.
///
/// Not `Send`: the region has to be ended on the thread that opened it.
#[must_use = "the region ends as soon as the guard is dropped"]
pub struct SampleScope<'a> {
    profiler: &'a ProfilerCpu,
    name: &'a str,
    sampling_type: SamplingType,
    _not_send: PhantomData<*const ()>,
}

impl<'a> SampleScope<'a> {
    fn new(profiler: &'a ProfilerCpu, name: &'a str, sampling_type: SamplingType) -> Self {
        match sampling_type {
            SamplingType::Basic => profiler.begin_sample(name),
            SamplingType::Precise => profiler.begin_sample_precise(name),
        }
        SampleScope {
            profiler,
            name,
            sampling_type,
            _not_send: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

impl Drop for SampleScope<'_> {
    fn drop(&mut self) {
        match self.sampling_type {
            SamplingType::Basic => self.profiler.end_sample(self.name),
            SamplingType::Precise => self.profiler.end_sample_precise(self.name),
        }
    }
}

impl ProfilerCpu {
    /// Opens a wall-clock sampled region that lasts until the guard is dropped.
    pub fn scope<'a>(&'a self, name: &'a str) -> SampleScope<'a> {
        SampleScope::new(self, name, SamplingType::Basic)
    }

    /// Cycle-counted counterpart of [`scope`](Self::scope).
    pub fn scope_precise<'a>(&'a self, name: &'a str) -> SampleScope<'a> {
        SampleScope::new(self, name, SamplingType::Precise)
    }
}

#[cfg(test)]
mod tests {
    use crate::{ProfilerConfig, ProfilerCpu};

    #[test]
    fn guards_close_in_reverse_order() {
        let profiler = ProfilerCpu::new(ProfilerConfig::without_calibration());
        profiler.begin_thread("T");
        {
            let _outer = profiler.scope("Outer");
            let _inner = profiler.scope_precise("Inner");
        }
        assert!(profiler.is_thread_active());

        let report = profiler.generate_report();
        let outer = report.basic_root().find_child("Outer").unwrap();
        assert_eq!(outer.data.num_calls, 1);
        assert!(outer.children.is_empty());

        let inner = report.precise_root().find_path(&["Inner"]).unwrap();
        assert_eq!(inner.data.num_calls, 1);
    }

    #[test]
    fn repeated_scopes_reuse_the_block() {
        let profiler = ProfilerCpu::new(ProfilerConfig::without_calibration());
        profiler.begin_thread("T");
        for _ in 0..5 {
            let scope = profiler.scope("Tick");
            assert_eq!(scope.name(), "Tick");
        }
        profiler.end_thread();

        let report = profiler.generate_report();
        assert_eq!(report.basic_root().children.len(), 1);
        assert_eq!(report.basic_root().children[0].data.num_calls, 5);
    }
}
