use clap::Parser;
use std::path::PathBuf;
use std::sync::OnceLock;

pub mod call_tree;
pub mod config;
pub mod error;
pub mod overhead;
pub mod profiler;
pub mod report;
pub mod sample_data;
pub mod scope;
pub mod thread_info;
pub mod timer;

pub use config::*;
pub use error::*;
pub use overhead::OverheadEstimate;
pub use profiler::ProfilerCpu;
pub use report::*;
pub use scope::SampleScope;

pub use cpu_profiler_common::{
    AllocCounters, BasicSample, CountingAllocator, MemoryCounter, PreciseSample, SamplingType,
    ALLOC_COUNTERS,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[derive(Debug)]
pub struct CliInputs {
    /// JSON profiler configuration; defaults are used when omitted
    #[arg(short, long, value_name = "config")]
    pub config: Option<PathBuf>,

    /// Worker threads running the instrumented workload
    #[arg(short, long, value_name = "threads", default_value_t = 4)]
    pub threads: usize,

    /// Frames simulated on every worker thread
    #[arg(short, long, value_name = "frames", default_value_t = 60)]
    pub frames: u32,
}

/// Process-wide profiler with the default configuration, calibrated on first use.
pub fn global() -> &'static ProfilerCpu {
    static GLOBAL: OnceLock<ProfilerCpu> = OnceLock::new();
    GLOBAL.get_or_init(|| ProfilerCpu::new(ProfilerConfig::default()))
}
