use clap::Parser;
use cpu_profiler::{
    BasicEntryData, CliInputs, CountingAllocator, EntryData, PreciseEntryData, ProfilerConfig,
    ProfilerCpu, SamplingEntry, ALLOC_COUNTERS,
};
use itertools::Itertools;
use log::info;
use std::alloc::System;
use std::hint::black_box;

#[global_allocator]
static GLOBAL: CountingAllocator<System> = CountingAllocator::new(System, &ALLOC_COUNTERS);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let inputs = CliInputs::parse();
    let config = match &inputs.config {
        Some(path) => ProfilerConfig::from_json_file(path)?,
        None => ProfilerConfig::default(),
    };

    let profiler = ProfilerCpu::new(config);
    info!("profiler overhead: {:?}", profiler.overhead());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(inputs.threads)
        .thread_name(|idx| format!("worker-{idx}"))
        .build()?;

    let reports = pool.broadcast(|ctx| {
        let name = format!("worker-{}", ctx.index());
        profiler.begin_thread(&name);
        for frame in 0..inputs.frames {
            simulate_frame(&profiler, frame);
        }
        profiler.end_thread();
        (name, profiler.generate_report())
    });

    for (thread, report) in &reports {
        log_tree(thread, "basic", report.basic_root(), describe_basic);
        log_tree(thread, "precise", report.precise_root(), describe_precise);
    }
    info!("threads seen: {}", profiler.known_threads().iter().join(", "));
    Ok(())
}

fn simulate_frame(profiler: &ProfilerCpu, frame: u32) {
    let _frame = profiler.scope("Frame");

    {
        let _update = profiler.scope("Update");
        let positions: Vec<u64> = (0..2_000).map(|i| i * u64::from(frame)).collect();
        black_box(positions.iter().sum::<u64>());
    }

    {
        let _render = profiler.scope_precise("Render");
        for batch in 0..4u64 {
            profiler.begin_sample("DrawBatch");
            let vertices = (0..500).map(|v| v ^ batch).collect_vec();
            black_box(vertices);
            profiler.end_sample("DrawBatch");
        }
    }
}

fn log_tree<D: EntryData>(
    thread: &str,
    kind: &str,
    root: &SamplingEntry<D>,
    describe: impl Fn(&D) -> String,
) {
    info!("[{thread}] {kind} report");
    let mut todo = vec![(root, 0)];
    while let Some((entry, depth)) = todo.pop() {
        info!(
            "[{thread}] {:indent$}{} x{}: {}",
            "",
            entry.name(),
            entry.data.num_calls(),
            describe(&entry.data),
            indent = depth * 2
        );
        todo.extend(entry.children().iter().rev().map(|child| (child, depth + 1)));
    }
}

fn describe_basic(data: &BasicEntryData) -> String {
    format!(
        "total {:.3}ms, self {:.3}ms, max {:.3}ms, {:.1}% of parent, overhead {:.3}ms, allocs {}/{}",
        data.total_time_ms,
        data.total_self_time_ms,
        data.max_time_ms,
        data.pct_of_parent * 100.0,
        data.estimated_overhead_ms,
        data.mem_allocs,
        data.mem_frees
    )
}

fn describe_precise(data: &PreciseEntryData) -> String {
    format!(
        "total {} cycles, self {} cycles, max {} cycles, {:.1}% of parent, overhead {} cycles, allocs {}/{}",
        data.total_cycles,
        data.total_self_cycles,
        data.max_cycles,
        data.pct_of_parent * 100.0,
        data.estimated_overhead,
        data.mem_allocs,
        data.mem_frees
    )
}
