use crate::call_tree::ProfiledBlock;
use crate::overhead::OverheadEstimate;
use std::ops::Add;

/// Common view over the two kinds of aggregated statistics.
pub trait EntryData {
    fn name(&self) -> &str;
    fn num_calls(&self) -> u32;
}

/// One node of an aggregated report tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingEntry<D> {
    pub data: D,
    pub children: Vec<SamplingEntry<D>>,
}

pub type BasicSamplingEntry = SamplingEntry<BasicEntryData>;
pub type PreciseSamplingEntry = SamplingEntry<PreciseEntryData>;

impl<D: EntryData> SamplingEntry<D> {
    pub fn name(&self) -> &str {
        self.data.name()
    }

    pub fn children(&self) -> &[SamplingEntry<D>] {
        &self.children
    }

    pub fn find_child(&self, name: &str) -> Option<&SamplingEntry<D>> {
        self.children.iter().find(|child| child.name() == name)
    }

    /// Follows `path` through successive [`find_child`](Self::find_child) lookups.
    pub fn find_path(&self, path: &[&str]) -> Option<&SamplingEntry<D>> {
        path.iter()
            .try_fold(self, |entry, name| entry.find_child(name))
    }
}

/// Wall-clock statistics of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicEntryData {
    pub name: String,
    pub num_calls: u32,
    pub avg_time_ms: f64,
    pub max_time_ms: f64,
    pub total_time_ms: f64,
    pub avg_self_time_ms: f64,
    pub total_self_time_ms: f64,
    /// Cost of one timer start/stop pair.
    pub estimated_self_overhead_ms: f64,
    /// Modeled instrumentation cost of this region and everything sampled inside it.
    pub estimated_overhead_ms: f64,
    pub pct_of_parent: f32,
    pub mem_allocs: u64,
    pub mem_frees: u64,
}

impl Default for BasicEntryData {
    fn default() -> Self {
        BasicEntryData {
            name: String::new(),
            num_calls: 0,
            avg_time_ms: 0.0,
            max_time_ms: 0.0,
            total_time_ms: 0.0,
            avg_self_time_ms: 0.0,
            total_self_time_ms: 0.0,
            estimated_self_overhead_ms: 0.0,
            estimated_overhead_ms: 0.0,
            pct_of_parent: 1.0,
            mem_allocs: 0,
            mem_frees: 0,
        }
    }
}

/// Cycle statistics of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct PreciseEntryData {
    pub name: String,
    pub num_calls: u32,
    pub avg_cycles: u64,
    pub max_cycles: u64,
    pub total_cycles: u64,
    pub avg_self_cycles: u64,
    pub total_self_cycles: u64,
    pub estimated_self_overhead: u64,
    pub estimated_overhead: u64,
    pub pct_of_parent: f32,
    pub mem_allocs: u64,
    pub mem_frees: u64,
}

impl Default for PreciseEntryData {
    fn default() -> Self {
        PreciseEntryData {
            name: String::new(),
            num_calls: 0,
            avg_cycles: 0,
            max_cycles: 0,
            total_cycles: 0,
            avg_self_cycles: 0,
            total_self_cycles: 0,
            estimated_self_overhead: 0,
            estimated_overhead: 0,
            pct_of_parent: 1.0,
            mem_allocs: 0,
            mem_frees: 0,
        }
    }
}

impl EntryData for BasicEntryData {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_calls(&self) -> u32 {
        self.num_calls
    }
}

impl EntryData for PreciseEntryData {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_calls(&self) -> u32 {
        self.num_calls
    }
}

/// Aggregation steps the report builder runs on either kind of entry.
pub(crate) trait Aggregate: EntryData + Default {
    type Amount: Copy + Default + Add<Output = Self::Amount>;

    /// Statistics of the block's own samples, with the overhead of those samples.
    fn from_block(block: &ProfiledBlock, overhead: &OverheadEstimate) -> Self;
    fn total(&self) -> Self::Amount;
    fn overhead(&self) -> Self::Amount;
    fn add_overhead(&mut self, amount: Self::Amount);
    fn set_pct_of_parent(&mut self, parent_total: Self::Amount);
    /// Derives the self statistics once the time spent in children is known.
    fn set_child_total(&mut self, child_total: Self::Amount);
}

impl Aggregate for BasicEntryData {
    type Amount = f64;

    fn from_block(block: &ProfiledBlock, overhead: &OverheadEstimate) -> Self {
        let mut data = BasicEntryData {
            name: block.name.clone(),
            ..Default::default()
        };

        for sample in block.basic.samples() {
            data.total_time_ms += sample.time_ms;
            data.max_time_ms = data.max_time_ms.max(sample.time_ms);
            data.mem_allocs += sample.num_allocs;
            data.mem_frees += sample.num_frees;
        }

        data.num_calls = block.basic.num_samples() as u32;
        if data.num_calls > 0 {
            data.avg_time_ms = data.total_time_ms / f64::from(data.num_calls);
        }

        data.estimated_overhead_ms = block.basic.num_samples() as f64
            * overhead.basic_sampling_ms
            + block.precise.num_samples() as f64 * overhead.precise_sampling_ms;
        data.estimated_self_overhead_ms = overhead.basic_timer_ms;
        data
    }

    fn total(&self) -> f64 {
        self.total_time_ms
    }

    fn overhead(&self) -> f64 {
        self.estimated_overhead_ms
    }

    fn add_overhead(&mut self, amount: f64) {
        self.estimated_overhead_ms += amount;
    }

    fn set_pct_of_parent(&mut self, parent_total: f64) {
        let pct = self.total_time_ms / parent_total;
        self.pct_of_parent = if pct.is_finite() { pct as f32 } else { 0.0 };
    }

    fn set_child_total(&mut self, child_total: f64) {
        self.total_self_time_ms = self.total_time_ms - child_total;
        if self.num_calls > 0 {
            self.avg_self_time_ms = self.total_self_time_ms / f64::from(self.num_calls);
        }
    }
}

impl Aggregate for PreciseEntryData {
    type Amount = u64;

    fn from_block(block: &ProfiledBlock, overhead: &OverheadEstimate) -> Self {
        let mut data = PreciseEntryData {
            name: block.name.clone(),
            ..Default::default()
        };

        for sample in block.precise.samples() {
            data.total_cycles += sample.cycles;
            data.max_cycles = data.max_cycles.max(sample.cycles);
            data.mem_allocs += sample.num_allocs;
            data.mem_frees += sample.num_frees;
        }

        data.num_calls = block.precise.num_samples() as u32;
        if data.num_calls > 0 {
            data.avg_cycles = data.total_cycles / u64::from(data.num_calls);
        }

        data.estimated_overhead = block.precise.num_samples() as u64
            * overhead.precise_sampling_cycles
            + block.basic.num_samples() as u64 * overhead.basic_sampling_cycles;
        data.estimated_self_overhead = overhead.precise_timer_cycles;
        data
    }

    fn total(&self) -> u64 {
        self.total_cycles
    }

    fn overhead(&self) -> u64 {
        self.estimated_overhead
    }

    fn add_overhead(&mut self, amount: u64) {
        self.estimated_overhead += amount;
    }

    fn set_pct_of_parent(&mut self, parent_total: u64) {
        self.pct_of_parent = if parent_total == 0 {
            0.0
        } else {
            (self.total_cycles as f64 / parent_total as f64) as f32
        };
    }

    fn set_child_total(&mut self, child_total: u64) {
        // cycle counts of different cores can disagree slightly
        self.total_self_cycles = self.total_cycles.saturating_sub(child_total);
        if self.num_calls > 0 {
            self.avg_self_cycles = self.total_self_cycles / u64::from(self.num_calls);
        }
    }
}
