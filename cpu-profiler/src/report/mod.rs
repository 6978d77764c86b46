//! Aggregated, pruned views of a thread's call tree.

mod builder;
mod entry;

pub use entry::{
    BasicEntryData, BasicSamplingEntry, EntryData, PreciseEntryData, PreciseSamplingEntry,
    SamplingEntry,
};

use crate::call_tree::CallTree;
use crate::overhead::OverheadEstimate;
use builder::{aggregate, assemble, FlatHierarchy, PrunedHierarchy};

/// Snapshot of one thread's profile, as two independent trees: one built from
/// the wall-clock samples and one from the cycle-counted samples.
///
/// A report owns all of its data and shares nothing with the profiler, so it can
/// be kept or sent to another thread while sampling goes on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuProfilerReport {
    basic_root: BasicSamplingEntry,
    precise_root: PreciseSamplingEntry,
}

impl CpuProfilerReport {
    pub(crate) fn generate(tree: &CallTree, overhead: &OverheadEstimate) -> Self {
        let flat = FlatHierarchy::new(tree);

        let basic = PrunedHierarchy::new(&flat, |idx| {
            tree.block(flat.node(idx).block).basic.num_samples() > 0
        });
        let precise = PrunedHierarchy::new(&flat, |idx| {
            tree.block(flat.node(idx).block).precise.num_samples() > 0
        });

        let basic_entries = aggregate::<BasicEntryData>(tree, &flat, &basic, overhead);
        let precise_entries = aggregate::<PreciseEntryData>(tree, &flat, &precise, overhead);

        CpuProfilerReport {
            basic_root: assemble(basic_entries, &basic),
            precise_root: assemble(precise_entries, &precise),
        }
    }

    pub fn basic_root(&self) -> &BasicSamplingEntry {
        &self.basic_root
    }

    pub fn precise_root(&self) -> &PreciseSamplingEntry {
        &self.precise_root
    }

    pub fn into_roots(self) -> (BasicSamplingEntry, PreciseSamplingEntry) {
        (self.basic_root, self.precise_root)
    }
}
