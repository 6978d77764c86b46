use crate::call_tree::{BlockId, CallTree};
use crate::error::UsageError;
use cpu_profiler_common::{MemoryCounter, SamplingType};
use std::thread::{self, ThreadId};

/// Root name used when sampling starts on a thread that never called `begin_thread`.
pub const UNKNOWN_THREAD_NAME: &str = "Unknown";

/// An open region: which block it is and which timer is running on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBlock {
    pub sampling_type: SamplingType,
    pub block: BlockId,
}

/// Sampling state of a single thread.
///
/// Inactive until [`begin`](Self::begin) opens the root block, active until
/// [`end`](Self::end) closes everything that is still open. The call tree
/// survives `end` and keeps accumulating over later `begin`/`end` cycles until
/// [`reset`](Self::reset) drops it.
///
/// A state belongs to the thread that created it; see [`owner`](Self::owner).
#[derive(Debug)]
pub struct ThreadInfo {
    owner: ThreadId,
    is_active: bool,
    tree: Option<CallTree>,
    active_blocks: Vec<ActiveBlock>,
}

impl Default for ThreadInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadInfo {
    /// Fresh state owned by the calling thread.
    pub fn new() -> Self {
        ThreadInfo {
            owner: thread::current().id(),
            is_active: false,
            tree: None,
            active_blocks: Vec::new(),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owned_by_current_thread(&self) -> bool {
        self.owner == thread::current().id()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn tree(&self) -> Option<&CallTree> {
        self.tree.as_ref()
    }

    /// Top of the open-region stack.
    pub fn active_block(&self) -> Option<ActiveBlock> {
        self.active_blocks.last().copied()
    }

    pub fn num_open_blocks(&self) -> usize {
        self.active_blocks.len()
    }

    pub fn begin(&mut self, name: &str, memory: &dyn MemoryCounter) -> Result<(), UsageError> {
        if self.is_active {
            return Err(UsageError::ThreadAlreadyActive);
        }

        let tree = self.tree.get_or_insert_with(|| CallTree::new(name));
        let root = tree.root_mut();
        if root.name != name {
            root.name = name.to_owned();
        }

        self.active_blocks.push(ActiveBlock {
            sampling_type: SamplingType::Basic,
            block: BlockId::ROOT,
        });
        root.basic.begin_sample(memory);
        self.is_active = true;
        Ok(())
    }

    /// Closes every open block, innermost first, and marks the thread inactive.
    ///
    /// Blocks other than the innermost one being open means begin and end calls
    /// were mismatched; they are still closed but their data is unreliable.
    pub fn end(&mut self, memory: &dyn MemoryCounter) -> Result<(), UsageError> {
        let was_active = self.is_active;

        if let Some(active) = self.active_blocks.pop() {
            self.close(active, memory);
        }

        let unclosed = self.active_blocks.len();
        while let Some(active) = self.active_blocks.pop() {
            self.close(active, memory);
        }

        self.active_blocks.clear();
        self.is_active = false;

        if !was_active {
            Err(UsageError::ThreadNotActive)
        } else if unclosed > 0 {
            Err(UsageError::UnclosedSamples { count: unclosed })
        } else {
            Ok(())
        }
    }

    /// Ends the thread if needed and drops its call tree.
    pub fn reset(&mut self, memory: &dyn MemoryCounter) -> Result<(), UsageError> {
        let result = if self.is_active {
            self.end(memory)
        } else {
            Ok(())
        };
        self.tree = None;
        result
    }

    /// Opens `name` under the innermost open block, starting the thread as
    /// [`UNKNOWN_THREAD_NAME`] if it isn't being sampled yet.
    pub fn begin_sample(
        &mut self,
        name: &str,
        sampling_type: SamplingType,
        memory: &dyn MemoryCounter,
    ) -> Result<(), UsageError> {
        if !self.is_active {
            self.begin(UNKNOWN_THREAD_NAME, memory)?;
        }

        let parent = self
            .active_block()
            .map(|active| active.block)
            .unwrap_or(BlockId::ROOT);
        let tree = self
            .tree
            .get_or_insert_with(|| CallTree::new(UNKNOWN_THREAD_NAME));
        let block = tree.find_or_add_child(parent, name);

        self.active_blocks.push(ActiveBlock {
            sampling_type,
            block,
        });

        let block = tree.block_mut(block);
        match sampling_type {
            SamplingType::Basic => block.basic.begin_sample(memory),
            SamplingType::Precise => block.precise.begin_sample(memory),
        }
        Ok(())
    }

    /// Closes the innermost open block.
    ///
    /// With `validate` set, the call is rejected without touching any state when
    /// the innermost block was opened with the other timer or under another name.
    pub fn end_sample(
        &mut self,
        name: &str,
        sampling_type: SamplingType,
        validate: bool,
        memory: &dyn MemoryCounter,
    ) -> Result<(), UsageError> {
        let (Some(active), Some(tree)) = (self.active_block(), self.tree.as_ref()) else {
            return Err(UsageError::NoOpenSample { sampling_type });
        };

        if validate {
            if active.sampling_type != sampling_type {
                return Err(UsageError::SamplingTypeMismatch {
                    expected: active.sampling_type,
                    found: sampling_type,
                });
            }

            let open_name = &tree.block(active.block).name;
            if open_name != name {
                return Err(UsageError::NameMismatch {
                    expected: open_name.clone(),
                    found: name.to_owned(),
                });
            }
        }

        self.active_blocks.pop();
        self.close(active, memory);
        Ok(())
    }

    fn close(&mut self, active: ActiveBlock, memory: &dyn MemoryCounter) {
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let block = tree.block_mut(active.block);
        match active.sampling_type {
            SamplingType::Basic => block.basic.end_sample(memory),
            SamplingType::Precise => block.precise.end_sample(memory),
        }
    }
}
