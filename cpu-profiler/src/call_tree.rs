use crate::sample_data::{BasicSampleData, PreciseSampleData};
use log::trace;

/// Index of a block inside its [`CallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    pub const ROOT: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// All samples recorded for one region name at one call-stack position.
///
/// Both timer types accumulate independently on the same block.
#[derive(Debug, Clone, Default)]
pub struct ProfiledBlock {
    pub name: String,
    pub basic: BasicSampleData,
    pub precise: PreciseSampleData,
    children: Vec<BlockId>,
}

impl ProfiledBlock {
    fn new(name: &str) -> Self {
        ProfiledBlock {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Children in the order they were first seen.
    pub fn children(&self) -> &[BlockId] {
        &self.children
    }
}

/// Arena holding a thread's whole block tree. The root is always [`BlockId::ROOT`].
///
/// Blocks are only ever appended, so a child's index is always greater than its
/// parent's. Dropping the arena releases the whole tree at once.
#[derive(Debug, Clone)]
pub struct CallTree {
    blocks: Vec<ProfiledBlock>,
}

impl CallTree {
    pub fn new(root_name: &str) -> Self {
        CallTree {
            blocks: vec![ProfiledBlock::new(root_name)],
        }
    }

    pub fn root(&self) -> &ProfiledBlock {
        &self.blocks[0]
    }

    pub fn root_mut(&mut self) -> &mut ProfiledBlock {
        &mut self.blocks[0]
    }

    pub fn block(&self, id: BlockId) -> &ProfiledBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut ProfiledBlock {
        &mut self.blocks[id.0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// First direct child of `parent` named exactly `name`.
    pub fn find_child(&self, parent: BlockId, name: &str) -> Option<BlockId> {
        self.blocks[parent.0]
            .children
            .iter()
            .copied()
            .find(|&child| self.blocks[child.0].name == name)
    }

    pub fn add_child(&mut self, parent: BlockId, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        trace!("new block {:?} under {:?}: {}", id, parent, name);
        self.blocks.push(ProfiledBlock::new(name));
        self.blocks[parent.0].children.push(id);
        id
    }

    /// Reuses the child named `name` under `parent`, creating it on first use.
    pub fn find_or_add_child(&mut self, parent: BlockId, name: &str) -> BlockId {
        match self.find_child(parent, name) {
            Some(id) => id,
            None => self.add_child(parent, name),
        }
    }
}
