use super::entry::{Aggregate, SamplingEntry};
use crate::call_tree::{BlockId, CallTree};
use crate::overhead::OverheadEstimate;
use std::collections::VecDeque;

#[derive(Debug)]
pub(crate) struct FlatNode {
    pub block: BlockId,
    pub children: Vec<usize>,
}

/// Breadth-first numbering of a call tree. Node 0 is the root and every node's
/// index is greater than its parent's, so walking the indices backwards visits
/// children before parents.
#[derive(Debug)]
pub(crate) struct FlatHierarchy {
    nodes: Vec<FlatNode>,
}

impl FlatHierarchy {
    pub fn new(tree: &CallTree) -> Self {
        let mut nodes = vec![FlatNode {
            block: BlockId::ROOT,
            children: Vec::new(),
        }];

        let mut todo = VecDeque::from([0]);
        while let Some(idx) = todo.pop_front() {
            let block = nodes[idx].block;
            for &child in tree.block(block).children() {
                let child_idx = nodes.len();
                nodes.push(FlatNode {
                    block: child,
                    children: Vec::new(),
                });
                nodes[idx].children.push(child_idx);
                todo.push_back(child_idx);
            }
        }

        FlatHierarchy { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: usize) -> &FlatNode {
        &self.nodes[idx]
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].children
    }
}

/// The flat hierarchy with every node that has no calls spliced out.
///
/// A dropped node's descendants are attached, in place, to its nearest kept
/// ancestor. The root is always kept.
#[derive(Debug)]
pub(crate) struct PrunedHierarchy {
    kept: Vec<bool>,
    children: Vec<Vec<usize>>,
}

impl PrunedHierarchy {
    pub fn new(flat: &FlatHierarchy, has_calls: impl Fn(usize) -> bool) -> Self {
        let mut kept = vec![false; flat.len()];
        let mut children = vec![Vec::new(); flat.len()];
        kept[0] = true;

        // (node, nearest kept ancestor); children are pushed in reverse so they
        // are visited, and attached, in their original order
        let mut todo = vec![(0, 0)];
        while let Some((idx, anchor)) = todo.pop() {
            let anchor = if idx != 0 && has_calls(idx) {
                kept[idx] = true;
                children[anchor].push(idx);
                idx
            } else {
                anchor
            };
            todo.extend(flat.children(idx).iter().rev().map(|&child| (child, anchor)));
        }

        PrunedHierarchy { kept, children }
    }

    pub fn is_kept(&self, idx: usize) -> bool {
        self.kept[idx]
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }
}

/// Computes the statistics of every flat node, children before parents.
///
/// Overhead is folded up through every child, kept or not, so a dropped node's
/// cost still reaches its ancestors. Self time and percentages are taken against
/// the children a node has in the pruned tree.
pub(crate) fn aggregate<D: Aggregate>(
    tree: &CallTree,
    flat: &FlatHierarchy,
    pruned: &PrunedHierarchy,
    overhead: &OverheadEstimate,
) -> Vec<D> {
    let mut entries: Vec<D> = (0..flat.len())
        .map(|idx| D::from_block(tree.block(flat.node(idx).block), overhead))
        .collect();

    for idx in (0..flat.len()).rev() {
        let child_overhead = flat
            .children(idx)
            .iter()
            .fold(D::Amount::default(), |sum, &child| sum + entries[child].overhead());
        entries[idx].add_overhead(child_overhead);

        if !pruned.is_kept(idx) {
            continue;
        }

        let total = entries[idx].total();
        let mut child_total = D::Amount::default();
        for &child in pruned.children(idx) {
            child_total = child_total + entries[child].total();
            entries[child].set_pct_of_parent(total);
        }
        entries[idx].set_child_total(child_total);
    }

    entries
}

/// Moves the kept entries into an owned tree rooted at node 0.
pub(crate) fn assemble<D: Default>(
    mut entries: Vec<D>,
    pruned: &PrunedHierarchy,
) -> SamplingEntry<D> {
    let mut built: Vec<Option<SamplingEntry<D>>> = (0..entries.len()).map(|_| None).collect();

    for idx in (0..entries.len()).rev() {
        if !pruned.is_kept(idx) {
            continue;
        }
        let children = pruned
            .children(idx)
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[idx] = Some(SamplingEntry {
            data: std::mem::take(&mut entries[idx]),
            children,
        });
    }

    built
        .first_mut()
        .and_then(Option::take)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // root -> [A -> [C, D], B -> [E]]
    fn sample_tree() -> CallTree {
        let mut tree = CallTree::new("root");
        let a = tree.add_child(BlockId::ROOT, "A");
        let b = tree.add_child(BlockId::ROOT, "B");
        tree.add_child(a, "C");
        tree.add_child(a, "D");
        tree.add_child(b, "E");
        tree
    }

    fn names(tree: &CallTree, flat: &FlatHierarchy, idxs: &[usize]) -> Vec<String> {
        idxs.iter()
            .map(|&idx| tree.block(flat.node(idx).block).name.clone())
            .collect()
    }

    #[test]
    fn flatten_numbers_breadth_first() {
        let tree = sample_tree();
        let flat = FlatHierarchy::new(&tree);

        assert_eq!(flat.len(), 6);
        let order: Vec<usize> = (0..flat.len()).collect();
        assert_eq!(names(&tree, &flat, &order), ["root", "A", "B", "C", "D", "E"]);
        assert_eq!(flat.children(0), &[1, 2]);
        assert_eq!(flat.children(1), &[3, 4]);
        assert_eq!(flat.children(2), &[5]);
        for idx in 0..flat.len() {
            assert!(flat.children(idx).iter().all(|&child| child > idx));
        }
    }

    #[test]
    fn pruning_splices_children_into_place() {
        let tree = sample_tree();
        let flat = FlatHierarchy::new(&tree);
        // drop A (1) and E (5)
        let pruned = PrunedHierarchy::new(&flat, |idx| idx != 1 && idx != 5);

        assert!(pruned.is_kept(0));
        assert!(!pruned.is_kept(1));
        assert!(!pruned.is_kept(5));
        assert_eq!(names(&tree, &flat, pruned.children(0)), ["C", "D", "B"]);
        assert!(pruned.children(2).is_empty());
    }

    #[test]
    fn pruning_everything_keeps_the_root() {
        let tree = sample_tree();
        let flat = FlatHierarchy::new(&tree);
        let pruned = PrunedHierarchy::new(&flat, |_| false);

        assert!(pruned.is_kept(0));
        assert!(pruned.children(0).is_empty());
        assert!((1..flat.len()).all(|idx| !pruned.is_kept(idx)));
    }

    #[test]
    fn pruning_through_a_chain_of_empty_nodes() {
        let mut tree = CallTree::new("root");
        let a = tree.add_child(BlockId::ROOT, "A");
        let b = tree.add_child(a, "B");
        let c = tree.add_child(b, "C");
        tree.add_child(c, "D");
        let flat = FlatHierarchy::new(&tree);
        let pruned = PrunedHierarchy::new(&flat, |idx| idx == 1 || idx == 4);

        assert_eq!(names(&tree, &flat, pruned.children(0)), ["A"]);
        assert_eq!(names(&tree, &flat, pruned.children(1)), ["D"]);
    }

    #[test]
    fn assemble_builds_the_kept_tree() {
        let tree = sample_tree();
        let flat = FlatHierarchy::new(&tree);
        let pruned = PrunedHierarchy::new(&flat, |idx| idx != 1);
        let entries: Vec<String> = (0..flat.len())
            .map(|idx| tree.block(flat.node(idx).block).name.clone())
            .collect();

        let root = assemble(entries, &pruned);
        assert_eq!(root.data, "root");
        let top: Vec<&str> = root.children.iter().map(|c| c.data.as_str()).collect();
        assert_eq!(top, ["C", "D", "B"]);
        assert_eq!(root.children[2].children[0].data, "E");
    }
}
