//! `BruteForcePhantom` — the O(2^n) reference coloring, used only to
//! validate [`crate::greedy::GreedyPhantom`] on small test DAGs.

use tracing::trace;

use crate::block::Block;
use crate::dag::Dag;
use crate::errors::DagResult;
use crate::{BlockId, BlockIdMap, BlockIdSet, HashMapCustomHasher, KType};

/// Enumerates the power set of all blocks on every `add` to find the
/// largest subset `C` such that every `v` in `C` has `|anticone(v) ∩ C| <= k`.
///
/// This is deliberately not optimized: its only job is to be an obviously
/// correct oracle to cross-check `GreedyPhantom` against, not to scale.
pub struct BruteForcePhantom {
    k: KType,
    blocks: BlockIdMap<Block>,
    parents_of: BlockIdMap<BlockIdSet>,
    children_of: BlockIdMap<BlockIdSet>,
    insertion_order: Vec<BlockId>,
    leaves: BlockIdSet,
    coloring: BlockIdSet,
    local_id: BlockIdMap<usize>,
    genesis: Option<BlockId>,
}

impl BruteForcePhantom {
    pub fn new(k: KType) -> Self {
        Self {
            k,
            blocks: BlockIdMap::new(),
            parents_of: BlockIdMap::new(),
            children_of: BlockIdMap::new(),
            insertion_order: Vec::new(),
            leaves: BlockIdSet::new(),
            coloring: BlockIdSet::new(),
            local_id: BlockIdMap::new(),
            genesis: None,
        }
    }

    /// True iff `id` is in the current coloring (blue).
    pub fn is_blue(&self, id: BlockId) -> bool {
        self.coloring.contains(&id)
    }

    /// The current set of blue blocks.
    pub fn coloring(&self) -> &BlockIdSet {
        &self.coloring
    }

    fn past_of(&self, id: BlockId) -> BlockIdSet {
        let mut visited = BlockIdSet::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(parents) = self.parents_of.get(&cur) {
                for &parent in parents {
                    if self.blocks.contains_key(&parent) && visited.insert(parent) {
                        stack.push(parent);
                    }
                }
            }
        }
        visited
    }

    fn future_of(&self, id: BlockId) -> BlockIdSet {
        let mut visited = BlockIdSet::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(children) = self.children_of.get(&cur) {
                for &child in children {
                    if visited.insert(child) {
                        stack.push(child);
                    }
                }
            }
        }
        visited
    }

    fn anticone(&self, id: BlockId) -> BlockIdSet {
        let past = self.past_of(id);
        let future = self.future_of(id);
        self.blocks.keys().copied().filter(|&x| x != id && !past.contains(&x) && !future.contains(&x)).collect()
    }

    /// Returns the blue anticones for `coloring` if it's a valid coloring
    /// (every member's anticone intersected with `coloring` is `<= k`), else `None`.
    fn blue_anticones_if_valid(
        &self,
        anticones: &BlockIdMap<BlockIdSet>,
        coloring: &BlockIdSet,
    ) -> Option<BlockIdMap<BlockIdSet>> {
        let mut result = BlockIdMap::new();
        for (&id, anticone) in anticones.iter() {
            let blue_anticone: BlockIdSet = anticone.intersection(coloring).copied().collect();
            if coloring.contains(&id) && blue_anticone.len() as u64 > self.k {
                return None;
            }
            result.insert(id, blue_anticone);
        }
        Some(result)
    }

    fn recompute_coloring(&mut self) {
        let mut ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        ids.sort();
        let n = ids.len();
        assert!(n <= 24, "brute-force coloring is only usable on small test DAGs");

        let anticones: BlockIdMap<BlockIdSet> = ids.iter().map(|&id| (id, self.anticone(id))).collect();

        let mut max_coloring = BlockIdSet::new();
        for mask in 0u64..(1u64 << n) {
            let candidate: BlockIdSet = ids
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, &id)| id)
                .collect();
            if candidate.len() <= max_coloring.len() {
                continue;
            }
            if self.blue_anticones_if_valid(&anticones, &candidate).is_some() {
                max_coloring = candidate;
            }
        }

        self.coloring = max_coloring;
    }

    fn topo_visit(&self, leaves: &BlockIdSet, ordered: &mut BlockIdSet, out: &mut Vec<BlockId>) {
        let remaining: BlockIdSet = leaves.difference(ordered).copied().collect();
        if remaining.is_empty() {
            return;
        }

        let mut blue: Vec<BlockId> = remaining.iter().copied().filter(|id| self.coloring.contains(id)).collect();
        blue.sort();
        let mut red: Vec<BlockId> = remaining.iter().copied().filter(|id| !self.coloring.contains(id)).collect();
        red.sort();

        for leaf in blue.into_iter().chain(red) {
            ordered.insert(leaf);
            let parents = self.parents_of.get(&leaf).cloned().unwrap_or_default();
            self.topo_visit(&parents, ordered, out);
            out.push(leaf);
        }
    }

    fn recompute_topological_order(&mut self) {
        let mut ordered = BlockIdSet::new();
        let mut order = Vec::new();
        self.topo_visit(&self.leaves.clone(), &mut ordered, &mut order);

        self.genesis = order.first().copied();
        self.local_id.clear();
        for (lid, &gid) in order.iter().enumerate() {
            self.local_id.insert(gid, lid);
        }
    }
}

impl Dag for BruteForcePhantom {
    fn add(&mut self, block: Block) -> DagResult<()> {
        let id = block.id();
        let parents = block.parents().clone();

        for &parent in &parents {
            self.children_of.entry(parent).or_insert_with(BlockIdSet::new).insert(id);
        }
        self.parents_of.insert(id, parents.clone());
        self.blocks.insert(id, block);
        self.insertion_order.push(id);

        for parent in &parents {
            self.leaves.remove(parent);
        }
        self.leaves.insert(id);

        self.recompute_coloring();
        self.recompute_topological_order();
        trace!(block = id.0, coloring_size = self.coloring.len(), "brute-force coloring recomputed");

        Ok(())
    }

    fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    fn iter_ids(&self) -> Box<dyn Iterator<Item = BlockId> + '_> {
        Box::new(self.blocks.keys().copied())
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn virtual_block_parents(&self) -> Vec<BlockId> {
        let mut parents: Vec<BlockId> = self.leaves.iter().copied().collect();
        parents.sort();
        parents
    }

    fn is_a_before_b(&mut self, a: BlockId, b: BlockId) -> Option<bool> {
        let has_a = self.contains(a);
        let has_b = self.contains(b);
        match (has_a, has_b) {
            (false, false) => None,
            (true, false) => Some(true),
            (false, true) => Some(false),
            (true, true) => Some(self.local_id[&a] <= self.local_id[&b]),
        }
    }

    fn get_depth(&mut self, _id: BlockId) -> i64 {
        // The brute-force coloring is O(2^n); by the time a DAG is complex
        // enough to ask about a block's depth, recomputing it here would be
        // hopelessly slow.
        crate::errors::DEPTH_ABSENT
    }

    fn set_k(&mut self, k: KType) {
        let order = self.insertion_order.clone();
        let mut fresh = BruteForcePhantom::new(k);
        for id in order {
            let block = self.blocks.get(&id).expect("insertion_order only references known blocks").clone();
            fresh.add(block).expect("brute-force add never fails");
        }
        *self = fresh;
    }
}

impl BruteForcePhantom {
    pub fn genesis(&self) -> Option<BlockId> {
        self.genesis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blk(id: u64, parents: &[u64]) -> Block {
        Block::new(BlockId::new(id), parents.iter().map(|&p| BlockId::new(p)), 0, None)
    }

    #[test]
    fn genesis_alone_is_its_own_tip() {
        let mut dag = BruteForcePhantom::new(3);
        dag.add(blk(0, &[])).unwrap();
        assert_eq!(dag.len(), 1);
        assert_eq!(dag.virtual_block_parents(), vec![BlockId::new(0)]);
        assert_eq!(dag.is_a_before_b(BlockId::new(0), BlockId::new(0)), Some(true));
    }

    #[test]
    fn chain_with_fork_colors_all_blue() {
        let mut dag = BruteForcePhantom::new(3);
        dag.add(blk(0, &[])).unwrap();
        dag.add(blk(1, &[0])).unwrap();
        dag.add(blk(2, &[0])).unwrap();
        dag.add(blk(3, &[1])).unwrap();

        assert_eq!(dag.virtual_block_parents(), vec![BlockId::new(2), BlockId::new(3)]);
        assert_eq!(dag.coloring().len(), 4);
        assert_eq!(dag.is_a_before_b(BlockId::new(2), BlockId::new(3)), Some(true));
    }

    #[test]
    fn k_controls_coloring_size() {
        let blocks = [
            (0u64, vec![]),
            (1, vec![0]),
            (2, vec![0]),
            (3, vec![1, 2]),
            (4, vec![0]),
            (5, vec![4]),
            (6, vec![5]),
        ];

        for (k, expected_size) in [(1u64, 4usize), (0, 4), (3, 7)] {
            let mut dag = BruteForcePhantom::new(k);
            for (id, parents) in &blocks {
                dag.add(blk(*id, parents)).unwrap();
            }
            assert_eq!(dag.coloring().len(), expected_size, "k={k}");
        }
    }
}
