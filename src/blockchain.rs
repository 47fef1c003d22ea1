//! `Blockchain` — a single-parent, longest-chain baseline, kept around as a
//! non-DAG point of comparison against the PHANTOM-family engines.

use tracing::trace;

use crate::block::Block;
use crate::dag::Dag;
use crate::errors::{DagError, DagResult};
use crate::{BlockId, BlockIdMap, BlockIdSet, HashMapCustomHasher, KType};

/// A classic longest-chain blockchain. Blocks are expected to declare a
/// single parent; if more than one is declared (e.g. a reorg candidate),
/// the one extending the longest chain wins, ties toward the smaller id —
/// the same tie-break PHANTOM uses elsewhere.
pub struct Blockchain {
    blocks: BlockIdMap<Block>,
    parent_of: BlockIdMap<Option<BlockId>>,
    chain_length: BlockIdMap<u64>,
    leaves: BlockIdSet,
    longest_chain_tip: Option<BlockId>,
    longest_chain: BlockIdSet,
}

impl Blockchain {
    pub fn new() -> Self {
        Self {
            blocks: BlockIdMap::new(),
            parent_of: BlockIdMap::new(),
            chain_length: BlockIdMap::new(),
            leaves: BlockIdSet::new(),
            longest_chain_tip: None,
            longest_chain: BlockIdSet::new(),
        }
    }

    pub fn longest_chain_tip(&self) -> Option<BlockId> {
        self.longest_chain_tip
    }

    pub fn chain_length(&self, id: BlockId) -> Option<u64> {
        self.chain_length.get(&id).copied()
    }

    fn longest_chain_tip_among(&self, ids: &BlockIdSet) -> Option<BlockId> {
        let mut sorted: Vec<BlockId> = ids.iter().copied().collect();
        sorted.sort();
        let mut best: Option<BlockId> = None;
        for id in sorted {
            let take = match best {
                None => true,
                Some(b) => self.chain_length[&id] > self.chain_length[&b],
            };
            if take {
                best = Some(id);
            }
        }
        best
    }

    fn chain_from(&self, tip: Option<BlockId>) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut cur = tip;
        while let Some(id) = cur {
            out.push(id);
            cur = self.parent_of.get(&id).copied().flatten();
        }
        out
    }

    fn update_longest_chain_incrementally(&mut self, id: BlockId, parent: Option<BlockId>) {
        let chain_length = self.chain_length[&id];
        let better = match self.longest_chain_tip {
            None => true,
            Some(tip) => {
                let tip_len = self.chain_length[&tip];
                chain_length > tip_len || (chain_length == tip_len && id < tip)
            }
        };
        if !better {
            return;
        }

        let previous_tip = self.longest_chain_tip;
        self.longest_chain_tip = Some(id);

        if parent == previous_tip {
            self.longest_chain.insert(id);
            return;
        }

        let mut intersection = None;
        let mut to_add = BlockIdSet::new();
        for cur in self.chain_from(Some(id)) {
            if self.longest_chain.contains(&cur) {
                intersection = Some(cur);
                break;
            }
            to_add.insert(cur);
        }
        for cur in self.chain_from(previous_tip) {
            if Some(cur) == intersection {
                break;
            }
            self.longest_chain.remove(&cur);
        }
        self.longest_chain.extend(to_add);
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Dag for Blockchain {
    fn add(&mut self, block: Block) -> DagResult<()> {
        let id = block.id();
        let declared_parents = block.parents().clone();
        let known_parents: BlockIdSet =
            declared_parents.iter().copied().filter(|p| self.blocks.contains_key(p)).collect();

        let parent = if declared_parents.is_empty() {
            None
        } else if known_parents.is_empty() {
            let mut missing: Vec<BlockId> = declared_parents.iter().copied().collect();
            missing.sort();
            return Err(DagError::NoValidParent(missing));
        } else {
            self.longest_chain_tip_among(&known_parents)
        };

        let chain_length = 1 + parent.map(|p| self.chain_length[&p]).unwrap_or(0);

        self.parent_of.insert(id, parent);
        self.chain_length.insert(id, chain_length);
        self.blocks.insert(id, block);

        if let Some(p) = parent {
            self.leaves.remove(&p);
        }
        self.leaves.insert(id);

        self.update_longest_chain_incrementally(id, parent);
        trace!(block = id.0, chain_length, "block added to blockchain");

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
        self.longest_chain_tip.into_iter().collect()
    }

    fn is_a_before_b(&mut self, a: BlockId, b: BlockId) -> Option<bool> {
        let a_in = self.longest_chain.contains(&a);
        let b_in = self.longest_chain.contains(&b);
        match (a_in, b_in) {
            (false, false) => None,
            (false, true) => Some(false),
            (true, false) => Some(true),
            (true, true) => Some(self.chain_length[&a] <= self.chain_length[&b]),
        }
    }

    fn get_depth(&mut self, id: BlockId) -> i64 {
        if !self.contains(id) {
            return crate::errors::DEPTH_ABSENT;
        }
        if !self.longest_chain.contains(&id) {
            return 0;
        }
        let tip = self.longest_chain_tip.expect("a non-empty longest_chain has a tip");
        (self.chain_length[&tip] - self.chain_length[&id]) as i64
    }

    /// `Blockchain` has no coloring parameter; this is a no-op provided
    /// only to satisfy the shared [`Dag`] interface.
    fn set_k(&mut self, _k: KType) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blk(id: u64, parents: &[u64]) -> Block {
        Block::new(BlockId::new(id), parents.iter().map(|&p| BlockId::new(p)), 0, None)
    }

    #[test]
    fn linear_chain_orders_by_length() {
        let mut chain = Blockchain::new();
        chain.add(blk(0, &[])).unwrap();
        chain.add(blk(1, &[0])).unwrap();
        chain.add(blk(2, &[1])).unwrap();

        assert_eq!(chain.longest_chain_tip(), Some(BlockId::new(2)));
        assert_eq!(chain.virtual_block_parents(), vec![BlockId::new(2)]);
        assert_eq!(chain.is_a_before_b(BlockId::new(0), BlockId::new(2)), Some(true));
        assert_eq!(chain.get_depth(BlockId::new(0)), 2);
        assert_eq!(chain.get_depth(BlockId::new(2)), 0);
    }

    #[test]
    fn fork_reorgs_to_longer_chain() {
        let mut chain = Blockchain::new();
        chain.add(blk(0, &[])).unwrap();
        chain.add(blk(1, &[0])).unwrap();
        chain.add(blk(2, &[0])).unwrap();
        chain.add(blk(3, &[2])).unwrap();
        chain.add(blk(4, &[3])).unwrap();

        assert_eq!(chain.longest_chain_tip(), Some(BlockId::new(4)));
        // Block 1 forked off the winning chain, so it has no defined
        // position relative to a block that IS on the chain.
        assert_eq!(chain.is_a_before_b(BlockId::new(1), BlockId::new(4)), Some(false));
        assert_eq!(chain.is_a_before_b(BlockId::new(1), BlockId::new(1)), None);
    }

    #[test]
    fn equal_length_forks_tie_break_to_smaller_id() {
        let mut chain = Blockchain::new();
        chain.add(blk(0, &[])).unwrap();
        chain.add(blk(2, &[0])).unwrap();
        chain.add(blk(1, &[0])).unwrap();

        assert_eq!(chain.longest_chain_tip(), Some(BlockId::new(1)));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut chain = Blockchain::new();
        chain.add(blk(0, &[])).unwrap();
        let err = chain.add(blk(1, &[99])).unwrap_err();
        assert_eq!(err, DagError::NoValidParent(vec![BlockId::new(99)]));
    }

    #[test]
    fn absent_block_has_sentinel_depth() {
        let mut chain = Blockchain::new();
        chain.add(blk(0, &[])).unwrap();
        assert_eq!(chain.get_depth(BlockId::new(99)), crate::errors::DEPTH_ABSENT);
        assert_eq!(chain.is_a_before_b(BlockId::new(99), BlockId::new(0)), Some(false));
    }
}
