//! `CompetingChainGreedyPhantom` — a selfish-mining harness wrapped around
//! [`GreedyPhantom`]: a miner grows a private competing chain alongside the
//! honestly-observed DAG, and the harness tracks whether that private chain
//! could still overtake the honest tip.

use std::collections::VecDeque;

use tracing::{info, warn};

use crate::block::Block;
use crate::dag::Dag;
use crate::errors::DagResult;
use crate::greedy::GreedyPhantom;
use crate::{BlockId, BlockIdSet, HashMapCustomHasher, KType};

/// The capability a [`Dag`] needs to support a tracked attack: a dedicated
/// view of the parents a malicious miner should build on, and a verdict on
/// whether the current attack attempt has succeeded or given up.
pub trait MaliciousDag: Dag {
    /// The parents a new block should declare. `is_malicious` selects
    /// between the honest view (`false`, identical to [`Dag::virtual_block_parents`])
    /// and the attacker's private view (`true`).
    fn virtual_block_parents_for(&mut self, is_malicious: bool) -> Vec<BlockId>;

    /// True iff the current attack has reached the point its author would
    /// consider a confirmed win: the published result is both deep enough
    /// and ordered ahead of the block it targeted.
    fn did_attack_succeed(&mut self) -> bool;

    /// True iff there is no attack currently underway (either none was ever
    /// started, or the last one was abandoned).
    fn did_attack_fail(&self) -> bool;
}

/// A `GreedyPhantom` wrapped with bookkeeping for a single, possibly
/// ongoing, competing-chain (selfish mining) attack.
///
/// `inner` is the combined DAG (every block, honest and malicious, as seen
/// by an omniscient observer); `honest_dag` mirrors the sub-DAG an honest
/// participant would see, receiving malicious blocks only once the attack
/// against them is resolved.
pub struct CompetingChainGreedyPhantom {
    inner: GreedyPhantom,
    honest_dag: GreedyPhantom,

    competing_chain_tip: Option<BlockId>,
    currently_attacked_block: Option<BlockId>,
    first_parallel_block: Option<BlockId>,
    competing_chain_tip_antipast: BlockIdSet,
    virtual_competing_chain_block_parents: BlockIdSet,

    confirmation_depth: i64,
    maximal_depth_difference: u64,

    malicious_blocks_to_add_to_honest_dag: VecDeque<BlockId>,
    insertion_log: Vec<Block>,
}

impl CompetingChainGreedyPhantom {
    pub fn new(k: KType, confirmation_depth: i64, maximal_depth_difference: u64) -> Self {
        Self {
            inner: GreedyPhantom::new(k),
            honest_dag: GreedyPhantom::new(k),
            competing_chain_tip: None,
            currently_attacked_block: None,
            first_parallel_block: None,
            competing_chain_tip_antipast: BlockIdSet::new(),
            virtual_competing_chain_block_parents: BlockIdSet::new(),
            confirmation_depth,
            maximal_depth_difference,
            malicious_blocks_to_add_to_honest_dag: VecDeque::new(),
            insertion_log: Vec::new(),
        }
    }

    /// Adds `block` as a block mined by the attacker, extending the
    /// private competing chain.
    pub fn add_malicious(&mut self, block: Block) -> DagResult<()> {
        self.add_with_flag(block, true)
    }

    pub fn honest_dag(&self) -> &GreedyPhantom {
        &self.honest_dag
    }

    /// The bottom-most blocks (closest to the leaves) of `tip_antipast`
    /// that `tip` does not already overshadow: the parent set a selfish
    /// miner should build their next private block on.
    fn competing_chain_tip_parents(
        &self,
        tip: BlockId,
        tip_antipast: &BlockIdSet,
        initial_parents: &BlockIdSet,
    ) -> BlockIdSet {
        let mut result: BlockIdSet = initial_parents.clone();
        let mut visited: BlockIdSet = initial_parents.clone();
        let mut queue: VecDeque<BlockId> = self.inner.virtual_block_parents().into_iter().collect();

        while let Some(gid) = queue.pop_front() {
            if visited.contains(&gid) || !tip_antipast.contains(&gid) {
                continue;
            }
            visited.insert(gid);

            if self.inner.is_a_bluer_than_b(tip, gid) {
                result.insert(gid);

                let mut ancestors: VecDeque<BlockId> =
                    self.inner.parents(gid).cloned().unwrap_or_default().into_iter().collect();
                while let Some(ancestor) = ancestors.pop_front() {
                    if !tip_antipast.contains(&ancestor) {
                        continue;
                    }
                    visited.insert(ancestor);
                    result.remove(&ancestor);
                    ancestors.extend(self.inner.parents(ancestor).cloned().unwrap_or_default());
                }
            } else {
                queue.extend(self.inner.children(gid).cloned().unwrap_or_default());
            }
        }

        result
    }

    fn flush_malicious_blocks_to_honest_dag(&mut self) {
        while let Some(id) = self.malicious_blocks_to_add_to_honest_dag.pop_front() {
            if let Some(block) = self.inner.get(id).cloned() {
                let _ = self.honest_dag.add(block);
            }
        }
    }

    fn stop_attack(&mut self) {
        warn!(
            competing_tip = self.competing_chain_tip.map(|t| t.0),
            "competing-chain attack abandoned"
        );
        self.flush_malicious_blocks_to_honest_dag();
        self.competing_chain_tip = None;
        self.first_parallel_block = None;
    }

    fn restart_attack(&mut self) {
        self.stop_attack();
        self.competing_chain_tip_antipast = self.honest_dag.antipast_set();
        self.currently_attacked_block = self.honest_dag.coloring_tip();
        match self.currently_attacked_block {
            Some(tip) => {
                let parents = self.inner.get(tip).map(|b| b.parents().clone()).unwrap_or_default();
                let antipast = self.competing_chain_tip_antipast.clone();
                self.virtual_competing_chain_block_parents = self.competing_chain_tip_parents(tip, &antipast, &parents);
                info!(attacked_block = tip.0, "competing-chain attack (re)started");
            }
            None => self.virtual_competing_chain_block_parents.clear(),
        }
    }

    fn is_attack_viable(&self) -> bool {
        if self.did_attack_fail_impl() {
            return true;
        }
        let combined_tip = match self.inner.coloring_tip() {
            Some(tip) => tip,
            None => return true,
        };
        let competing_tip = self.competing_chain_tip.expect("an ongoing attack has a competing tip");
        let combined_bn = self.inner.blue_number(combined_tip);
        let competing_bn = self.inner.blue_number(competing_tip);
        combined_bn.saturating_sub(competing_bn) <= self.maximal_depth_difference
    }

    fn did_attack_fail_impl(&self) -> bool {
        self.first_parallel_block.is_none() || self.currently_attacked_block.is_none()
    }

    fn did_attack_succeed_impl(&mut self) -> bool {
        if self.did_attack_fail_impl() {
            return false;
        }
        let first_parallel = self.first_parallel_block.unwrap();
        let attacked = self.currently_attacked_block.unwrap();

        let combined_depth = self.inner.get_depth(first_parallel);
        let honest_depth = self.honest_dag.get_depth(attacked);
        let succeeded = combined_depth >= self.confirmation_depth
            && honest_depth >= self.confirmation_depth
            && self.inner.is_a_before_b(first_parallel, attacked) == Some(true);

        if succeeded {
            info!(first_parallel = first_parallel.0, attacked = attacked.0, "competing-chain attack succeeded");
        }
        succeeded
    }

    fn add_with_flag(&mut self, block: Block, is_malicious: bool) -> DagResult<()> {
        self.insertion_log.push(block.clone());
        let id = block.id();
        self.inner.add(block.clone())?;

        if is_malicious {
            self.malicious_blocks_to_add_to_honest_dag.push_back(id);
            if self.did_attack_fail_impl() {
                self.first_parallel_block = Some(id);
            }
            self.competing_chain_tip = Some(id);

            let (blue_keys, red_keys) = self.inner.diff_past_keys(id);
            for key in blue_keys {
                self.competing_chain_tip_antipast.remove(&key);
            }
            for key in red_keys {
                self.competing_chain_tip_antipast.remove(&key);
            }

            let antipast = self.competing_chain_tip_antipast.clone();
            self.virtual_competing_chain_block_parents =
                self.competing_chain_tip_parents(id, &antipast, block.parents());
        } else {
            if self.did_attack_fail_impl() {
                self.flush_malicious_blocks_to_honest_dag();
            }
            self.honest_dag.add(block.clone())?;
        }

        if self.did_attack_succeed_impl() {
            self.flush_malicious_blocks_to_honest_dag();
        }

        if !self.did_attack_fail_impl() {
            self.competing_chain_tip_antipast.insert(id);
            let tip = self.competing_chain_tip.expect("an ongoing attack has a competing tip");
            if id == tip || self.inner.is_a_bluer_than_b(tip, id) {
                for parent in block.parents() {
                    self.virtual_competing_chain_block_parents.remove(parent);
                }
                self.virtual_competing_chain_block_parents.insert(id);
            } else if !self.is_attack_viable() {
                self.stop_attack();
            }
        }

        Ok(())
    }
}

impl Dag for CompetingChainGreedyPhantom {
    fn add(&mut self, block: Block) -> DagResult<()> {
        self.add_with_flag(block, false)
    }

    fn contains(&self, id: BlockId) -> bool {
        self.inner.contains(id)
    }

    fn get(&self, id: BlockId) -> Option<&Block> {
        self.inner.get(id)
    }

    fn iter_ids(&self) -> Box<dyn Iterator<Item = BlockId> + '_> {
        self.inner.iter_ids()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn virtual_block_parents(&self) -> Vec<BlockId> {
        self.inner.virtual_block_parents()
    }

    fn is_a_before_b(&mut self, a: BlockId, b: BlockId) -> Option<bool> {
        self.inner.is_a_before_b(a, b)
    }

    fn get_depth(&mut self, id: BlockId) -> i64 {
        self.inner.get_depth(id)
    }

    // Rebuilding discards which blocks were originally malicious: every
    // replayed block goes through the honest path, same as re-adding each
    // block to a fresh instance one at a time.
    fn set_k(&mut self, k: KType) {
        let log = self.insertion_log.clone();
        let mut fresh = CompetingChainGreedyPhantom::new(k, self.confirmation_depth, self.maximal_depth_difference);
        for block in log {
            fresh.add_with_flag(block, false).expect("replaying a previously accepted insertion never fails");
        }
        *self = fresh;
    }
}

impl MaliciousDag for CompetingChainGreedyPhantom {
    fn virtual_block_parents_for(&mut self, is_malicious: bool) -> Vec<BlockId> {
        if !is_malicious || self.len() <= 1 {
            return self.inner.virtual_block_parents();
        }
        if self.did_attack_fail_impl() {
            self.restart_attack();
        }
        let mut parents: Vec<BlockId> = self.virtual_competing_chain_block_parents.iter().copied().collect();
        parents.sort();
        parents
    }

    fn did_attack_succeed(&mut self) -> bool {
        self.did_attack_succeed_impl()
    }

    fn did_attack_fail(&self) -> bool {
        self.did_attack_fail_impl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blk(id: u64, parents: &[u64]) -> Block {
        Block::new(BlockId::new(id), parents.iter().map(|&p| BlockId::new(p)), 0, None)
    }

    #[test]
    fn no_attack_in_progress_initially() {
        let dag = CompetingChainGreedyPhantom::new(3, 5, 5);
        assert!(dag.did_attack_fail());
    }

    #[test]
    fn honest_only_growth_never_starts_an_attack() {
        let mut dag = CompetingChainGreedyPhantom::new(3, 3, 5);
        dag.add(blk(0, &[])).unwrap();
        dag.add(blk(1, &[0])).unwrap();
        dag.add(blk(2, &[1])).unwrap();
        assert!(dag.did_attack_fail());
        assert!(!dag.did_attack_succeed());
        assert_eq!(dag.virtual_block_parents_for(true), dag.inner.virtual_block_parents());
    }

    #[test]
    fn an_unviable_private_chain_is_abandoned() {
        let mut dag = CompetingChainGreedyPhantom::new(3, 3, 1);
        dag.add(blk(0, &[])).unwrap();
        // Kick off a private attack against genesis.
        let malicious_parents = dag.virtual_block_parents_for(true);
        assert!(!malicious_parents.is_empty());
        dag.add_malicious(blk(1, &[0])).unwrap();
        assert!(!dag.did_attack_fail());

        // The honest chain races far enough ahead that the gap exceeds
        // maximal_depth_difference, forcing the attack to be abandoned.
        dag.add(blk(2, &[0])).unwrap();
        dag.add(blk(3, &[2])).unwrap();
        dag.add(blk(4, &[3])).unwrap();
        dag.add(blk(5, &[4])).unwrap();
        dag.add(blk(6, &[5])).unwrap();

        assert!(dag.did_attack_fail());
    }

    #[test]
    fn set_k_rebuilds_with_same_history() {
        let mut dag = CompetingChainGreedyPhantom::new(3, 5, 5);
        dag.add(blk(0, &[])).unwrap();
        dag.add(blk(1, &[0])).unwrap();
        dag.add_malicious(blk(2, &[0])).unwrap();
        dag.set_k(1);
        assert_eq!(dag.len(), 3);
    }
}
