//! `GreedyPhantom` — the incremental PHANTOM coloring/ordering engine. The
//! heart of the crate: coloring-chain maintenance, k-chain computation,
//! diff-past coloring, and topological ordering, all performed
//! incrementally on each `add` rather than recomputed from scratch (cf.
//! [`crate::brute_force::BruteForcePhantom`]).

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::block::Block;
use crate::dag::Dag;
use crate::errors::DagResult;
use crate::lazy_set::LazySet;
use crate::{BlockId, BlockIdHasher, BlockIdIndexMap, BlockIdMap, BlockIdSet, HashMapCustomHasher, KType};

/// A contiguous suffix of the coloring chain, starting at some tip, within
/// which the cumulative number of blue diff-past blocks does not exceed `k`.
#[derive(Debug, Clone)]
pub struct KChain {
    pub members: BlockIdSet,
    pub minimal_height: u64,
}

#[derive(Debug, Clone)]
struct NodeData {
    height: u64,
    blue_number: u64,
    coloring_parent: Option<BlockId>,
    /// Ancestors of this block not in the past of its coloring parent,
    /// classified blue, each mapped to its eventual local topological index
    /// (`None` until step 4 of `add` assigns it). Insertion-ordered.
    blue_diff_past_order: BlockIdIndexMap<Option<u64>>,
    red_diff_past_order: BlockIdIndexMap<Option<u64>>,
    self_order_index: Option<u64>,
}

#[derive(Clone, Copy)]
struct ChainStep {
    id: BlockId,
    is_main_coloring_chain: bool,
    is_intersection: bool,
}

/// The incremental PHANTOM/GreedyPHANTOM DAG: coloring-chain maintenance,
/// k-chain computation, diff-past coloring, and topological ordering, all
/// performed incrementally as each block is added.
pub struct GreedyPhantom {
    k: KType,

    blocks: BlockIdMap<Block>,
    parents_of: BlockIdMap<BlockIdSet>,
    children_of: BlockIdMap<BlockIdSet>,
    nodes: BlockIdMap<NodeData>,
    leaves: BlockIdSet,
    insertion_order: Vec<BlockId>,
    genesis: Option<BlockId>,

    coloring_tip: Option<BlockId>,
    coloring_chain: BlockIdSet,
    k_chain: KChain,

    /// The DAG's globally-accumulated past, split blue/red, as maintained
    /// by the blocks currently on the coloring chain.
    blue_past_order: BlockIdMap<u64>,
    red_past_order: BlockIdMap<u64>,

    /// The tip's antipast, colored lazily: `blue_antipast_order` and
    /// `red_antipast_order` hold ids whose color has been resolved (index
    /// `None` until ordered on demand); `uncolored_unordered_antipast` holds
    /// ids not yet even colored.
    blue_antipast_order: BlockIdIndexMap<Option<u64>>,
    red_antipast_order: BlockIdIndexMap<Option<u64>>,
    uncolored_unordered_antipast: LazySet<BlockId, BlockIdHasher>,
}

impl GreedyPhantom {
    pub fn new(k: KType) -> Self {
        Self {
            k,
            blocks: BlockIdMap::new(),
            parents_of: BlockIdMap::new(),
            children_of: BlockIdMap::new(),
            nodes: BlockIdMap::new(),
            leaves: BlockIdSet::new(),
            insertion_order: Vec::new(),
            genesis: None,
            coloring_tip: None,
            coloring_chain: BlockIdSet::new(),
            k_chain: KChain { members: BlockIdSet::new(), minimal_height: 0 },
            blue_past_order: BlockIdMap::new(),
            red_past_order: BlockIdMap::new(),
            blue_antipast_order: BlockIdIndexMap::new(),
            red_antipast_order: BlockIdIndexMap::new(),
            uncolored_unordered_antipast: LazySet::new(),
        }
    }

    pub fn k(&self) -> KType {
        self.k
    }

    pub fn coloring_tip(&self) -> Option<BlockId> {
        self.coloring_tip
    }

    pub fn genesis(&self) -> Option<BlockId> {
        self.genesis
    }

    pub fn leaves(&self) -> &BlockIdSet {
        &self.leaves
    }

    pub fn blue_number(&self, id: BlockId) -> u64 {
        self.nodes.get(&id).map(|n| n.blue_number).unwrap_or(0)
    }

    pub fn height(&self, id: BlockId) -> u64 {
        self.nodes.get(&id).map(|n| n.height).unwrap_or(0)
    }

    pub fn coloring_parent(&self, id: BlockId) -> Option<BlockId> {
        self.nodes.get(&id).and_then(|n| n.coloring_parent)
    }

    /// The declared parents of `id` as inserted (unfiltered).
    pub fn parents(&self, id: BlockId) -> Option<&BlockIdSet> {
        self.parents_of.get(&id)
    }

    /// The ids that declared `id` as a parent.
    pub fn children(&self, id: BlockId) -> Option<&BlockIdSet> {
        self.children_of.get(&id)
    }

    /// True iff `a` is "bluer" than `b`: greater blue_number, ties broken
    /// toward the smaller id.
    pub fn is_a_bluer_than_b(&self, a: BlockId, b: BlockId) -> bool {
        let ba = self.blue_number(a);
        let bb = self.blue_number(b);
        ba > bb || (ba == bb && a < b)
    }

    fn is_max_coloring_tip(&self, id: BlockId) -> bool {
        match self.coloring_tip {
            None => true,
            Some(tip) => self.is_a_bluer_than_b(id, tip),
        }
    }

    /// The "extreme" (bluest or palest) block among `ids`, ties toward the
    /// smaller id. `None` if `ids` is empty.
    fn extreme_blue(&self, ids: &BlockIdSet, bluest: bool) -> Option<BlockId> {
        let mut sorted: Vec<BlockId> = ids.iter().copied().collect();
        sorted.sort();
        let mut best: Option<BlockId> = None;
        for id in sorted {
            let take = match best {
                None => true,
                Some(b) => {
                    let (bn_id, bn_best) = (self.blue_number(id), self.blue_number(b));
                    if bluest { bn_id > bn_best } else { bn_id < bn_best }
                }
            };
            if take {
                best = Some(id);
            }
        }
        best
    }

    fn coloring_chain_from(&self, tip: Option<BlockId>) -> ColoringChainIter<'_> {
        ColoringChainIter { phantom: self, current: tip }
    }

    /// Walks `local_tip`'s own coloring chain until it meets the global
    /// coloring chain, then walks the global tip's chain back to that same
    /// intersection point. Used to express a block's past/antipast as a
    /// small number of diffs against the global accumulated state.
    fn local_tip_to_global_tip(&self, local_tip: BlockId) -> Vec<ChainStep> {
        let mut steps = Vec::new();
        let mut intersection = None;
        for cur in self.coloring_chain_from(Some(local_tip)) {
            if self.coloring_chain.contains(&cur) {
                intersection = Some(cur);
                steps.push(ChainStep { id: cur, is_main_coloring_chain: true, is_intersection: true });
                break;
            }
            steps.push(ChainStep { id: cur, is_main_coloring_chain: false, is_intersection: false });
        }
        for cur in self.coloring_chain_from(self.coloring_tip) {
            if Some(cur) == intersection {
                break;
            }
            steps.push(ChainStep { id: cur, is_main_coloring_chain: true, is_intersection: false });
        }
        steps
    }

    fn get_k_chain(&self, id: BlockId) -> KChain {
        let mut members = BlockIdSet::new();
        let mut minimal_height = 0u64;
        let mut blue_count = 0u64;
        for cur in self.coloring_chain_from(Some(id)) {
            if blue_count > self.k {
                break;
            }
            members.insert(cur);
            minimal_height = self.height(cur);
            blue_count += self.nodes[&cur].blue_diff_past_order.len() as u64;
        }
        KChain { members, minimal_height }
    }

    /// The height-only coloring rule (the live path): `a` is blue relative
    /// to `k_chain` iff walking `a`'s coloring chain reaches a member of
    /// `k_chain` before dropping below its minimal height.
    fn coloring_rule_2(&self, k_chain: &KChain, id: BlockId) -> bool {
        for cur in self.coloring_chain_from(Some(id)) {
            if self.height(cur) < k_chain.minimal_height {
                return false;
            }
            if k_chain.members.contains(&cur) {
                return true;
            }
        }
        false
    }

    /// The depth-bounded "rule 3" variant: identical to rule 2 but also
    /// stops once the accumulated blue diff-past depth exceeds `k`. Kept for
    /// fidelity with the original reference coloring but not wired into the
    /// live path, which prefers the height-only rule.
    #[allow(dead_code)]
    fn coloring_rule_3(&self, k_chain: &KChain, id: BlockId) -> bool {
        let mut depth = 0u64;
        for cur in self.coloring_chain_from(Some(id)) {
            if self.height(cur) < k_chain.minimal_height || depth > self.k {
                return false;
            }
            if k_chain.members.contains(&cur) {
                return true;
            }
            depth += self.nodes[&cur].blue_diff_past_order.len() as u64;
        }
        false
    }

    fn color_block(&self, k_chain: &KChain, id: BlockId) -> bool {
        self.coloring_rule_2(k_chain, id)
    }

    /// The antipast of `g`, as a [`LazySet`] composed from the current
    /// global antipast plus/minus the diff-pasts on the path between `g`
    /// and the global coloring tip — never materializing the full antipast.
    pub fn antipast(&self, g: Option<BlockId>) -> LazySet<BlockId, BlockIdHasher> {
        let Some(g) = g else {
            let mut ls = LazySet::new();
            let mut all = self.global_past_set();
            all.extend(self.global_antipast_set());
            ls.lazy_update(all);
            return ls;
        };
        if Some(g) == self.coloring_tip {
            let mut ls = LazySet::new();
            ls.lazy_update(self.global_antipast_set());
            return ls;
        }

        let mut positive_sets: Vec<BlockIdSet> = Vec::new();
        let mut negative_sets: Vec<BlockIdSet> = Vec::new();
        for step in self.local_tip_to_global_tip(g) {
            let node = &self.nodes[&step.id];
            let blue_keys: BlockIdSet = node.blue_diff_past_order.keys().copied().collect();
            let red_keys: BlockIdSet = node.red_diff_past_order.keys().copied().collect();
            if !step.is_main_coloring_chain || step.is_intersection {
                negative_sets.push(blue_keys);
                negative_sets.push(red_keys);
            } else {
                positive_sets.push(blue_keys);
                positive_sets.push(red_keys);
            }
        }

        let mut antipast = LazySet::new();
        antipast.lazy_update(self.global_antipast_set());
        for set in positive_sets {
            antipast.lazy_update(set);
        }
        for set in negative_sets {
            antipast.lazy_difference_update(set);
        }
        antipast
    }

    /// The past of `g`, as a [`LazySet`]. `None` (no coloring parent,
    /// i.e. `g` is the very first block ever inserted) yields the empty set.
    pub fn past(&self, g: Option<BlockId>) -> LazySet<BlockId, BlockIdHasher> {
        let Some(g) = g else {
            return LazySet::new();
        };
        let mut positive_merged = BlockIdSet::new();
        let mut negative_merged = BlockIdSet::new();
        for step in self.local_tip_to_global_tip(g) {
            if step.is_intersection {
                continue;
            }
            let node = &self.nodes[&step.id];
            let target = if !step.is_main_coloring_chain { &mut positive_merged } else { &mut negative_merged };
            target.extend(node.blue_diff_past_order.keys().copied());
            target.extend(node.red_diff_past_order.keys().copied());
        }
        LazySet::with_layers(self.global_past_set(), [negative_merged], [positive_merged])
    }

    fn global_past_set(&self) -> BlockIdSet {
        self.blue_past_order.keys().chain(self.red_past_order.keys()).copied().collect()
    }

    fn global_antipast_set(&self) -> BlockIdSet {
        let mut set: BlockIdSet =
            self.blue_antipast_order.keys().chain(self.red_antipast_order.keys()).copied().collect();
        set.extend(self.uncolored_unordered_antipast.iter());
        set
    }

    fn is_in_antipast(&self, id: BlockId) -> bool {
        self.blue_antipast_order.contains_key(&id)
            || self.red_antipast_order.contains_key(&id)
            || self.uncolored_unordered_antipast.contains(&id)
    }

    /// Colors (but does not order) every id still sitting in the uncolored
    /// antipast bucket, per the current k-chain.
    fn update_antipast_coloring(&mut self) {
        if self.uncolored_unordered_antipast.is_empty() {
            return;
        }
        let k_chain = self.k_chain.clone();
        let pending: Vec<BlockId> = self.uncolored_unordered_antipast.iter().collect();
        for id in pending {
            if self.color_block(&k_chain, id) {
                self.blue_antipast_order.insert(id, None);
            } else {
                self.red_antipast_order.insert(id, None);
            }
        }
        self.uncolored_unordered_antipast.clear();
    }

    fn sort_blocks(
        &self,
        last_block: Option<BlockId>,
        later_blocks: &BlockIdSet,
        to_sort: &BlockIdSet,
        unsorted: &BlockIdSet,
    ) -> Vec<BlockId> {
        let remaining: BlockIdSet =
            to_sort.iter().copied().filter(|id| Some(*id) != last_block && unsorted.contains(id)).collect();
        let mut blue: Vec<BlockId> = remaining.iter().copied().filter(|id| later_blocks.contains(id)).collect();
        blue.sort_by(|a, b| b.cmp(a));
        let mut red: Vec<BlockId> = remaining.iter().copied().filter(|id| !later_blocks.contains(id)).collect();
        red.sort_by(|a, b| b.cmp(a));
        if let Some(last) = last_block {
            blue.push(last);
        }
        let mut result = red;
        result.extend(blue);
        result
    }

    /// Reverse-post-order over `leaves` and their ancestors restricted to
    /// `unordered`, visiting the coloring parent first among siblings, then
    /// blue siblings (descending id), then red siblings (descending id) —
    /// read off the explicit stack in reverse, this yields coloring parent
    /// first, then blues ascending, then reds ascending.
    fn calculate_topological_order(
        &self,
        coloring_parent: Option<BlockId>,
        leaves: &BlockIdSet,
        coloring: &BlockIdSet,
        unordered: &BlockIdSet,
    ) -> Vec<BlockId> {
        let mut to_order = self.sort_blocks(coloring_parent, coloring, leaves, unordered);
        let mut ordered_set = BlockIdSet::new();
        let mut ordered = Vec::new();

        while let Some(cur) = to_order.pop() {
            if ordered_set.contains(&cur) {
                continue;
            }
            let cur_parents: BlockIdSet = self
                .parents_of
                .get(&cur)
                .cloned()
                .unwrap_or_default()
                .intersection(unordered)
                .copied()
                .collect();
            if cur_parents.is_subset(&ordered_set) {
                ordered_set.insert(cur);
                ordered.push(cur);
            } else {
                to_order.push(cur);
                let cur_coloring_parent = self.nodes.get(&cur).and_then(|n| n.coloring_parent);
                to_order.extend(self.sort_blocks(cur_coloring_parent, coloring, &cur_parents, unordered));
            }
        }
        ordered
    }

    fn update_topological_order_in_maps(
        &self,
        blue: &mut BlockIdIndexMap<Option<u64>>,
        red: &mut BlockIdIndexMap<Option<u64>>,
        leaves: &BlockIdSet,
        coloring_parent: Option<BlockId>,
    ) {
        let starting_index =
            coloring_parent.and_then(|cp| self.nodes.get(&cp)).and_then(|n| n.self_order_index).unwrap_or(0);

        let coloring: BlockIdSet = blue.keys().copied().collect();
        let unordered: BlockIdSet = blue.keys().chain(red.keys()).copied().collect();

        let order = self.calculate_topological_order(coloring_parent, leaves, &coloring, &unordered);
        for (offset, id) in order.into_iter().enumerate() {
            let lid = starting_index + offset as u64;
            if blue.contains_key(&id) {
                blue.insert(id, Some(lid));
            } else {
                red.insert(id, Some(lid));
            }
        }
    }

    /// Resolves the local id of every block still sitting in the tip's
    /// antipast. Triggered lazily by queries that need a verdict for an
    /// antipast member.
    fn order_antipast(&mut self) {
        let coloring_parent = self.coloring_tip;
        let leaves = self.leaves.clone();
        let mut blue = std::mem::take(&mut self.blue_antipast_order);
        let mut red = std::mem::take(&mut self.red_antipast_order);
        self.update_topological_order_in_maps(&mut blue, &mut red, &leaves, coloring_parent);
        self.blue_antipast_order = blue;
        self.red_antipast_order = red;
    }

    fn local_id(&mut self, id: BlockId) -> Option<u64> {
        let known = self.blue_past_order.contains_key(&id)
            || self.red_past_order.contains_key(&id)
            || self.blue_antipast_order.contains_key(&id)
            || self.red_antipast_order.contains_key(&id);
        if !known || !self.uncolored_unordered_antipast.is_empty() {
            self.update_antipast_coloring();
            self.order_antipast();
        }
        self.blue_past_order
            .get(&id)
            .copied()
            .or_else(|| self.red_past_order.get(&id).copied())
            .or_else(|| self.blue_antipast_order.get(&id).copied().flatten())
            .or_else(|| self.red_antipast_order.get(&id).copied().flatten())
    }

    /// True iff `id` is in the current coloring (blue). Resolves any
    /// pending antipast coloring first.
    pub fn is_blue(&mut self, id: BlockId) -> bool {
        self.update_antipast_coloring();
        self.blue_past_order.contains_key(&id) || self.blue_antipast_order.contains_key(&id)
    }

    /// The full blue coloring of the DAG. Resolves any pending antipast
    /// coloring first.
    pub fn coloring(&mut self) -> BlockIdSet {
        self.update_antipast_coloring();
        self.blue_past_order.keys().chain(self.blue_antipast_order.keys()).copied().collect()
    }

    /// The full current antipast, as a plain set (blue, red, and still
    /// uncolored members alike). Exposed for callers such as the
    /// competing-chain harness that seed their own antipast tracking from
    /// this DAG's live state.
    pub fn antipast_set(&self) -> BlockIdSet {
        self.global_antipast_set()
    }

    /// The blue/red diff-past key sets recorded for `id`, if known.
    pub fn diff_past_keys(&self, id: BlockId) -> (BlockIdSet, BlockIdSet) {
        match self.nodes.get(&id) {
            Some(node) => (
                node.blue_diff_past_order.keys().copied().collect(),
                node.red_diff_past_order.keys().copied().collect(),
            ),
            None => (BlockIdSet::new(), BlockIdSet::new()),
        }
    }

    fn update_diff_coloring_of_block(&mut self, id: BlockId) {
        let k_chain = self.get_k_chain(id);
        let coloring_parent = self.nodes[&id].coloring_parent;
        let parent_antipast = self.antipast(coloring_parent);

        let mut blue_diff_past_order: BlockIdIndexMap<Option<u64>> = BlockIdIndexMap::new();
        let mut red_diff_past_order: BlockIdIndexMap<Option<u64>> = BlockIdIndexMap::new();

        let mut queue: VecDeque<BlockId> = VecDeque::new();
        if let Some(parents) = self.parents_of.get(&id) {
            queue.extend(parents.iter().copied().filter(|p| self.nodes.contains_key(p)));
        }

        while let Some(cur) = queue.pop_front() {
            if blue_diff_past_order.contains_key(&cur) || red_diff_past_order.contains_key(&cur) {
                continue;
            }
            if !parent_antipast.contains(&cur) {
                continue;
            }
            if let Some(parents) = self.parents_of.get(&cur) {
                queue.extend(parents.iter().copied().filter(|p| self.nodes.contains_key(p)));
            }
            if self.color_block(&k_chain, cur) {
                blue_diff_past_order.insert(cur, None);
            } else {
                red_diff_past_order.insert(cur, None);
            }
        }

        let blue_len = blue_diff_past_order.len() as u64;
        let node = self.nodes.get_mut(&id).expect("node was inserted before diff coloring");
        node.blue_diff_past_order = blue_diff_past_order;
        node.red_diff_past_order = red_diff_past_order;
        node.blue_number += blue_len;
    }

    /// Re-points the global coloring chain/past to end at `new_tip`. Blocks
    /// stepped off the chain have their diff-pasts returned
    /// to the (uncolored) antipast; blocks stepped onto the chain have
    /// their diff-pasts folded into the global past order.
    fn update_past_coloring_according_to(&mut self, new_tip: BlockId) {
        let stale: BlockIdSet =
            self.blue_antipast_order.keys().chain(self.red_antipast_order.keys()).copied().collect();
        self.uncolored_unordered_antipast.lazy_update(stale);
        self.blue_antipast_order.clear();
        self.red_antipast_order.clear();

        self.uncolored_unordered_antipast.add(new_tip);
        if let Some(old_tip) = self.coloring_tip {
            if old_tip != new_tip {
                // The dethroned tip itself (not just its diff-past) now
                // belongs to the antipast and must be (re)classified.
                self.uncolored_unordered_antipast.add(old_tip);
            }
        }

        let steps = self.local_tip_to_global_tip(new_tip);
        for step in steps {
            if step.is_intersection {
                continue;
            }
            let (blue_entries, red_entries): (Vec<(BlockId, Option<u64>)>, Vec<(BlockId, Option<u64>)>) = {
                let node = &self.nodes[&step.id];
                (
                    node.blue_diff_past_order.iter().map(|(&k, &v)| (k, v)).collect(),
                    node.red_diff_past_order.iter().map(|(&k, &v)| (k, v)).collect(),
                )
            };

            if step.is_main_coloring_chain {
                self.coloring_chain.remove(&step.id);
                let mut uncolored: BlockIdSet = BlockIdSet::new();
                for (k, _) in &blue_entries {
                    self.blue_past_order.remove(k);
                    uncolored.insert(*k);
                }
                for (k, _) in &red_entries {
                    self.red_past_order.remove(k);
                    uncolored.insert(*k);
                }
                self.uncolored_unordered_antipast.lazy_update(uncolored);
            } else {
                self.coloring_chain.insert(step.id);
                let mut settled: BlockIdSet = BlockIdSet::new();
                for (k, v) in &blue_entries {
                    self.blue_past_order.insert(*k, v.unwrap_or(0));
                    settled.insert(*k);
                }
                for (k, v) in &red_entries {
                    self.red_past_order.insert(*k, v.unwrap_or(0));
                    settled.insert(*k);
                }
                for id in settled {
                    self.uncolored_unordered_antipast.discard(id);
                }
            }
        }

        self.coloring_tip = Some(new_tip);
        self.uncolored_unordered_antipast.flatten(true);
    }

    fn update_max_coloring(&mut self, id: BlockId) {
        if !self.is_max_coloring_tip(id) {
            return;
        }
        let previous_tip = self.coloring_tip;
        self.update_past_coloring_according_to(id);
        self.k_chain = self.get_k_chain(id);
        if self.genesis.map_or(true, |g| !self.coloring_chain.contains(&g)) {
            self.genesis = self.extreme_blue(&self.coloring_chain, false);
        }
        debug!(
            new_tip = id.0,
            previous_tip = previous_tip.map(|t| t.0),
            blue_number = self.blue_number(id),
            "coloring tip advanced"
        );
    }

    /// The node's own diff-past entries, once step 4 has filled in their
    /// indices, are copied into the global past order (see the doc comment
    /// on [`Self::add`] for why this can't happen inside step 3 itself).
    fn sync_past_order_for_self(&mut self, id: BlockId) {
        if !self.coloring_chain.contains(&id) {
            return;
        }
        let (blue_entries, red_entries): (Vec<(BlockId, u64)>, Vec<(BlockId, u64)>) = {
            let node = &self.nodes[&id];
            (
                node.blue_diff_past_order
                    .iter()
                    .map(|(&k, &v)| (k, v.expect("step 4 assigns every diff-past index")))
                    .collect(),
                node.red_diff_past_order
                    .iter()
                    .map(|(&k, &v)| (k, v.expect("step 4 assigns every diff-past index")))
                    .collect(),
            )
        };
        for (k, v) in blue_entries {
            self.blue_past_order.insert(k, v);
        }
        for (k, v) in red_entries {
            self.red_past_order.insert(k, v);
        }
    }

    fn update_self_order_index(&mut self, id: BlockId) {
        let (blue_len, red_len, coloring_parent) = {
            let node = &self.nodes[&id];
            (node.blue_diff_past_order.len() as u64, node.red_diff_past_order.len() as u64, node.coloring_parent)
        };
        let mut index = blue_len + red_len;
        if let Some(cp) = coloring_parent {
            if let Some(cp_index) = self.nodes[&cp].self_order_index {
                index += cp_index;
            }
        }
        self.nodes.get_mut(&id).unwrap().self_order_index = Some(index);
    }

    fn update_topological_order_incrementally(&mut self, id: BlockId) {
        let coloring_parent = self.nodes[&id].coloring_parent;
        let parents = self.parents_of.get(&id).cloned().unwrap_or_default();

        let mut blue = std::mem::take(&mut self.nodes.get_mut(&id).unwrap().blue_diff_past_order);
        let mut red = std::mem::take(&mut self.nodes.get_mut(&id).unwrap().red_diff_past_order);
        self.update_topological_order_in_maps(&mut blue, &mut red, &parents, coloring_parent);
        let node = self.nodes.get_mut(&id).unwrap();
        node.blue_diff_past_order = blue;
        node.red_diff_past_order = red;

        self.update_self_order_index(id);
    }

    fn update_coloring_incrementally(&mut self, id: BlockId) {
        let declared_parents = self.parents_of.get(&id).cloned().unwrap_or_default();
        let known_parents: BlockIdSet =
            declared_parents.iter().copied().filter(|p| self.nodes.contains_key(p)).collect();

        let coloring_parent = self.extreme_blue(&known_parents, true);
        let height =
            known_parents.iter().map(|&p| self.height(p)).max().map(|h| h + 1).unwrap_or(0);
        let blue_number = coloring_parent.map(|cp| self.blue_number(cp)).unwrap_or(0);

        self.nodes.insert(
            id,
            NodeData {
                height,
                blue_number,
                coloring_parent,
                blue_diff_past_order: BlockIdIndexMap::new(),
                red_diff_past_order: BlockIdIndexMap::new(),
                self_order_index: None,
            },
        );

        self.uncolored_unordered_antipast.add(id);

        self.update_diff_coloring_of_block(id);
        self.update_max_coloring(id);
    }

    fn add_internal(&mut self, block: Block) {
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

        // Step 1+2+3: derive metadata, color the diff-past, maybe re-point
        // the coloring tip.
        self.update_coloring_incrementally(id);
        // Step 4: topologically order the diff-past and assign self_order_index.
        self.update_topological_order_incrementally(id);
        // If `id` itself ended up on the coloring chain, its own diff-past
        // entries (inserted with placeholder indices during step 3) now
        // have real indices — fold them into the global past order.
        self.sync_past_order_for_self(id);

        trace!(block = id.0, height = self.height(id), blue_number = self.blue_number(id), "block added");
    }
}

impl Dag for GreedyPhantom {
    fn add(&mut self, block: Block) -> DagResult<()> {
        self.add_internal(block);
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
        match (self.contains(a), self.contains(b)) {
            (false, false) => None,
            (true, false) => Some(true),
            (false, true) => Some(false),
            (true, true) => {
                let la = self.local_id(a).unwrap_or(u64::MAX);
                let lb = self.local_id(b).unwrap_or(u64::MAX);
                Some(la <= lb)
            }
        }
    }

    fn get_depth(&mut self, id: BlockId) -> i64 {
        if !self.contains(id) {
            return crate::errors::DEPTH_ABSENT;
        }
        if self.is_in_antipast(id) {
            return 0;
        }
        let mut depth: u64 = 1;
        for cur in self.coloring_chain_from(self.coloring_tip) {
            let node = &self.nodes[&cur];
            if node.red_diff_past_order.contains_key(&id) {
                return 0;
            }
            if node.blue_diff_past_order.contains_key(&id) {
                return depth as i64;
            }
            depth += node.blue_diff_past_order.len() as u64;
        }
        0
    }

    fn set_k(&mut self, k: KType) {
        let order = self.insertion_order.clone();
        let mut fresh = GreedyPhantom::new(k);
        for id in order {
            let block = self.blocks[&id].clone();
            fresh.add_internal(block);
        }
        *self = fresh;
    }
}

struct ColoringChainIter<'a> {
    phantom: &'a GreedyPhantom,
    current: Option<BlockId>,
}

impl<'a> Iterator for ColoringChainIter<'a> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        let cur = self.current.take()?;
        self.current = self.phantom.nodes.get(&cur).and_then(|n| n.coloring_parent);
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force::BruteForcePhantom;

    fn blk(id: u64, parents: &[u64]) -> Block {
        Block::new(BlockId::new(id), parents.iter().map(|&p| BlockId::new(p)), 0, None)
    }

    #[test]
    fn genesis_alone_is_its_own_tip() {
        let mut dag = GreedyPhantom::new(3);
        dag.add(blk(0, &[])).unwrap();
        assert_eq!(dag.len(), 1);
        assert_eq!(dag.virtual_block_parents(), vec![BlockId::new(0)]);
        assert_eq!(dag.is_a_before_b(BlockId::new(0), BlockId::new(0)), Some(true));
        assert_eq!(dag.get_depth(BlockId::new(0)), 0);
    }

    #[test]
    fn chain_with_fork_colors_all_blue() {
        let mut dag = GreedyPhantom::new(3);
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

        for k in [0u64, 1, 3] {
            let mut dag = GreedyPhantom::new(k);
            for (id, parents) in &blocks {
                dag.add(blk(*id, parents)).unwrap();
            }
            let expected = match k {
                1 => 4,
                0 => 4,
                3 => 7,
                _ => unreachable!(),
            };
            assert_eq!(dag.coloring().len(), expected, "k={k}");
        }
    }

    #[test]
    fn greedy_agrees_with_brute_force_on_small_dags() {
        let blocks = [
            (0u64, vec![]),
            (1, vec![0]),
            (2, vec![0]),
            (3, vec![1, 2]),
            (4, vec![0]),
            (5, vec![4]),
            (6, vec![5]),
            (7, vec![3]),
            (8, vec![7]),
            (9, vec![8]),
            (10, vec![6, 7]),
        ];

        for k in [0u64, 1, 2, 4] {
            let mut greedy = GreedyPhantom::new(k);
            let mut brute = BruteForcePhantom::new(k);
            for (id, parents) in &blocks {
                greedy.add(blk(*id, parents)).unwrap();
                brute.add(blk(*id, parents)).unwrap();
            }
            assert_eq!(greedy.coloring(), brute.coloring().clone(), "k={k}");
        }
    }

    #[test]
    fn k_chain_tracks_coloring_tip() {
        let blocks = [
            (0u64, vec![]),
            (1, vec![0]),
            (2, vec![0]),
            (3, vec![1, 2]),
            (4, vec![0]),
            (5, vec![4]),
            (6, vec![5]),
            (7, vec![3]),
            (8, vec![7]),
            (9, vec![8]),
            (10, vec![6, 7]),
        ];
        let mut dag = GreedyPhantom::new(4);
        for (id, parents) in &blocks {
            dag.add(blk(*id, parents)).unwrap();
        }
        assert_eq!(dag.coloring_tip(), Some(BlockId::new(10)));
        assert_eq!(dag.coloring().len(), 11);
    }

    #[test]
    fn coloring_parent_is_bluest_parent() {
        let mut dag = GreedyPhantom::new(3);
        dag.add(blk(0, &[])).unwrap();
        dag.add(blk(1, &[0])).unwrap();
        dag.add(blk(2, &[0])).unwrap();
        dag.add(blk(3, &[1, 2])).unwrap();

        let cp = dag.coloring_parent(BlockId::new(3));
        assert!(cp == Some(BlockId::new(1)) || cp == Some(BlockId::new(2)));
    }

    #[test]
    fn absent_id_queries_return_sentinels() {
        let mut dag = GreedyPhantom::new(3);
        dag.add(blk(0, &[])).unwrap();
        assert_eq!(dag.is_a_before_b(BlockId::new(99), BlockId::new(98)), None);
        assert_eq!(dag.get_depth(BlockId::new(99)), crate::errors::DEPTH_ABSENT);
    }

    #[test]
    fn set_k_zero_leaves_only_coloring_chain() {
        let mut dag = GreedyPhantom::new(3);
        dag.add(blk(0, &[])).unwrap();
        dag.add(blk(1, &[0])).unwrap();
        dag.add(blk(2, &[0])).unwrap();
        dag.set_k(0);
        assert_eq!(dag.k(), 0);
        assert!(dag.len() == 3);
    }
}
