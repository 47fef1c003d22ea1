//! The `Dag` capability set shared by every coloring engine.

use crate::{Block, BlockId, DagResult, KType};

/// The set of blocks added to, and removed from, the coloring chain by a
/// single re-pointing of the global coloring tip (see
/// [`crate::greedy::GreedyPhantom`]).
#[derive(Debug, Default, Clone)]
pub struct ChainPath {
    pub added: Vec<BlockId>,
    pub removed: Vec<BlockId>,
}

/// The contract every DAG coloring/ordering engine satisfies: insertion,
/// lookup, iteration, and the read-only queries a miner or simulation
/// harness needs.
///
/// Local id comparisons are total orders normalized by the engine:
/// "topological order of the DAG" and "local id" mean the same thing
/// throughout.
pub trait Dag {
    /// Inserts `block`. Preconditions: the graph stays a DAG; parents should
    /// already be present — PHANTOM-family engines silently skip unknown
    /// parent ids while traversing.
    fn add(&mut self, block: Block) -> DagResult<()>;

    /// True iff a block with this id has been added.
    fn contains(&self, id: BlockId) -> bool;

    /// The inserted block with this id, if any.
    fn get(&self, id: BlockId) -> Option<&Block>;

    /// An iterator over all block ids currently in the DAG. Order is
    /// unspecified; iterators are invalidated by a subsequent `add`.
    fn iter_ids(&self) -> Box<dyn Iterator<Item = BlockId> + '_>;

    /// The number of blocks in the DAG.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ids a newly-mined honest block should point to: the current
    /// leaves of the DAG (or of the "honest" view, for variants that track one).
    fn virtual_block_parents(&self) -> Vec<BlockId>;

    /// `None` if neither id is present; otherwise whether `a` precedes `b`
    /// in the DAG's total order (ties broken so that `a == b` compares equal).
    fn is_a_before_b(&mut self, a: BlockId, b: BlockId) -> Option<bool>;

    /// The block's depth (confirmation count) in the main sub-DAG.
    /// Returns [`crate::errors::DEPTH_ABSENT`] if `id` is not in the DAG.
    fn get_depth(&mut self, id: BlockId) -> i64;

    /// Sets the coloring parameter `k`. `k = 0` is a legal value: the
    /// resulting coloring contains only the coloring chain.
    fn set_k(&mut self, k: KType);
}
