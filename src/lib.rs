//!
//! # phantom-dag
//!
//! A block-DAG consensus core implementing the PHANTOM protocol and its
//! incremental variant, GreedyPHANTOM, together with a brute-force reference
//! coloring, a longest-chain baseline, and a competing-chain attack harness
//! used to evaluate security.
//!
//! Identifiers are opaque 64-bit integers (the "global id" of a block, in
//! the terminology of the protocol); the engine never hashes or validates
//! block contents itself.
//!

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hasher};

pub mod block;
pub mod blockchain;
pub mod brute_force;
pub mod competing_chain;
pub mod dag;
pub mod errors;
pub mod greedy;
pub mod lazy_set;

pub use block::Block;
pub use blockchain::Blockchain;
pub use brute_force::BruteForcePhantom;
pub use competing_chain::{CompetingChainGreedyPhantom, MaliciousDag};
pub use dag::{ChainPath, Dag};
pub use errors::{DagError, DagResult, DEPTH_ABSENT};
pub use greedy::GreedyPhantom;
pub use lazy_set::LazySet;

/// The opaque global identifier of a block.
///
/// Block ids are assumed to already be well-distributed 64-bit values (the
/// output of whatever hash function the host uses to name blocks), so
/// [`BlockIdHasher`] passes them through directly instead of re-mixing them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockId(pub u64);

impl BlockId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The type used to represent the PHANTOM `k` parameter: the maximal
/// anticone size permitted for a blue block.
pub type KType = u64;

/// `BlockId` already carries a well-distributed 64-bit value, so this
/// hasher skips remixing it and uses it directly as the hash, rather than
/// paying for a full mix on an input that's already uniform.
#[derive(Default, Clone, Copy)]
pub struct BlockIdHasher(u64);

impl BlockIdHasher {
    #[inline(always)]
    pub const fn new() -> Self {
        Self(0)
    }
}

impl Hasher for BlockIdHasher {
    #[inline(always)]
    fn finish(&self) -> u64 {
        self.0
    }
    #[inline(always)]
    fn write_u64(&mut self, v: u64) {
        self.0 = v;
    }
    #[cold]
    fn write(&mut self, bytes: &[u8]) {
        if bytes.len() >= 8 {
            self.write_u64(u64::from_le_bytes(bytes[bytes.len() - 8..bytes.len()].try_into().unwrap()));
        } else {
            let mut buf = [0u8; 8];
            buf[8 - bytes.len()..].copy_from_slice(bytes);
            self.write_u64(u64::from_le_bytes(buf));
        }
    }
}

impl BuildHasher for BlockIdHasher {
    type Hasher = Self;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        Self(0)
    }
}

/// Map keyed by `BlockId`, using [`BlockIdHasher`].
pub type BlockIdMap<V> = HashMap<BlockId, V, BlockIdHasher>;

/// Set of `BlockId`, using [`BlockIdHasher`].
pub type BlockIdSet = HashSet<BlockId, BlockIdHasher>;

/// Insertion-ordered map keyed by `BlockId`, using [`BlockIdHasher`].
///
/// `blue_diff_past_order`/`red_diff_past_order` (and the antipast orderings
/// derived from them) need insertion-ordered mappings, the way a plain
/// ordered dict would provide. [`indexmap::IndexMap`] is the Rust analogue,
/// reached for here the same way the rusty-kaspa lineage reaches for it
/// wherever it needs an order-preserving map instead of a plain `HashMap`.
pub type BlockIdIndexMap<V> = indexmap::IndexMap<BlockId, V, BlockIdHasher>;

/// `HashMap::new`/`with_capacity` are only implemented for `RandomState`, so
/// custom-hasher collections need their own constructors.
pub trait HashMapCustomHasher {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<V> HashMapCustomHasher for BlockIdMap<V> {
    #[inline(always)]
    fn new() -> Self {
        Self::with_hasher(BlockIdHasher::new())
    }
    #[inline(always)]
    fn with_capacity(cap: usize) -> Self {
        Self::with_capacity_and_hasher(cap, BlockIdHasher::new())
    }
}

impl HashMapCustomHasher for BlockIdSet {
    #[inline(always)]
    fn new() -> Self {
        Self::with_hasher(BlockIdHasher::new())
    }
    #[inline(always)]
    fn with_capacity(cap: usize) -> Self {
        Self::with_capacity_and_hasher(cap, BlockIdHasher::new())
    }
}

impl<V> HashMapCustomHasher for BlockIdIndexMap<V> {
    #[inline(always)]
    fn new() -> Self {
        Self::with_hasher(BlockIdHasher::new())
    }
    #[inline(always)]
    fn with_capacity(cap: usize) -> Self {
        Self::with_capacity_and_hasher(cap, BlockIdHasher::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::{Hash as _, Hasher as _};

    #[test]
    fn block_id_hasher_passes_through() {
        let id = BlockId::new(42);
        let mut hasher = BlockIdHasher::default();
        id.hash(&mut hasher);
        assert_eq!(hasher.finish(), 42);
    }

    #[test]
    fn block_id_map_roundtrip() {
        let mut m: BlockIdMap<&'static str> = BlockIdMap::new();
        m.insert(BlockId::new(1), "one");
        assert_eq!(m.get(&BlockId::new(1)), Some(&"one"));
    }
}
