//! Block value type.

use crate::{BlockId, BlockIdSet, HashMapCustomHasher};

/// An immutable block: an identifier, its declared parents, a size, and an
/// optional opaque payload.
///
/// Two blocks are equal iff their ids are equal; `size`/`data` never
/// participate in equality or hashing, mirroring the original's
/// `Block.__hash__` returning only the global id.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    id: BlockId,
    parents: BlockIdSet,
    size: u64,
    data: Option<Vec<u8>>,
}

impl Block {
    /// Creates a new block. `parents` is deduplicated into a set; the block
    /// itself is never validated here — block validation is outside the
    /// core's scope (§1).
    pub fn new(id: BlockId, parents: impl IntoIterator<Item = BlockId>, size: u64, data: Option<Vec<u8>>) -> Self {
        let mut parent_set = BlockIdSet::new();
        parent_set.extend(parents);
        Self { id, parents: parent_set, size, data }
    }

    /// Convenience constructor for a genesis block (no parents).
    pub fn genesis(id: BlockId) -> Self {
        Self::new(id, std::iter::empty(), 0, None)
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn parents(&self) -> &BlockIdSet {
        &self.parents
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_genesis(&self) -> bool {
        self.parents.is_empty()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Block {}

impl std::hash::Hash for Block {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block: {}, parents: ", self.id)?;
        let mut parents: Vec<_> = self.parents.iter().collect();
        parents.sort();
        write!(f, "{}", parents.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id_only() {
        let a = Block::new(BlockId::new(1), [BlockId::new(0)], 10, None);
        let b = Block::new(BlockId::new(1), [], 99, Some(vec![1, 2, 3]));
        assert_eq!(a, b);
    }

    #[test]
    fn genesis_has_no_parents() {
        let g = Block::genesis(BlockId::new(0));
        assert!(g.is_genesis());
        assert!(g.parents().is_empty());
    }

    #[test]
    fn display_lists_sorted_parents() {
        let b = Block::new(BlockId::new(3), [BlockId::new(2), BlockId::new(1)], 0, None);
        assert_eq!(b.to_string(), "Block: 3, parents: 1, 2");
    }
}
