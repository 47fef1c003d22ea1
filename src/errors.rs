//! Error types for the DAG coloring/ordering engine.

use crate::BlockId;
use thiserror::Error;

/// Errors raised by the `Dag` trait's implementations.
///
/// Most query operations never fail — absent ids are communicated through
/// sentinels (`None`/`DEPTH_ABSENT`), and unknown parent ids encountered
/// while traversing a PHANTOM-family DAG are silently skipped. `DagError` is
/// reserved for the one case where failure is the right contract: the
/// `Blockchain` variant's missing-parent check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    /// A block was added whose declared parents are all absent from the DAG,
    /// and the variant requires at least one to resolve a chain parent.
    #[error("no valid parent found among {0:?}")]
    NoValidParent(Vec<BlockId>),
}

/// Result alias used throughout the crate.
pub type DagResult<T> = Result<T, DagError>;

/// Errors raised by [`crate::lazy_set::LazySet`].
///
/// Mirrors the original's `KeyError` on `remove()` of an absent element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LazySetError<T: std::fmt::Debug> {
    #[error("element not found in set: {0:?}")]
    NotFound(T),
}

/// The sentinel returned by [`crate::dag::Dag::get_depth`] for an absent id.
pub const DEPTH_ABSENT: i64 = i64::MIN;
