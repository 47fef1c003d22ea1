//! `LazySet` — a set algebra that records a base set plus an ordered list of
//! positive (union) and negative (difference) layers, flattening only on
//! demand. Used throughout [`crate::greedy`] to represent a block's
//! past/antipast as a handful of shared layer references instead of a
//! materialized `O(|V|)` set.
//!
//! Layers are `Rc`-shared (never `Arc`: §5 of the design rules out
//! concurrency within a single DAG instance), so composing a `LazySet` from
//! existing per-block diff-past sets is a pointer copy, not a clone.

use std::collections::HashSet;
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

use crate::errors::LazySetError;

#[derive(Debug, Clone)]
enum Layer<T, S> {
    Positive(Rc<HashSet<T, S>>),
    Negative(Rc<HashSet<T, S>>),
}

/// A lazily-evaluated composition of unions and differences of sets.
///
/// The effective set equals `base.difference(neg_1).difference(neg_2)....union(pos_1)...`
/// applied in the order the layers were appended.
#[derive(Debug, Clone)]
pub struct LazySet<T, S = std::collections::hash_map::RandomState> {
    layers: Vec<Layer<T, S>>,
}

impl<T, S> Default for LazySet<T, S> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<T, S> LazySet<T, S>
where
    T: Eq + Hash + Copy,
    S: BuildHasher + Default,
{
    /// An empty `LazySet`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `LazySet` equal to `base.difference(*negatives).union(*positives)`,
    /// applying the difference sets and then the union sets in the given order.
    pub fn with_layers(
        base: HashSet<T, S>,
        negatives: impl IntoIterator<Item = HashSet<T, S>>,
        positives: impl IntoIterator<Item = HashSet<T, S>>,
    ) -> Self {
        let mut set = Self::new();
        set.lazy_update(base);
        for negative in negatives {
            set.lazy_difference_update(negative);
        }
        for positive in positives {
            set.lazy_update(positive);
        }
        set
    }

    /// Appends `other` as a positive (union) layer. No-op for an empty set.
    pub fn lazy_update(&mut self, other: HashSet<T, S>) {
        if !other.is_empty() {
            self.layers.push(Layer::Positive(Rc::new(other)));
        }
    }

    /// Same as [`Self::lazy_update`] but shares an existing `Rc` layer
    /// instead of taking ownership of a fresh `HashSet` — the cheap path
    /// used when composing past/antipast views out of per-block diff-pasts.
    pub fn lazy_update_shared(&mut self, other: Rc<HashSet<T, S>>) {
        if !other.is_empty() {
            self.layers.push(Layer::Positive(other));
        }
    }

    /// Appends `other` as a negative (difference) layer. No-op for an empty set.
    pub fn lazy_difference_update(&mut self, other: HashSet<T, S>) {
        if !other.is_empty() {
            self.layers.push(Layer::Negative(Rc::new(other)));
        }
    }

    /// Shared-reference form of [`Self::lazy_difference_update`].
    pub fn lazy_difference_update_shared(&mut self, other: Rc<HashSet<T, S>>) {
        if !other.is_empty() {
            self.layers.push(Layer::Negative(other));
        }
    }

    /// Adds the elements of `other` to this set.
    pub fn update(&mut self, other: &HashSet<T, S>) {
        self.lazy_update(other.iter().copied().collect());
    }

    /// Returns a new `LazySet` with the elements of this set and `other`.
    pub fn union(&self, other: &HashSet<T, S>) -> Self {
        let mut copy = self.copy();
        copy.update(other);
        copy
    }

    /// Removes the elements of `other` from this set.
    pub fn difference_update(&mut self, other: &HashSet<T, S>) {
        self.lazy_difference_update(other.iter().copied().collect());
    }

    /// Returns a new `LazySet` with the elements of this set that are not in `other`.
    pub fn difference(&self, other: &HashSet<T, S>) -> Self {
        let mut copy = self.copy();
        copy.difference_update(other);
        copy
    }

    /// Keeps only elements found in both this set and `other`.
    ///
    /// Per I9, the result is flattened: after this call the set has exactly
    /// one positive layer.
    pub fn intersection_update(&mut self, other: &HashSet<T, S>) {
        let kept: HashSet<T, S> = self.scan().into_iter().filter(|item| other.contains(item)).collect();
        self.clear();
        self.lazy_update(kept);
    }

    /// Returns a new, flattened `LazySet` with elements common to this set and `other`.
    pub fn intersection(&self, other: &HashSet<T, S>) -> Self {
        let mut copy = self.copy();
        copy.intersection_update(other);
        copy
    }

    /// Keeps only elements found in either this set or `other`, but not both.
    ///
    /// Per I9, the result is flattened.
    pub fn symmetric_difference_update(&mut self, other: &HashSet<T, S>) {
        let mine = self.to_set();
        let common: HashSet<T, S> = mine.iter().copied().filter(|item| other.contains(item)).collect();
        let symmetric: HashSet<T, S> =
            mine.iter().copied().chain(other.iter().copied()).filter(|item| !common.contains(item)).collect();
        self.clear();
        self.lazy_update(symmetric);
    }

    /// Returns a new, flattened `LazySet` with elements in either this set or `other` but not both.
    pub fn symmetric_difference(&self, other: &HashSet<T, S>) -> Self {
        let mut copy = self.copy();
        copy.symmetric_difference_update(other);
        copy
    }

    /// Scans layers from latest to earliest; the first layer containing
    /// `item` decides membership (positive => member, negative => not a member).
    pub fn contains(&self, item: &T) -> bool {
        for layer in self.layers.iter().rev() {
            match layer {
                Layer::Positive(set) => {
                    if set.contains(item) {
                        return true;
                    }
                }
                Layer::Negative(set) => {
                    if set.contains(item) {
                        return false;
                    }
                }
            }
        }
        false
    }

    fn scan(&self) -> Vec<T> {
        let mut seen: HashSet<T, S> = HashSet::with_hasher(S::default());
        let mut out = Vec::new();
        for layer in self.layers.iter().rev() {
            match layer {
                Layer::Positive(set) => {
                    for item in set.iter() {
                        if seen.insert(*item) {
                            out.push(*item);
                        }
                    }
                }
                Layer::Negative(set) => {
                    for item in set.iter() {
                        seen.insert(*item);
                    }
                }
            }
        }
        out
    }

    /// Iterates the set's members. Order is unspecified other than "each
    /// present element appears exactly once".
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.scan().into_iter()
    }

    /// Materializes this `LazySet` into a plain `HashSet`. `O(sum of layer sizes)`.
    pub fn to_set(&self) -> HashSet<T, S> {
        self.scan().into_iter().collect()
    }

    /// The number of members. Computed by counting iteration — callers must
    /// treat this as non-trivial, never `O(1)`.
    pub fn len(&self) -> usize {
        self.scan().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|layer| match layer {
            Layer::Positive(set) => set.is_empty(),
            Layer::Negative(_) => true,
        }) || self.len() == 0
    }

    /// Collapses all layers into a single positive layer, returning the
    /// resulting shared set.
    ///
    /// `modify = true` mutates the first positive layer in place when this
    /// `LazySet` holds its only strong reference (falling back to a
    /// copy-on-write clone via [`Rc::make_mut`] when another owner exists,
    /// e.g. a DAG node's diff-past still referencing that same layer);
    /// `modify = false` always starts from a fresh copy. This is a strictly
    /// safer rendition of the "modify in place, caller beware of aliasing"
    /// convention than the original's unconditional in-place mutation.
    pub fn flatten(&mut self, modify: bool) -> Rc<HashSet<T, S>> {
        let base_index = self.layers.iter().position(|layer| matches!(layer, Layer::Positive(_)));
        let Some(base_index) = base_index else {
            let empty: Rc<HashSet<T, S>> = Rc::new(HashSet::with_hasher(S::default()));
            self.layers.clear();
            self.layers.push(Layer::Positive(Rc::clone(&empty)));
            return empty;
        };

        let mut base: Rc<HashSet<T, S>> = match &self.layers[base_index] {
            Layer::Positive(rc) => {
                if modify {
                    Rc::clone(rc)
                } else {
                    Rc::new((**rc).clone())
                }
            }
            Layer::Negative(_) => unreachable!("base_index always points at a positive layer"),
        };

        for layer in &self.layers[base_index + 1..] {
            let target = Rc::make_mut(&mut base);
            match layer {
                Layer::Positive(set) => target.extend(set.iter().copied()),
                Layer::Negative(set) => {
                    for item in set.iter() {
                        target.remove(item);
                    }
                }
            }
        }

        self.layers.clear();
        self.layers.push(Layer::Positive(Rc::clone(&base)));
        base
    }

    /// A shallow copy: the layer list (and its `Rc` layer references) is
    /// copied, but the underlying sets are shared.
    pub fn copy(&self) -> Self {
        Self { layers: self.layers.clone() }
    }

    /// Removes all layers.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Adds a single element as a new positive layer.
    pub fn add(&mut self, elem: T) {
        let mut singleton = HashSet::with_hasher(S::default());
        singleton.insert(elem);
        self.lazy_update(singleton);
    }

    /// Removes `elem` if present; adds a new negative layer either way.
    pub fn discard(&mut self, elem: T) {
        let mut singleton = HashSet::with_hasher(S::default());
        singleton.insert(elem);
        self.lazy_difference_update(singleton);
    }

    /// Removes `elem`, failing if it isn't currently a member.
    pub fn remove(&mut self, elem: T) -> Result<(), LazySetError<T>>
    where
        T: std::fmt::Debug,
    {
        if !self.contains(&elem) {
            return Err(LazySetError::NotFound(elem));
        }
        self.discard(elem);
        Ok(())
    }

    /// True iff every element of this set is in `other`.
    pub fn is_subset(&self, other: &HashSet<T, S>) -> bool {
        self.scan().iter().all(|item| other.contains(item))
    }

    /// True iff every element of `other` is in this set.
    pub fn is_superset(&self, other: &HashSet<T, S>) -> bool {
        other.iter().all(|item| self.contains(item))
    }
}

impl<T, S> PartialEq<HashSet<T, S>> for LazySet<T, S>
where
    T: Eq + Hash + Copy,
    S: BuildHasher + Default,
{
    fn eq(&self, other: &HashSet<T, S>) -> bool {
        self.is_subset(other) && self.is_superset(other)
    }
}

impl<'a, T, S> IntoIterator for &'a LazySet<T, S>
where
    T: Eq + Hash + Copy,
    S: BuildHasher + Default,
{
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;

    type TestSet = LazySet<i32, RandomState>;

    fn set(items: &[i32]) -> HashSet<i32, RandomState> {
        items.iter().copied().collect()
    }

    #[test]
    fn empty_lazy_update_is_noop() {
        let mut s = TestSet::new();
        s.lazy_update(set(&[]));
        assert!(s.is_empty());
    }

    #[test]
    fn union_then_difference_contains() {
        let mut s = TestSet::new();
        s.lazy_update(set(&[1, 2, 3]));
        s.lazy_difference_update(set(&[2]));
        assert!(s.contains(&1));
        assert!(!s.contains(&2));
        assert!(s.contains(&3));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn later_layers_take_precedence() {
        let mut s = TestSet::new();
        s.lazy_update(set(&[1]));
        s.lazy_difference_update(set(&[1]));
        s.lazy_update(set(&[1]));
        assert!(s.contains(&1));
    }

    #[test]
    fn flatten_matches_reference_evaluation() {
        let mut s = TestSet::with_layers(set(&[1, 2, 3, 4]), [set(&[2]), set(&[3])], [set(&[5])]);
        let flat = s.flatten(false);
        let expected = set(&[1, 4, 5]);
        assert_eq!(flat.iter().copied().collect::<HashSet<_>>(), expected);
        assert_eq!(s.to_set(), expected);
    }

    #[test]
    fn flatten_modify_false_leaves_original_rc_untouched() {
        let mut s = TestSet::new();
        let base: Rc<HashSet<i32, RandomState>> = Rc::new(set(&[1, 2]));
        let base_clone = Rc::clone(&base);
        s.lazy_update_shared(base);
        s.lazy_update(set(&[3]));
        s.flatten(false);
        assert_eq!(*base_clone, set(&[1, 2]));
    }

    #[test]
    fn intersection_update_flattens() {
        let mut s = TestSet::with_layers(set(&[1, 2, 3]), [], [set(&[4])]);
        s.intersection_update(&set(&[2, 3, 4]));
        assert_eq!(s.to_set(), set(&[2, 3, 4]));
    }

    #[test]
    fn symmetric_difference_excludes_common_elements() {
        let mut s = TestSet::with_layers(set(&[1, 2, 3]), [], []);
        s.symmetric_difference_update(&set(&[2, 3, 4]));
        assert_eq!(s.to_set(), set(&[1, 4]));
    }

    #[test]
    fn remove_absent_element_errors() {
        let mut s = TestSet::with_layers(set(&[1]), [], []);
        assert_eq!(s.remove(2), Err(LazySetError::NotFound(2)));
        assert!(s.remove(1).is_ok());
        assert!(!s.contains(&1));
    }

    #[test]
    fn subset_superset_equal() {
        let s = TestSet::with_layers(set(&[1, 2]), [], []);
        assert!(s.is_subset(&set(&[1, 2, 3])));
        assert!(!s.is_superset(&set(&[1, 2, 3])));
        assert_eq!(s, set(&[1, 2]));
    }
}
