//! Generic set lattice over copyable interned ids.
//!
//! The power-set lattice: bottom is the empty set, join is union, meet is
//! intersection and the order is subset inclusion. All the id-valued
//! attribute sets of a frame (origins, field origins, local positions,
//! via-* port sets) are instances of this one type.

use rustc_hash::FxHashSet;
use std::hash::Hash;

use crate::access::Root;
use crate::context::{FieldId, MethodId, PositionId};

/// Set of originating methods.
pub type MethodSet = SetLattice<MethodId>;
/// Set of originating fields.
pub type FieldSet = SetLattice<FieldId>;
/// Set of source positions visited locally.
pub type LocalPositionSet = SetLattice<PositionId>;
/// Set of port roots (via-type-of / via-value-of).
pub type PortSet = SetLattice<Root>;

/// Finite set with lattice operations; bottom is the empty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLattice<T: Copy + Eq + Hash> {
    elements: FxHashSet<T>,
}

impl<T: Copy + Eq + Hash> Default for SetLattice<T> {
    fn default() -> Self {
        Self {
            elements: FxHashSet::default(),
        }
    }
}

impl<T: Copy + Eq + Hash> SetLattice<T> {
    #[must_use]
    pub fn bottom() -> Self {
        Self {
            elements: FxHashSet::default(),
        }
    }

    #[must_use]
    pub fn singleton(element: T) -> Self {
        let mut elements = FxHashSet::default();
        elements.insert(element);
        Self { elements }
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn add(&mut self, element: T) {
        self.elements.insert(element);
    }

    #[must_use]
    pub fn contains(&self, element: T) -> bool {
        self.elements.contains(&element)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.elements.iter().copied()
    }

    /// Subset inclusion.
    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        self.elements.is_subset(&other.elements)
    }

    /// Union.
    pub fn join_with(&mut self, other: &Self) {
        self.elements.extend(other.elements.iter().copied());
    }

    /// Finite height; widening is the join.
    pub fn widen_with(&mut self, other: &Self) {
        self.join_with(other);
    }

    /// Intersection.
    pub fn meet_with(&mut self, other: &Self) {
        self.elements.retain(|element| other.elements.contains(element));
    }

    pub fn narrow_with(&mut self, other: &Self) {
        self.meet_with(other);
    }

    /// Set difference.
    pub fn difference_with(&mut self, other: &Self) {
        self.elements.retain(|element| !other.elements.contains(element));
    }
}

impl<T: Copy + Eq + Hash> FromIterator<T> for SetLattice<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<T: Copy + Eq + Hash, const N: usize> From<[T; N]> for SetLattice<T> {
    fn from(elements: [T; N]) -> Self {
        elements.into_iter().collect()
    }
}
