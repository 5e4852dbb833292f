//! Feature sets: plain sets and the may/always pair lattice.
//!
//! User-declared features live in a plain [`FeatureSet`]. Features inferred
//! along a trace live in a [`FeatureMayAlwaysSet`], a pair `(may, always)`
//! with `always ⊆ may`:
//!
//! - `always` under-approximates: the feature holds on every path.
//! - `may` over-approximates: the feature holds on some path.
//!
//! Joining two branches takes the union on `may` and the intersection on
//! `always`, so a feature that is `always` on only one side demotes to
//! `may`. This demotion is user-visible ("always sanitized" becomes "may be
//! sanitized") and every editor must preserve it. The pair lattice has a
//! bottom element distinct from the empty value.

use crate::context::FeatureId;
use crate::domain::SetLattice;

/// Plain set of features (user-declared features); bottom is the empty set.
pub type FeatureSet = SetLattice<FeatureId>;

/// Pair of feature sets `(may, always)` with `always ⊆ may`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMayAlwaysSet {
    may: FeatureSet,
    always: FeatureSet,
    bottom: bool,
}

impl FeatureMayAlwaysSet {
    /// The bottom element. Distinct from [`FeatureMayAlwaysSet::empty`].
    #[must_use]
    pub fn bottom() -> Self {
        Self {
            may: FeatureSet::bottom(),
            always: FeatureSet::bottom(),
            bottom: true,
        }
    }

    /// The empty value: no features, but present.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            may: FeatureSet::bottom(),
            always: FeatureSet::bottom(),
            bottom: false,
        }
    }

    /// Features that hold on some path only.
    #[must_use]
    pub fn make_may(features: impl IntoIterator<Item = FeatureId>) -> Self {
        Self {
            may: features.into_iter().collect(),
            always: FeatureSet::bottom(),
            bottom: false,
        }
    }

    /// Features that hold on every path.
    #[must_use]
    pub fn make_always(features: impl IntoIterator<Item = FeatureId>) -> Self {
        let always: FeatureSet = features.into_iter().collect();
        Self {
            may: always.clone(),
            always,
            bottom: false,
        }
    }

    /// Build from explicit components, restoring `always ⊆ may`.
    #[must_use]
    pub fn from_sets(may: FeatureSet, always: FeatureSet) -> Self {
        let mut may = may;
        may.join_with(&always);
        Self {
            may,
            always,
            bottom: false,
        }
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.bottom
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.may.is_empty()
    }

    #[must_use]
    pub fn may(&self) -> &FeatureSet {
        &self.may
    }

    #[must_use]
    pub fn always(&self) -> &FeatureSet {
        &self.always
    }

    fn ensure_value(&mut self) {
        self.bottom = false;
    }

    pub fn add_may(&mut self, feature: FeatureId) {
        self.ensure_value();
        self.may.add(feature);
    }

    pub fn add_always(&mut self, feature: FeatureId) {
        self.ensure_value();
        self.may.add(feature);
        self.always.add(feature);
    }

    /// Add every feature of `features` to both components.
    pub fn add_always_set(&mut self, features: &FeatureSet) {
        if features.is_empty() {
            return;
        }
        self.ensure_value();
        self.may.join_with(features);
        self.always.join_with(features);
    }

    /// Pointwise union with `other`.
    ///
    /// Unlike [`FeatureMayAlwaysSet::join_with`], this strengthens: a
    /// feature `always` in `other` stays `always` in the result. Use it to
    /// accumulate features along a single path; use join to merge paths.
    pub fn add(&mut self, other: &Self) {
        if other.bottom {
            return;
        }
        if self.bottom {
            *self = other.clone();
            return;
        }
        self.may.join_with(&other.may);
        self.always.join_with(&other.always);
    }

    /// `self ⊑ other`: `may ⊆ other.may` and `other.always ⊆ always`.
    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        if self.bottom {
            return true;
        }
        if other.bottom {
            return false;
        }
        self.may.leq(&other.may) && other.always.leq(&self.always)
    }

    /// Union on `may`, intersection on `always`. Bottom is the identity.
    pub fn join_with(&mut self, other: &Self) {
        if other.bottom {
            return;
        }
        if self.bottom {
            *self = other.clone();
            return;
        }
        self.may.join_with(&other.may);
        self.always.meet_with(&other.always);
    }

    pub fn widen_with(&mut self, other: &Self) {
        self.join_with(other);
    }

    /// Intersection on `may`, union on `always`; bottom when the result
    /// would violate `always ⊆ may`.
    pub fn meet_with(&mut self, other: &Self) {
        if self.bottom {
            return;
        }
        if other.bottom {
            *self = Self::bottom();
            return;
        }
        self.may.meet_with(&other.may);
        self.always.join_with(&other.always);
        if !self.always.leq(&self.may) {
            *self = Self::bottom();
        }
    }

    pub fn narrow_with(&mut self, other: &Self) {
        self.meet_with(other);
    }
}

impl Default for FeatureMayAlwaysSet {
    fn default() -> Self {
        Self::bottom()
    }
}

impl FromIterator<FeatureId> for FeatureMayAlwaysSet {
    /// Collecting features yields an always-set; this mirrors the common
    /// case of declaring features that hold unconditionally.
    fn from_iter<I: IntoIterator<Item = FeatureId>>(iter: I) -> Self {
        Self::make_always(iter)
    }
}
