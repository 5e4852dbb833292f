//! Canonical names for cross-repository export frames.
//!
//! A cross-repository frame carries one or more canonical names. A name
//! starts life as a template (e.g. `%programmatic_leaf_name%`) and is
//! instantiated when the frame crosses its first call site, using the
//! resolved callee signature and the via-type-of features materialized at
//! that site.

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

/// Template placeholder replaced by the callee signature.
pub const PROGRAMMATIC_LEAF_NAME: &str = "%programmatic_leaf_name%";

/// Template placeholder replaced by the first materialized via-type-of
/// feature.
pub const VIA_TYPE_OF: &str = "%via_type_of%";

/// A canonical name: a template awaiting instantiation, or the instantiated
/// value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalName {
    Template(String),
    Instantiated(String),
}

impl CanonicalName {
    #[must_use]
    pub fn template(value: impl Into<String>) -> Self {
        Self::Template(value.into())
    }

    #[must_use]
    pub fn instantiated(value: impl Into<String>) -> Self {
        Self::Instantiated(value.into())
    }

    #[must_use]
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }

    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Template(value) | Self::Instantiated(value) => value,
        }
    }

    /// Instantiate this template for a resolved callee.
    ///
    /// `via_type_of_features` are the feature names materialized for the
    /// frame's via-type-of ports, in port order. Returns `None` when the
    /// template demands a via-type-of feature and none was materialized.
    /// Instantiating an already-instantiated name returns it unchanged.
    #[must_use]
    pub fn instantiate(
        &self,
        callee_signature: &str,
        via_type_of_features: &[&str],
    ) -> Option<CanonicalName> {
        let template = match self {
            Self::Instantiated(_) => return Some(self.clone()),
            Self::Template(value) => value,
        };

        let mut instantiated = template.clone();
        if instantiated.contains(PROGRAMMATIC_LEAF_NAME) {
            instantiated = instantiated.replace(PROGRAMMATIC_LEAF_NAME, callee_signature);
        }
        if instantiated.contains(VIA_TYPE_OF) {
            let Some(feature) = via_type_of_features.first() else {
                warn!(
                    template = template.as_str(),
                    callee = callee_signature,
                    "cannot instantiate canonical name: no via-type-of feature materialized"
                );
                return None;
            };
            instantiated = instantiated.replace(VIA_TYPE_OF, feature);
        }
        Some(Self::Instantiated(instantiated))
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(value) => write!(f, "template({value})"),
            Self::Instantiated(value) => write!(f, "{value}"),
        }
    }
}

/// Ordered set of canonical names.
///
/// Backed by a `BTreeSet` so that it can participate in the frame grouping
/// key (hashable, deterministically ordered).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CanonicalNameSet {
    names: BTreeSet<CanonicalName>,
}

impl CanonicalNameSet {
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn add(&mut self, name: CanonicalName) {
        self.names.insert(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalName> {
        self.names.iter()
    }

    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        self.names.is_subset(&other.names)
    }

    pub fn join_with(&mut self, other: &Self) {
        self.names.extend(other.names.iter().cloned());
    }

    pub fn meet_with(&mut self, other: &Self) {
        self.names.retain(|name| other.names.contains(name));
    }
}

impl FromIterator<CanonicalName> for CanonicalNameSet {
    fn from_iter<I: IntoIterator<Item = CanonicalName>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}
